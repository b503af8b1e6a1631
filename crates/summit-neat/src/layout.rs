//! Draw positions for a genome, consumed by external renderers

use ahash::HashMap;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::gene::{NodeId, NodeKind};
use crate::genome::GenomeNetwork;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePlacement {
    pub id: NodeId,
    pub kind: NodeKind,
    pub position: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgePlacement {
    pub from: Vec2,
    pub to: Vec2,
    /// Positive weights are drawn in one color, negative in another
    pub positive: bool,
    pub thickness: f32,
}

/// Column per layer, evenly spaced rows inside `size`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkLayout {
    pub nodes: Vec<NodePlacement>,
    pub edges: Vec<EdgePlacement>,
}

impl NetworkLayout {
    pub fn compute(genome: &GenomeNetwork, size: Vec2) -> Self {
        let layers = genome.layers();
        let column_step = size.x / layers.len().max(1) as f32;

        let mut positions: HashMap<NodeId, Vec2> = HashMap::default();
        let mut nodes = Vec::with_capacity(genome.nodes().len());

        for (column, layer) in layers.iter().enumerate() {
            let row_step = size.y / (layer.len() + 1) as f32;
            let x = column_step * (column as f32 + 0.5);
            for (row, &id) in layer.iter().enumerate() {
                let position = Vec2::new(x, row_step * (row as f32 + 1.0));
                positions.insert(id, position);
                if let Some(node) = genome.node(id) {
                    nodes.push(NodePlacement {
                        id,
                        kind: node.kind,
                        position,
                    });
                }
            }
        }

        let mut edges = Vec::new();
        for conn in genome.enabled_connections() {
            let (Some(&from), Some(&to)) = (positions.get(&conn.from), positions.get(&conn.to))
            else {
                log::error!(
                    "Layout: connection {} endpoint {} or {} not found in placed nodes; skipping edge",
                    conn.innovation,
                    conn.from,
                    conn.to
                );
                continue;
            };
            edges.push(EdgePlacement {
                from,
                to,
                positive: conn.weight >= 0.0,
                thickness: conn.weight.abs() * 5.0 + 1.0,
            });
        }

        Self { nodes, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::innovation::InnovationTracker;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_layout_columns_follow_layers() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let mut tracker = InnovationTracker::for_network(3, 2);
        let mut genome = GenomeNetwork::minimal(3, 2, &mut tracker, 3.0, &mut rng);
        genome.add_node(&mut tracker, &mut rng);

        let layout = NetworkLayout::compute(&genome, Vec2::new(300.0, 100.0));

        assert_eq!(layout.nodes.len(), genome.nodes().len());
        assert_eq!(layout.edges.len(), genome.enabled_connections().count());

        let x_of = |kind: NodeKind| {
            layout
                .nodes
                .iter()
                .find(|n| n.kind == kind)
                .map(|n| n.position.x)
                .unwrap()
        };
        assert!(x_of(NodeKind::Input) < x_of(NodeKind::Hidden));
        assert!(x_of(NodeKind::Hidden) < x_of(NodeKind::Output));
    }

    #[test]
    fn test_edge_thickness_tracks_weight() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let mut tracker = InnovationTracker::for_network(1, 1);
        let genome = GenomeNetwork::minimal(1, 1, &mut tracker, 3.0, &mut rng);
        let weight = genome.connections()[0].weight;

        let layout = NetworkLayout::compute(&genome, Vec2::splat(100.0));
        let edge = &layout.edges[0];
        assert_eq!(edge.positive, weight >= 0.0);
        assert!((edge.thickness - (weight.abs() * 5.0 + 1.0)).abs() < 1e-6);
    }
}
