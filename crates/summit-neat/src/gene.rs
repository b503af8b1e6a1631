//! Node and connection genes
//!
//! Genes are plain data. Identity (`NodeId`, innovation numbers) is assigned by
//! the [`InnovationTracker`](crate::innovation::InnovationTracker) so that the
//! same structural mutation in two genomes produces the same identities.

use serde::{Deserialize, Serialize};

/// Stable identity of a node, unique within one genome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Role of a node in the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Seeded from the input vector by position
    Input,
    /// Constant 1.0, lives in the input layer
    Bias,
    /// Created by splitting a connection
    Hidden,
    /// Read off into the output vector by position
    Output,
}

impl NodeKind {
    /// Whether this node sits in layer 0 and is never a connection target
    pub fn is_sensor(&self) -> bool {
        matches!(self, NodeKind::Input | NodeKind::Bias)
    }
}

/// A node of the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGene {
    pub id: NodeId,
    pub kind: NodeKind,
    /// 0 = input layer, `layer_count - 1` = output layer
    pub layer: u32,
}

impl NodeGene {
    /// Apply this node's nonlinearity to its summed input.
    ///
    /// Sensors pass their seeded value through; everything else squashes with
    /// tanh so outputs stay inside [-1, 1].
    pub fn activate(&self, sum: f32) -> f32 {
        if self.kind.is_sensor() {
            sum
        } else {
            sum.tanh()
        }
    }
}

/// Weighted edge between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGene {
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f32,
    /// Disabled genes stay for history but are skipped by evaluation
    pub enabled: bool,
    pub innovation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_nodes_pass_through() {
        let input = NodeGene {
            id: NodeId(0),
            kind: NodeKind::Input,
            layer: 0,
        };
        assert_eq!(input.activate(5.0), 5.0);

        let bias = NodeGene {
            id: NodeId(1),
            kind: NodeKind::Bias,
            layer: 0,
        };
        assert_eq!(bias.activate(-2.5), -2.5);
    }

    #[test]
    fn test_computing_nodes_are_bounded() {
        let output = NodeGene {
            id: NodeId(2),
            kind: NodeKind::Output,
            layer: 1,
        };
        let value = output.activate(100.0);
        assert!(value <= 1.0 && value > 0.99);
        assert_eq!(output.activate(0.0), 0.0);
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(42).to_string(), "Node(42)");
    }
}
