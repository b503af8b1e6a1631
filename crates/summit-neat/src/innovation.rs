//! Population-wide innovation bookkeeping
//!
//! Every genome in a population is built with the same sensor/output node
//! identities. Structural mutations ask the tracker for identities so that
//! two genomes that independently grow the same connection (or split the same
//! connection) end up with matching genes, which crossover and speciation
//! rely on.

use ahash::HashMap;
use serde::{Deserialize, Serialize};

use crate::gene::NodeId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InnovationTracker {
    connections: HashMap<(NodeId, NodeId), u64>,
    splits: HashMap<u64, NodeId>,
    next_innovation: u64,
    next_node_id: u32,
}

impl InnovationTracker {
    /// Tracker for networks with `input_count` inputs, one bias and
    /// `output_count` outputs. Those nodes take identities
    /// `0..input_count + 1 + output_count`.
    pub fn for_network(input_count: usize, output_count: usize) -> Self {
        Self {
            connections: HashMap::default(),
            splits: HashMap::default(),
            next_innovation: 0,
            next_node_id: (input_count + 1 + output_count) as u32,
        }
    }

    /// Innovation number for a connection between `from` and `to`
    pub fn connection(&mut self, from: NodeId, to: NodeId) -> u64 {
        if let Some(&existing) = self.connections.get(&(from, to)) {
            return existing;
        }
        let innovation = self.next_innovation;
        self.next_innovation += 1;
        self.connections.insert((from, to), innovation);
        innovation
    }

    /// Node identity for splitting the connection with the given innovation
    pub fn split_node(&mut self, innovation: u64) -> NodeId {
        if let Some(&existing) = self.splits.get(&innovation) {
            return existing;
        }
        let id = self.fresh_node();
        self.splits.insert(innovation, id);
        id
    }

    /// A node identity nobody has used yet
    pub fn fresh_node(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    pub fn innovation_count(&self) -> u64 {
        self.next_innovation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_pair_same_innovation() {
        let mut tracker = InnovationTracker::for_network(4, 2);
        let a = tracker.connection(NodeId(0), NodeId(5));
        let b = tracker.connection(NodeId(1), NodeId(5));
        let again = tracker.connection(NodeId(0), NodeId(5));

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(tracker.innovation_count(), 2);
    }

    #[test]
    fn test_split_nodes_start_after_fixed_nodes() {
        // 4 inputs + bias + 2 outputs = ids 0..7
        let mut tracker = InnovationTracker::for_network(4, 2);
        let split = tracker.split_node(0);
        assert_eq!(split, NodeId(7));
        assert_eq!(tracker.split_node(0), split);
        assert_eq!(tracker.split_node(1), NodeId(8));
        assert_eq!(tracker.fresh_node(), NodeId(9));
    }
}
