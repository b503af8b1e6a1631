//! Layered NEAT genome
//!
//! A genome is an arena of node genes and connection genes. Nodes carry a
//! layer index (0 = sensors, `layer_count - 1` = outputs) and every enabled
//! connection runs from a strictly lower layer to a strictly higher one, so a
//! layer-by-layer sweep is a valid topological order and evaluation needs no
//! graph search.
//!
//! The lookup tables used by evaluation (node slot by identity, layer
//! membership, incoming connections) are derived data. They are rebuilt after
//! every structural change and after deserialization, never edited in place.

use ahash::{HashMap, HashSet};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::gene::{ConnectionGene, NodeGene, NodeId, NodeKind};
use crate::innovation::InnovationTracker;

/// Value of the bias node
pub const BIAS_VALUE: f32 = 1.0;

/// Mutation probabilities and weight bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Max magnitude a weight can have (+- this number)
    pub weight_maximum: f32,
    /// Probability per connection that its weight is mutated
    pub weight_mutation_chance: f32,
    /// Given a weight mutation, probability of re-rolling instead of nudging
    pub re_randomize_weight_chance: f32,
    /// Max magnitude of a nudge
    pub weight_perturbation: f32,
    /// Probability per genome per generation of adding a connection
    pub add_connection_chance: f32,
    /// Probability per genome per generation of splitting a connection
    pub add_node_chance: f32,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            weight_maximum: 3.0,
            weight_mutation_chance: 0.65,
            re_randomize_weight_chance: 0.2,
            weight_perturbation: 0.5,
            add_connection_chance: 0.55,
            add_node_chance: 0.15,
        }
    }
}

/// Per-node values from one forward pass
#[derive(Debug, Clone, PartialEq)]
pub struct Activations {
    /// One value per node, aligned with [`GenomeNetwork::nodes`]
    pub node_values: Vec<f32>,
    /// Output layer values in output order
    pub outputs: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
struct NetworkIndex {
    slots: HashMap<NodeId, usize>,
    layers: Vec<Vec<usize>>,
    /// Per node slot: (source slot, connection index) of enabled incoming genes
    incoming: Vec<Vec<(usize, usize)>>,
}

/// Wire form of a genome; the index is rebuilt on the way in
#[derive(Serialize, Deserialize)]
struct GenomeRecord {
    nodes: Vec<NodeGene>,
    connections: Vec<ConnectionGene>,
    input_ids: Vec<NodeId>,
    output_ids: Vec<NodeId>,
    bias_id: NodeId,
    layer_count: u32,
}

/// Evolvable feed-forward network
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "GenomeRecord", into = "GenomeRecord")]
pub struct GenomeNetwork {
    pub(crate) nodes: Vec<NodeGene>,
    pub(crate) connections: Vec<ConnectionGene>,
    input_ids: Vec<NodeId>,
    output_ids: Vec<NodeId>,
    bias_id: NodeId,
    layer_count: u32,
    index: NetworkIndex,
}

impl From<GenomeRecord> for GenomeNetwork {
    fn from(record: GenomeRecord) -> Self {
        let mut genome = Self {
            nodes: record.nodes,
            connections: record.connections,
            input_ids: record.input_ids,
            output_ids: record.output_ids,
            bias_id: record.bias_id,
            layer_count: record.layer_count,
            index: NetworkIndex::default(),
        };
        genome.rebuild_index();
        genome
    }
}

impl From<GenomeNetwork> for GenomeRecord {
    fn from(genome: GenomeNetwork) -> Self {
        Self {
            nodes: genome.nodes,
            connections: genome.connections,
            input_ids: genome.input_ids,
            output_ids: genome.output_ids,
            bias_id: genome.bias_id,
            layer_count: genome.layer_count,
        }
    }
}

impl GenomeNetwork {
    /// Two-layer network with sensors and outputs but no connections.
    ///
    /// Inputs take identities `0..input_count`, the bias `input_count`, and the
    /// outputs follow, matching [`InnovationTracker::for_network`].
    pub fn new(input_count: usize, output_count: usize) -> Self {
        assert!(output_count > 0, "Network needs at least one output");

        let mut nodes = Vec::with_capacity(input_count + 1 + output_count);
        let mut input_ids = Vec::with_capacity(input_count);
        let mut output_ids = Vec::with_capacity(output_count);

        for i in 0..input_count {
            let id = NodeId(i as u32);
            nodes.push(NodeGene {
                id,
                kind: NodeKind::Input,
                layer: 0,
            });
            input_ids.push(id);
        }

        let bias_id = NodeId(input_count as u32);
        nodes.push(NodeGene {
            id: bias_id,
            kind: NodeKind::Bias,
            layer: 0,
        });

        for o in 0..output_count {
            let id = NodeId((input_count + 1 + o) as u32);
            nodes.push(NodeGene {
                id,
                kind: NodeKind::Output,
                layer: 1,
            });
            output_ids.push(id);
        }

        let mut genome = Self {
            nodes,
            connections: Vec::new(),
            input_ids,
            output_ids,
            bias_id,
            layer_count: 2,
            index: NetworkIndex::default(),
        };
        genome.rebuild_index();
        genome
    }

    /// Starting genome: the bias feeds every output with a random weight.
    /// Everything else grows through mutation.
    pub fn minimal<R: Rng + ?Sized>(
        input_count: usize,
        output_count: usize,
        tracker: &mut InnovationTracker,
        weight_maximum: f32,
        rng: &mut R,
    ) -> Self {
        let mut genome = Self::new(input_count, output_count);
        let bias = genome.bias_id;
        for output in genome.output_ids.clone() {
            genome.connections.push(ConnectionGene {
                from: bias,
                to: output,
                weight: rng.random_range(-weight_maximum..=weight_maximum),
                enabled: true,
                innovation: tracker.connection(bias, output),
            });
        }
        genome.rebuild_index();
        genome
    }

    pub fn input_count(&self) -> usize {
        self.input_ids.len()
    }

    pub fn output_count(&self) -> usize {
        self.output_ids.len()
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    pub fn nodes(&self) -> &[NodeGene] {
        &self.nodes
    }

    pub fn connections(&self) -> &[ConnectionGene] {
        &self.connections
    }

    pub fn enabled_connections(&self) -> impl Iterator<Item = &ConnectionGene> {
        self.connections.iter().filter(|c| c.enabled)
    }

    pub fn output_ids(&self) -> &[NodeId] {
        &self.output_ids
    }

    pub fn bias_id(&self) -> NodeId {
        self.bias_id
    }

    /// Look up a node by identity
    pub fn node(&self, id: NodeId) -> Option<&NodeGene> {
        self.index.slots.get(&id).map(|&slot| &self.nodes[slot])
    }

    /// Node ids grouped by layer, ascending
    pub fn layers(&self) -> Vec<Vec<NodeId>> {
        self.index
            .layers
            .iter()
            .map(|slots| slots.iter().map(|&s| self.nodes[s].id).collect())
            .collect()
    }

    /// Recompute every derived lookup table.
    ///
    /// Connections whose endpoints cannot be found, or that would run against
    /// the layer order, are logged and left out of evaluation.
    pub fn rebuild_index(&mut self) {
        let mut slots = HashMap::default();
        for (slot, node) in self.nodes.iter().enumerate() {
            slots.insert(node.id, slot);
        }

        let mut layers = vec![Vec::new(); self.layer_count as usize];
        for (slot, node) in self.nodes.iter().enumerate() {
            match layers.get_mut(node.layer as usize) {
                Some(layer) => layer.push(slot),
                None => log::error!(
                    "{} claims layer {} but genome has {} layers; excluded from evaluation",
                    node.id,
                    node.layer,
                    self.layer_count
                ),
            }
        }
        for layer in &mut layers {
            layer.sort_by_key(|&slot| self.nodes[slot].id);
        }

        let mut incoming = vec![Vec::new(); self.nodes.len()];
        for (conn_idx, conn) in self.connections.iter().enumerate() {
            if !conn.enabled {
                continue;
            }
            let Some(&from_slot) = slots.get(&conn.from) else {
                log::error!(
                    "Connection {} source {} not found in genome nodes; skipping",
                    conn.innovation,
                    conn.from
                );
                continue;
            };
            let Some(&to_slot) = slots.get(&conn.to) else {
                log::error!(
                    "Connection {} target {} not found in genome nodes; skipping",
                    conn.innovation,
                    conn.to
                );
                continue;
            };
            if self.nodes[from_slot].layer >= self.nodes[to_slot].layer {
                log::error!(
                    "Connection {} runs from layer {} to layer {}; skipping",
                    conn.innovation,
                    self.nodes[from_slot].layer,
                    self.nodes[to_slot].layer
                );
                continue;
            }
            incoming[to_slot].push((from_slot, conn_idx));
        }

        self.index = NetworkIndex {
            slots,
            layers,
            incoming,
        };
    }

    /// Forward pass: input vector in, output vector out.
    ///
    /// # Panics
    /// If `inputs.len()` differs from [`input_count`](Self::input_count).
    pub fn evaluate(&self, inputs: &[f32]) -> Vec<f32> {
        self.activate(inputs).outputs
    }

    /// Forward pass keeping every node's value (used for layout/debugging)
    ///
    /// # Panics
    /// If `inputs.len()` differs from [`input_count`](Self::input_count).
    pub fn activate(&self, inputs: &[f32]) -> Activations {
        assert_eq!(
            inputs.len(),
            self.input_ids.len(),
            "Input dimension mismatch"
        );

        let mut values = vec![0.0_f32; self.nodes.len()];
        for (id, &value) in self.input_ids.iter().zip(inputs) {
            if let Some(&slot) = self.index.slots.get(id) {
                values[slot] = value;
            }
        }
        if let Some(&slot) = self.index.slots.get(&self.bias_id) {
            values[slot] = BIAS_VALUE;
        }

        for layer in self.index.layers.iter().skip(1) {
            for &slot in layer {
                let sum: f32 = self.index.incoming[slot]
                    .iter()
                    .map(|&(from_slot, conn_idx)| {
                        values[from_slot] * self.connections[conn_idx].weight
                    })
                    .sum();
                values[slot] = self.nodes[slot].activate(sum);
            }
        }

        let outputs = self
            .output_ids
            .iter()
            .map(|id| match self.index.slots.get(id) {
                Some(&slot) => values[slot],
                None => {
                    log::error!("Output {} missing from genome nodes", id);
                    0.0
                }
            })
            .collect();

        Activations {
            node_values: values,
            outputs,
        }
    }

    /// Every connection runs from a strictly lower layer to a strictly higher
    /// one and every node sits inside `0..layer_count`.
    pub fn is_feed_forward(&self) -> bool {
        let nodes_in_range = self.nodes.iter().all(|n| n.layer < self.layer_count);
        let outputs_on_top = self
            .output_ids
            .iter()
            .filter_map(|&id| self.node(id))
            .all(|n| n.layer == self.layer_count - 1);
        let edges_forward = self.connections.iter().all(|c| {
            match (self.node(c.from), self.node(c.to)) {
                (Some(from), Some(to)) => from.layer < to.layer,
                _ => false,
            }
        });
        nodes_in_range && outputs_on_top && edges_forward
    }

    /// Every weight inside `[-maximum, maximum]`
    pub fn weights_within(&self, maximum: f32) -> bool {
        self.connections
            .iter()
            .all(|c| (-maximum..=maximum).contains(&c.weight))
    }

    // ===== Mutation operators =====

    /// Nudge or re-roll weights. Returns the number of weights touched.
    pub fn mutate_weights<R: Rng + ?Sized>(
        &mut self,
        config: &MutationConfig,
        rng: &mut R,
    ) -> usize {
        let max = config.weight_maximum;
        let mut mutated = 0;

        for conn in &mut self.connections {
            if rng.random::<f32>() >= config.weight_mutation_chance {
                continue;
            }
            if rng.random::<f32>() < config.re_randomize_weight_chance {
                conn.weight = rng.random_range(-max..=max);
            } else {
                let power = config.weight_perturbation;
                conn.weight += rng.random_range(-power..=power);
            }
            conn.weight = conn.weight.clamp(-max, max);
            mutated += 1;
        }

        mutated
    }

    /// Connect two nodes that respect the layer order and are not already
    /// connected by an enabled gene. A disabled gene for the same pair is
    /// re-enabled with a fresh weight instead of duplicated.
    ///
    /// Returns false when no legal pair exists.
    pub fn add_connection<R: Rng + ?Sized>(
        &mut self,
        tracker: &mut InnovationTracker,
        weight_maximum: f32,
        rng: &mut R,
    ) -> bool {
        let connected: HashSet<(NodeId, NodeId)> = self
            .connections
            .iter()
            .filter(|c| c.enabled)
            .map(|c| (c.from, c.to))
            .collect();

        let mut candidates = Vec::new();
        for from in &self.nodes {
            for to in &self.nodes {
                if from.layer < to.layer && !connected.contains(&(from.id, to.id)) {
                    candidates.push((from.id, to.id));
                }
            }
        }

        let Some(&(from, to)) = candidates.choose(rng) else {
            log::trace!("No legal connection left to add");
            return false;
        };
        let weight = rng.random_range(-weight_maximum..=weight_maximum);

        if let Some(existing) = self
            .connections
            .iter_mut()
            .find(|c| c.from == from && c.to == to)
        {
            existing.enabled = true;
            existing.weight = weight;
        } else {
            self.connections.push(ConnectionGene {
                from,
                to,
                weight,
                enabled: true,
                innovation: tracker.connection(from, to),
            });
        }

        log::trace!("Added connection {} -> {} ({:.3})", from, to, weight);
        self.rebuild_index();
        true
    }

    /// Split an enabled connection with a new hidden node.
    ///
    /// The old gene is disabled; the source feeds the new node with weight 1
    /// and the new node feeds the target with the old weight. When the
    /// endpoints sit in adjacent layers, every layer from the target upward is
    /// shifted by one to make room, which keeps all other connections pointing
    /// forward.
    ///
    /// Returns false when there is no enabled connection to split.
    pub fn add_node<R: Rng + ?Sized>(
        &mut self,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) -> bool {
        let enabled: Vec<usize> = self
            .connections
            .iter()
            .enumerate()
            .filter(|(_, c)| c.enabled)
            .map(|(i, _)| i)
            .collect();

        let Some(&conn_idx) = enabled.choose(rng) else {
            return false;
        };
        let old = self.connections[conn_idx].clone();

        let (Some(from_layer), Some(to_layer)) = (
            self.node(old.from).map(|n| n.layer),
            self.node(old.to).map(|n| n.layer),
        ) else {
            log::error!(
                "Cannot split connection {}: endpoint {} or {} missing from genome nodes",
                old.innovation,
                old.from,
                old.to
            );
            return false;
        };

        self.connections[conn_idx].enabled = false;

        let new_layer = from_layer + 1;
        if new_layer == to_layer {
            for node in &mut self.nodes {
                if node.layer >= to_layer {
                    node.layer += 1;
                }
            }
            self.layer_count += 1;
        }

        let mut new_id = tracker.split_node(old.innovation);
        if self.index.slots.contains_key(&new_id) {
            // This genome already split the same gene once (it was re-enabled since)
            new_id = tracker.fresh_node();
        }

        self.nodes.push(NodeGene {
            id: new_id,
            kind: NodeKind::Hidden,
            layer: new_layer,
        });
        self.connections.push(ConnectionGene {
            from: old.from,
            to: new_id,
            weight: 1.0,
            enabled: true,
            innovation: tracker.connection(old.from, new_id),
        });
        self.connections.push(ConnectionGene {
            from: new_id,
            to: old.to,
            weight: old.weight,
            enabled: true,
            innovation: tracker.connection(new_id, old.to),
        });

        log::trace!(
            "Split connection {} with {} on layer {}",
            old.innovation,
            new_id,
            new_layer
        );
        self.rebuild_index();
        true
    }

    /// Apply all mutation operators with their configured probabilities
    pub fn mutate<R: Rng + ?Sized>(
        &mut self,
        config: &MutationConfig,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) {
        self.mutate_weights(config, rng);

        if rng.random::<f32>() < config.add_connection_chance {
            self.add_connection(tracker, config.weight_maximum, rng);
        }

        if rng.random::<f32>() < config.add_node_chance {
            self.add_node(tracker, rng);
        }

        debug_assert!(self.is_feed_forward(), "Mutation broke layer order");
    }
}
