//! Gene alignment between genomes: crossover and compatibility distance

use ahash::HashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::gene::ConnectionGene;
use crate::genome::GenomeNetwork;

/// Probability that a gene disabled in either parent stays disabled in the child
pub const INHERIT_DISABLED_CHANCE: f32 = 0.75;

/// Genomes smaller than this are not normalized by gene count
const SMALL_GENOME_GENES: usize = 20;

/// Crossover two genomes using NEAT-style gene alignment.
///
/// The child takes every node, the layering and all disjoint/excess genes from
/// the fitter parent (ties favour `parent1`). Matching genes pick their weight
/// from a random parent. Because the child's structure is the fitter parent's
/// structure, layer order is preserved.
pub fn crossover<R: Rng + ?Sized>(
    parent1: &GenomeNetwork,
    parent1_fitness: f32,
    parent2: &GenomeNetwork,
    parent2_fitness: f32,
    rng: &mut R,
) -> GenomeNetwork {
    let (fitter, other) = if parent1_fitness >= parent2_fitness {
        (parent1, parent2)
    } else {
        (parent2, parent1)
    };

    let other_genes: HashMap<u64, &ConnectionGene> = other
        .connections()
        .iter()
        .map(|c| (c.innovation, c))
        .collect();

    let mut child = fitter.clone();
    for gene in &mut child.connections {
        let Some(matching) = other_genes.get(&gene.innovation) else {
            continue;
        };

        if rng.random::<bool>() {
            gene.weight = matching.weight;
        }

        if !gene.enabled || !matching.enabled {
            gene.enabled = rng.random::<f32>() >= INHERIT_DISABLED_CHANCE;
        }
    }

    child.rebuild_index();
    child
}

/// Coefficients of the compatibility distance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatibilityConfig {
    /// Weight of excess + disjoint gene count
    pub disjoint_coefficient: f32,
    /// Weight of the mean weight difference of matching genes
    pub weight_coefficient: f32,
    /// Genomes closer than this share a species
    pub threshold: f32,
}

impl Default for CompatibilityConfig {
    fn default() -> Self {
        Self {
            disjoint_coefficient: 2.0,
            weight_coefficient: 0.5,
            threshold: 1.0,
        }
    }
}

/// `c1 * (excess + disjoint) / N + c2 * mean |w1 - w2|` over matching genes
pub fn compatibility_distance(
    a: &GenomeNetwork,
    b: &GenomeNetwork,
    config: &CompatibilityConfig,
) -> f32 {
    let a_genes: HashMap<u64, f32> = a
        .connections()
        .iter()
        .map(|c| (c.innovation, c.weight))
        .collect();

    let mut matching = 0usize;
    let mut weight_difference = 0.0_f32;
    for gene in b.connections() {
        if let Some(&weight) = a_genes.get(&gene.innovation) {
            matching += 1;
            weight_difference += (weight - gene.weight).abs();
        }
    }

    let unmatched = (a.connections().len() - matching) + (b.connections().len() - matching);
    let largest = a.connections().len().max(b.connections().len());
    let normalizer = if largest < SMALL_GENOME_GENES {
        1.0
    } else {
        largest as f32
    };
    let mean_weight_difference = if matching == 0 {
        0.0
    } else {
        weight_difference / matching as f32
    };

    config.disjoint_coefficient * unmatched as f32 / normalizer
        + config.weight_coefficient * mean_weight_difference
}
