//! Summit NEAT - layered evolvable networks
//!
//! Genomes are arenas of node/connection genes with a derived evaluation
//! index. Structural identity comes from a population-wide
//! [`InnovationTracker`] so crossover can align genes.

pub mod crossover;
pub mod gene;
pub mod genome;
pub mod innovation;
pub mod layout;

pub use crossover::{CompatibilityConfig, compatibility_distance, crossover};
pub use gene::{ConnectionGene, NodeGene, NodeId, NodeKind};
pub use genome::{Activations, GenomeNetwork, MutationConfig};
pub use innovation::InnovationTracker;
pub use layout::{EdgePlacement, NetworkLayout, NodePlacement};
