//! Grouping genomes by compatibility distance

use serde::{Deserialize, Serialize};
use summit_neat::{CompatibilityConfig, GenomeNetwork, compatibility_distance};

use super::names::NamePool;

/// A cluster of similar genomes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    pub name: String,
    /// Genome new members are compared against
    pub representative: GenomeNetwork,
    /// Indices into the population's agent list
    pub members: Vec<usize>,
    /// Best fitness this species ever reached
    pub best_fitness: f32,
    /// Generations since `best_fitness` last improved
    pub staleness: u32,
    pub average_fitness: f32,
}

impl Species {
    pub fn new(name: String, representative: GenomeNetwork) -> Self {
        Self {
            name,
            representative,
            members: Vec::new(),
            best_fitness: f32::MIN,
            staleness: 0,
            average_fitness: 0.0,
        }
    }

    /// Refresh average and staleness from member fitness values.
    /// Returns the best fitness among current members.
    pub fn update_fitness(&mut self, fitness_of: impl Fn(usize) -> f32) -> f32 {
        if self.members.is_empty() {
            self.average_fitness = 0.0;
            return f32::MIN;
        }

        let values: Vec<f32> = self.members.iter().map(|&m| fitness_of(m)).collect();
        let best = values.iter().copied().fold(f32::MIN, f32::max);
        self.average_fitness = values.iter().sum::<f32>() / values.len() as f32;

        if best > self.best_fitness {
            self.best_fitness = best;
            self.staleness = 0;
        } else {
            self.staleness += 1;
        }
        best
    }
}

/// Assign each genome to the first species whose representative is within
/// the compatibility threshold, founding new species as needed. Previous
/// species keep their names and history; those left without members are
/// dropped.
pub fn speciate<'a>(
    species: &mut Vec<Species>,
    genomes: impl IntoIterator<Item = &'a GenomeNetwork>,
    config: &CompatibilityConfig,
    names: &mut NamePool,
) {
    for s in species.iter_mut() {
        s.members.clear();
    }

    for (index, genome) in genomes.into_iter().enumerate() {
        let home = species.iter().position(|s| {
            compatibility_distance(&s.representative, genome, config) < config.threshold
        });
        match home {
            Some(i) => species[i].members.push(index),
            None => {
                let mut founded = Species::new(names.next_name(), genome.clone());
                founded.members.push(index);
                log::debug!("New species '{}'", founded.name);
                species.push(founded);
            }
        }
    }

    species.retain(|s| !s.members.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use summit_neat::InnovationTracker;

    #[test]
    fn test_identical_genomes_share_species() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);
        let mut tracker = InnovationTracker::for_network(3, 2);
        let genome = GenomeNetwork::minimal(3, 2, &mut tracker, 3.0, &mut rng);
        let genomes = vec![genome.clone(), genome.clone(), genome];

        let mut species = Vec::new();
        let mut names = NamePool::new(vec!["Alpha".to_string()], 1);
        speciate(&mut species, &genomes, &CompatibilityConfig::default(), &mut names);

        assert_eq!(species.len(), 1);
        assert_eq!(species[0].members, vec![0, 1, 2]);
        assert_eq!(species[0].name, "Alpha");
    }

    #[test]
    fn test_distant_genomes_split() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);
        let mut tracker = InnovationTracker::for_network(3, 2);
        let a = GenomeNetwork::minimal(3, 2, &mut tracker, 3.0, &mut rng);
        let mut b = a.clone();
        for _ in 0..4 {
            b.add_connection(&mut tracker, 3.0, &mut rng);
        }

        let mut species = Vec::new();
        let mut names = NamePool::empty();
        let config = CompatibilityConfig {
            disjoint_coefficient: 1.0,
            weight_coefficient: 0.0,
            threshold: 2.0,
        };
        speciate(&mut species, [&a, &b], &config, &mut names);

        assert_eq!(species.len(), 2);
    }

    #[test]
    fn test_staleness_counts_generations_without_improvement() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);
        let mut tracker = InnovationTracker::for_network(1, 1);
        let genome = GenomeNetwork::minimal(1, 1, &mut tracker, 3.0, &mut rng);
        let mut species = Species::new("S".into(), genome);
        species.members = vec![0, 1];

        let fitness = [4.0, 2.0];
        assert_eq!(species.update_fitness(|i| fitness[i]), 4.0);
        assert_eq!(species.average_fitness, 3.0);
        assert_eq!(species.staleness, 0);

        species.update_fitness(|i| fitness[i]);
        assert_eq!(species.staleness, 1);
    }
}
