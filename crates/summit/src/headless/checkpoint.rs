//! Best-genome checkpoints written as pretty RON

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use summit_core::Population;
use summit_core::neat::GenomeNetwork;

const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    /// Generation the checkpoint was taken after
    pub generation: u32,
    pub fitness: f32,
    pub agent_name: String,
    pub species: String,
    /// RFC 3339, local time
    pub created_at: String,
    pub best_history: Vec<f32>,
    pub genome: GenomeNetwork,
}

impl Checkpoint {
    /// Snapshot of the best agent seen so far, if any agent has finished
    pub fn from_population(population: &Population) -> Option<Self> {
        let best = population.best_agent()?;
        Some(Self {
            version: CHECKPOINT_VERSION,
            generation: population.generation(),
            fitness: best.fitness,
            agent_name: best.name.clone(),
            species: best.species.clone(),
            created_at: chrono::Local::now().to_rfc3339(),
            best_history: population.best_history().to_vec(),
            genome: best.genome.clone(),
        })
    }

    pub fn file_name(&self) -> String {
        format!("gen_{:04}_best.ron", self.generation)
    }

    /// Write into `dir`, replacing an older checkpoint of the same
    /// generation. Returns the written path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).with_context(|| {
            format!("Failed to create checkpoint directory: {}", dir.display())
        })?;

        let ron = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .context("Failed to serialize checkpoint to RON")?;

        let path = dir.join(self.file_name());
        let temp_path = path.with_extension("ron.tmp");
        std::fs::write(&temp_path, ron).with_context(|| {
            format!("Failed to write checkpoint file: {}", temp_path.display())
        })?;
        std::fs::rename(&temp_path, &path).with_context(|| {
            format!("Failed to move checkpoint into place: {}", path.display())
        })?;

        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read checkpoint file: {}", path.display()))?;
        let checkpoint: Self = ron::from_str(&content)
            .with_context(|| format!("Failed to parse RON checkpoint: {}", path.display()))?;

        if checkpoint.version != CHECKPOINT_VERSION {
            anyhow::bail!(
                "Checkpoint {} has version {}, expected {}",
                path.display(),
                checkpoint.version,
                CHECKPOINT_VERSION
            );
        }
        Ok(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use summit_core::neat::MutationConfig;
    use summit_core::population::PopulationConfig;
    use summit_core::{EpisodeEnd, NamePool};

    fn finished_population() -> Population {
        let config = PopulationConfig {
            size: 3,
            ..PopulationConfig::default()
        };
        let mut population = Population::new(
            config,
            MutationConfig::default(),
            5,
            6,
            NamePool::new(vec!["Ada".into(), "Bo".into(), "Cy".into()], 1),
            NamePool::new(vec!["Ferns".into()], 2),
            9,
        );
        population.finish_current(1.0, EpisodeEnd::Death);
        population.finish_current(7.5, EpisodeEnd::Timeout);
        population.finish_current(3.0, EpisodeEnd::Death);
        population
    }

    #[test]
    fn test_no_checkpoint_before_first_generation() {
        let population = Population::new(
            PopulationConfig::default(),
            MutationConfig::default(),
            5,
            6,
            NamePool::empty(),
            NamePool::empty(),
            1,
        );
        assert!(Checkpoint::from_population(&population).is_none());
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let population = finished_population();
        let checkpoint = Checkpoint::from_population(&population).unwrap();
        assert_eq!(checkpoint.generation, 1);
        assert_eq!(checkpoint.fitness, 7.5);
        assert!(!checkpoint.agent_name.is_empty());

        let dir = tempfile::tempdir().unwrap();
        let path = checkpoint.save(dir.path()).unwrap();
        assert!(path.ends_with("gen_0001_best.ron"));
        assert!(!path.with_extension("ron.tmp").exists());

        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded.agent_name, checkpoint.agent_name);
        assert_eq!(loaded.best_history, checkpoint.best_history);
        assert_eq!(
            loaded.genome.connections().len(),
            checkpoint.genome.connections().len()
        );

        let input = [0.25; 5];
        assert_eq!(
            loaded.genome.evaluate(&input),
            checkpoint.genome.evaluate(&input)
        );
    }

    #[test]
    fn test_wrong_version_rejected() {
        let population = finished_population();
        let mut checkpoint = Checkpoint::from_population(&population).unwrap();
        checkpoint.version = 99;

        let dir = tempfile::tempdir().unwrap();
        let path = checkpoint.save(dir.path()).unwrap();
        assert!(Checkpoint::load(&path).is_err());
    }
}
