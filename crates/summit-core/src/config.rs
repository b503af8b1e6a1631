//! Controller configuration
//!
//! All values are plain scalars read once at startup. Every section falls
//! back to its defaults for missing fields.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use summit_neat::MutationConfig;

use crate::decoder::{DecoderConfig, OutputChannel};
use crate::error::ConfigError;
use crate::fitness::FitnessConfig;
use crate::perception::SCALAR_SENSES;
use crate::population::PopulationConfig;
use crate::qlearning::QLearningConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub width: usize,
    pub height: usize,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            width: 20,
            height: 20,
        }
    }
}

impl VisionConfig {
    /// Network input size: every grid cell plus the scalar senses
    pub fn input_count(&self) -> usize {
        self.width * self.height + SCALAR_SENSES
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// One organism name per line
    pub organism_names: PathBuf,
    /// One species name per line
    pub species_names: PathBuf,
    pub value_table: PathBuf,
    pub checkpoint_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            organism_names: PathBuf::from("organismNames.txt"),
            species_names: PathBuf::from("speciesNames.txt"),
            value_table: PathBuf::from("QTable.tbl"),
            checkpoint_dir: PathBuf::from("checkpoints"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub decoder: DecoderConfig,
    pub mutation: MutationConfig,
    pub vision: VisionConfig,
    pub population: PopulationConfig,
    pub qlearning: QLearningConfig,
    pub fitness: FitnessConfig,
    pub paths: PathsConfig,
}

fn probability(field: &'static str, value: f32) -> Result<(), ConfigError> {
    in_range(field, value, 0.0, 1.0)
}

fn in_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: value as f64,
            min: min as f64,
            max: max as f64,
        })
    }
}

fn at_least(field: &'static str, value: u64, min: u64) -> Result<(), ConfigError> {
    if value >= min {
        Ok(())
    } else {
        Err(ConfigError::TooSmall { field, value, min })
    }
}

impl BotConfig {
    pub fn input_count(&self) -> usize {
        self.vision.input_count()
    }

    pub fn output_count(&self) -> usize {
        OutputChannel::COUNT
    }

    /// Reject values that would make the controller misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        probability("decoder.action_threshold", self.decoder.action_threshold)?;
        at_least("decoder.long_jump_frames", self.decoder.long_jump_frames as u64, 1)?;

        in_range("mutation.weight_maximum", self.mutation.weight_maximum, f32::EPSILON, 1000.0)?;
        probability("mutation.weight_mutation_chance", self.mutation.weight_mutation_chance)?;
        probability(
            "mutation.re_randomize_weight_chance",
            self.mutation.re_randomize_weight_chance,
        )?;
        in_range(
            "mutation.weight_perturbation",
            self.mutation.weight_perturbation,
            0.0,
            self.mutation.weight_maximum * 2.0,
        )?;
        probability("mutation.add_connection_chance", self.mutation.add_connection_chance)?;
        probability("mutation.add_node_chance", self.mutation.add_node_chance)?;

        at_least("vision.width", self.vision.width as u64, 1)?;
        at_least("vision.height", self.vision.height as u64, 1)?;

        at_least("population.size", self.population.size as u64, 1)?;
        at_least(
            "population.extinction_save_top",
            self.population.extinction_save_top as u64,
            1,
        )?;
        probability("population.clone_chance", self.population.clone_chance)?;
        in_range(
            "population.death_reset_seconds",
            self.population.death_reset_seconds,
            0.0,
            3600.0,
        )?;
        at_least(
            "population.max_frames_per_agent",
            self.population.max_frames_per_agent as u64,
            1,
        )?;

        probability("qlearning.learning_rate", self.qlearning.learning_rate)?;
        probability("qlearning.discount", self.qlearning.discount)?;
        probability("qlearning.exploration", self.qlearning.exploration)?;
        in_range(
            "qlearning.correction_strength",
            self.qlearning.correction_strength,
            0.0,
            2.0,
        )?;

        in_range(
            "fitness.target_reach_threshold",
            self.fitness.target_reach_threshold,
            0.0,
            f32::MAX,
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BotConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.input_count(), 406);
        assert_eq!(config.output_count(), 6);
        assert_eq!(config.decoder.action_threshold, 0.55);
        assert_eq!(config.mutation.weight_maximum, 3.0);
        assert_eq!(config.population.extinction_save_top, 5);
        assert_eq!(config.population.grace_buffer_frames, 160);
        assert_eq!(config.fitness.target_reach_threshold, 8.0);
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let mut config = BotConfig::default();
        config.decoder.action_threshold = 55.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "decoder.action_threshold",
                ..
            })
        ));
    }

    #[test]
    fn test_empty_vision_rejected() {
        let mut config = BotConfig::default();
        config.vision.width = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooSmall {
                field: "vision.width",
                value: 0,
                min: 1
            })
        );
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config: BotConfig = ron::from_str("(vision: (width: 8))").unwrap();
        assert_eq!(config.vision.width, 8);
        assert_eq!(config.vision.height, 20);
        assert_eq!(config.population, PopulationConfig::default());
    }
}
