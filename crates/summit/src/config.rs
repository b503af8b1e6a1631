//! Trainer configuration with layered loading
//!
//! Configuration is loaded from multiple sources (lowest to highest priority):
//! 1. Compiled defaults
//! 2. `summit.ron` file (if exists), or the file given on the command line
//! 3. Environment variables prefixed with `SUMMIT_`
//!
//! Example environment variable: `SUMMIT_BOT__DECODER__ACTION_THRESHOLD=0.6`

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::{Deserialize, Serialize};
use summit_core::BotConfig;

use crate::headless::TrainingConfig;

/// Everything the trainer reads at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummitConfig {
    /// Controller, evolution and learning parameters
    #[serde(default)]
    pub bot: BotConfig,

    /// Headless run parameters
    #[serde(default)]
    pub training: TrainingConfig,
}

impl SummitConfig {
    /// Load with `summit.ron` from the working directory as the optional
    /// file layer
    pub fn load() -> Result<Self> {
        let builder = Self::defaults()?.add_source(
            File::with_name("summit")
                .format(FileFormat::Ron)
                .required(false),
        );
        Self::finish(builder)
    }

    /// Load with an explicit configuration file, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let builder = Self::defaults()?.add_source(
            File::from(path)
                .format(FileFormat::Ron)
                .required(true),
        );
        Self::finish(builder)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let training = TrainingConfig::default();
        let builder = Config::builder()
            // Layer 1: Compiled defaults. Bot sections fall back field by
            // field through their serde defaults.
            .set_default("training.generations", i64::from(training.generations))?
            .set_default(
                "training.checkpoint_interval",
                i64::from(training.checkpoint_interval),
            )?
            .set_default("training.frame_rate", f64::from(training.frame_rate))?
            .set_default("training.seed", i64::try_from(training.seed)?)?;
        Ok(builder)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        // Layer 3: Environment variables (SUMMIT_TRAINING__GENERATIONS, etc.)
        let config = builder
            .add_source(
                Environment::with_prefix("SUMMIT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let loaded: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        loaded.bot.validate().context("Invalid configuration")?;
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SummitConfig::default();
        assert_eq!(config.bot.decoder.action_threshold, 0.55);
        assert_eq!(config.bot.vision.width, 20);
        assert_eq!(config.training.generations, 50);
        assert!(config.training.course.is_none());
    }

    #[test]
    fn test_file_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.ron");
        std::fs::write(
            &path,
            "(\n  bot: (\n    decoder: (action_threshold: 0.7),\n    population: (size: 12),\n  ),\n  training: (generations: 3),\n)\n",
        )
        .unwrap();

        let config = SummitConfig::load_from(&path).unwrap();
        assert!((config.bot.decoder.action_threshold - 0.7).abs() < 1e-6);
        assert_eq!(config.bot.population.size, 12);
        assert_eq!(config.training.generations, 3);

        // Untouched values keep their defaults
        assert_eq!(config.bot.decoder.long_jump_frames, 20);
        assert_eq!(config.bot.population.grace_buffer_frames, 160);
        assert_eq!(config.training.checkpoint_interval, 5);
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SummitConfig::load_from(&dir.path().join("nope.ron")).is_err());
    }

    #[test]
    fn test_out_of_range_value_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ron");
        std::fs::write(&path, "(bot: (decoder: (action_threshold: 1.5)))").unwrap();

        let err = SummitConfig::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("action_threshold"));
    }
}
