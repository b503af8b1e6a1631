//! Summit - headless neuroevolution trainer
//!
//! Wires [`summit_core::BotController`] to a small deterministic course so
//! agents can be evolved without a game running. Configuration is layered
//! from defaults, `summit.ron` and `SUMMIT_` environment variables.

pub mod config;
pub mod headless;

pub use config::SummitConfig;
