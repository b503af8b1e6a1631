//! Summit Core - control engine for an autonomous platformer agent
//!
//! Every tick an environment snapshot goes through the current genome, the
//! value table biases the result, the decoder turns it into a
//! [`ControllerFrame`], and the lifecycle may override everything to get the
//! host through cutscenes and restarts. [`BotController`] ties it together.

pub mod config;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod fitness;
pub mod frame;
pub mod lifecycle;
pub mod perception;
pub mod population;
pub mod qlearning;

pub use config::BotConfig;
pub use controller::{BotController, TickContext};
pub use decoder::{ChannelBias, ControlDecoder, DecoderConfig, OutputChannel};
pub use error::{ConfigError, PersistenceError, SnapshotError};
pub use frame::{Buttons, ControllerFrame, LongJumpTimer};
pub use lifecycle::{Lifecycle, LifecyclePhase};
pub use perception::{CutsceneStatus, EnvironmentSnapshot, HostStatus, ScalarSenses};
pub use population::{EpisodeEnd, NamePool, Population};
pub use qlearning::QTable;

pub use summit_neat as neat;
