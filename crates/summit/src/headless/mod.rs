//! Headless training without a game attached
//!
//! - A deterministic tile course that answers snapshot and status queries
//! - A training loop that steps controller and course in lockstep
//! - Best-genome checkpoints in RON

mod checkpoint;
mod course;
mod training_env;

pub use checkpoint::Checkpoint;
pub use course::{Course, CourseStats, DEFAULT_COURSE, PhysicsConfig, TILE_SIZE, Tile};
pub use training_env::{TrainingConfig, TrainingEnv, TrainingStats};
