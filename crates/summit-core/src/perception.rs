//! What the host tells the controller each tick

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;

/// Scalar senses appended after the vision grid
pub const SCALAR_SENSES: usize = 6;

/// Host answer to "is a cutscene playing?"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CutsceneStatus {
    /// Host could not tell (scene still loading, no player yet).
    /// Treated as not in a cutscene.
    #[default]
    Unknown,
    InCutscene,
    NotInCutscene,
}

impl CutsceneStatus {
    pub fn is_active(self) -> bool {
        self == CutsceneStatus::InCutscene
    }
}

/// Host flags for one tick
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HostStatus {
    pub cutscene: CutsceneStatus,
    /// Host wants a restart confirmed (e.g. a restart menu is open)
    pub quick_restart_pending: bool,
    pub is_dead: bool,
}

/// Player state scalars fed to the network after the vision grid
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScalarSenses {
    pub velocity: Vec2,
    pub can_dash: bool,
    pub stamina: f32,
    pub on_ground: bool,
    pub on_wall: bool,
}

impl ScalarSenses {
    pub fn to_array(&self) -> [f32; SCALAR_SENSES] {
        [
            self.velocity.x,
            self.velocity.y,
            if self.can_dash { 1.0 } else { 0.0 },
            self.stamina,
            if self.on_ground { 1.0 } else { 0.0 },
            if self.on_wall { 1.0 } else { 0.0 },
        ]
    }
}

/// Vision grid plus senses for one tick, validated against the grid shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    width: usize,
    height: usize,
    /// Row-major cell values, `width * height` long
    vision: Vec<f32>,
    senses: ScalarSenses,
    /// World position, used for fitness only
    position: Vec2,
}

impl EnvironmentSnapshot {
    pub fn new(
        width: usize,
        height: usize,
        vision: Vec<f32>,
        senses: ScalarSenses,
        position: Vec2,
    ) -> Result<Self, SnapshotError> {
        let expected = width * height;
        if vision.len() != expected {
            return Err(SnapshotError::VisionSize {
                width,
                height,
                expected,
                actual: vision.len(),
            });
        }
        Ok(Self {
            width,
            height,
            vision,
            senses,
            position,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn vision(&self) -> &[f32] {
        &self.vision
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<f32> {
        if x < self.width && y < self.height {
            Some(self.vision[y * self.width + x])
        } else {
            None
        }
    }

    pub fn senses(&self) -> &ScalarSenses {
        &self.senses
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Network input: vision grid row by row, then the scalar senses
    pub fn to_input_vector(&self) -> Vec<f32> {
        let mut input = Vec::with_capacity(self.vision.len() + SCALAR_SENSES);
        input.extend_from_slice(&self.vision);
        input.extend_from_slice(&self.senses.to_array());
        input
    }

    pub fn input_len(&self) -> usize {
        self.vision.len() + SCALAR_SENSES
    }
}
