//! Episode scoring against an ordered list of target points

use glam::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessConfig {
    /// Distance in pixels at which a target counts as reached
    pub target_reach_threshold: f32,
    /// Score for each reached target
    pub target_reward: f32,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            target_reach_threshold: 8.0,
            target_reward: 100.0,
        }
    }
}

/// Tracks one agent's progress through the targets.
///
/// `score` is the instantaneous standing (reached targets plus partial
/// progress toward the current one); `fitness` is the best score so far.
#[derive(Debug, Clone)]
pub struct FitnessTracker {
    config: FitnessConfig,
    spawn: Vec2,
    targets: Vec<Vec2>,
    next_target: usize,
    segment_start: Vec2,
    score: f32,
    fitness: f32,
}

impl FitnessTracker {
    pub fn new(config: FitnessConfig, spawn: Vec2, targets: Vec<Vec2>) -> Self {
        Self {
            config,
            spawn,
            targets,
            next_target: 0,
            segment_start: spawn,
            score: 0.0,
            fitness: 0.0,
        }
    }

    pub fn fitness(&self) -> f32 {
        self.fitness
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn current_target(&self) -> Option<Vec2> {
        self.targets.get(self.next_target).copied()
    }

    pub fn targets_reached(&self) -> usize {
        self.next_target
    }

    pub fn goal_reached(&self) -> bool {
        !self.targets.is_empty() && self.next_target == self.targets.len()
    }

    /// Score the new position. Returns the change in score, used as reward.
    pub fn update(&mut self, position: Vec2) -> f32 {
        let previous = self.score;

        if self.targets.is_empty() {
            self.score = position.distance(self.spawn);
        } else {
            while let Some(target) = self.current_target() {
                if position.distance(target) > self.config.target_reach_threshold {
                    break;
                }
                log::debug!(
                    "Reached target {} of {} at {:?}",
                    self.next_target + 1,
                    self.targets.len(),
                    target
                );
                self.segment_start = target;
                self.next_target += 1;
            }

            let reached = self.next_target as f32 * self.config.target_reward;
            let partial = match self.current_target() {
                Some(target) => {
                    let span = self.segment_start.distance(target).max(f32::EPSILON);
                    let progress = (1.0 - position.distance(target) / span).clamp(0.0, 1.0);
                    progress * self.config.target_reward
                }
                None => 0.0,
            };
            self.score = reached + partial;
        }

        self.fitness = self.fitness.max(self.score);
        self.score - previous
    }
}
