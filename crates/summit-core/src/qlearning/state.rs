//! Discrete keys for the value table

use serde::{Deserialize, Serialize};

use crate::frame::{Buttons, ControllerFrame};
use crate::perception::EnvironmentSnapshot;

/// Buttons that take part in an action key; menu buttons never do
const ACTION_BUTTONS: Buttons = Buttons::JUMP.union(Buttons::DASH).union(Buttons::GRAB);

/// Axis values inside this band count as centered
const AXIS_DEADZONE: f32 = 0.3;

/// Side of the vision window sampled around the grid center
const VISION_WINDOW: usize = 3;

/// Speeds are bucketed in steps of this size
const VELOCITY_BUCKET: f32 = 60.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateKey(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionKey(pub String);

impl From<&str> for StateKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for ActionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for ActionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn axis_sign(value: f32) -> i8 {
    if value > AXIS_DEADZONE {
        1
    } else if value < -AXIS_DEADZONE {
        -1
    } else {
        0
    }
}

/// Coarse description of a frame: axis directions plus gameplay buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionPattern {
    pub x: i8,
    pub y: i8,
    pub buttons: Buttons,
}

impl ActionPattern {
    pub fn of(frame: &ControllerFrame) -> Self {
        Self {
            x: axis_sign(frame.move_x),
            y: axis_sign(frame.move_y),
            buttons: frame.buttons & ACTION_BUTTONS,
        }
    }

    /// `x<sign> y<sign> <BUTTONS>`, e.g. `x1 y0 JUMP|DASH`
    pub fn key(&self) -> ActionKey {
        ActionKey(format!("x{} y{} {}", self.x, self.y, self.buttons.names()))
    }

    /// Inverse of [`key`](Self::key); foreign keys yield `None`
    pub fn parse(key: &ActionKey) -> Option<Self> {
        let mut parts = key.0.split(' ');
        let x = parts.next()?.strip_prefix('x')?.parse().ok()?;
        let y = parts.next()?.strip_prefix('y')?.parse().ok()?;
        let names = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let mut buttons = Buttons::empty();
        if names != "NONE" {
            for name in names.split('|') {
                buttons |= Buttons::from_name(name)?;
            }
        }

        Some(Self { x, y, buttons })
    }
}

/// Discretize a snapshot: velocity buckets, contact flags and the cells
/// around the grid center
pub fn state_key(snapshot: &EnvironmentSnapshot) -> StateKey {
    let senses = snapshot.senses();
    let vx = (senses.velocity.x / VELOCITY_BUCKET).round() as i32;
    let vy = (senses.velocity.y / VELOCITY_BUCKET).round() as i32;

    let mut key = format!(
        "v{},{} g{} w{} d{} |",
        vx,
        vy,
        u8::from(senses.on_ground),
        u8::from(senses.on_wall),
        u8::from(senses.can_dash)
    );

    let (cx, cy) = (snapshot.width() / 2, snapshot.height() / 2);
    let half = VISION_WINDOW / 2;
    for y in cy.saturating_sub(half)..=cy + half {
        for x in cx.saturating_sub(half)..=cx + half {
            if let Some(cell) = snapshot.cell(x, y) {
                key.push(if cell > 0.0 {
                    '#'
                } else if cell < 0.0 {
                    '!'
                } else {
                    '.'
                });
            }
        }
    }

    StateKey(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::ScalarSenses;
    use glam::Vec2;

    #[test]
    fn test_action_key_round_trip() {
        let frame = ControllerFrame {
            move_x: 0.9,
            move_y: -0.1,
            aim: None,
            buttons: Buttons::JUMP | Buttons::DASH | Buttons::ESCAPE,
        };
        let pattern = ActionPattern::of(&frame);
        assert_eq!(pattern.key().0, "x1 y0 JUMP|DASH");
        assert_eq!(ActionPattern::parse(&pattern.key()), Some(pattern));
    }

    #[test]
    fn test_foreign_action_keys_do_not_parse() {
        assert_eq!(ActionPattern::parse(&ActionKey::from("a1")), None);
        assert_eq!(ActionPattern::parse(&ActionKey::from("x1 y0 FLY")), None);
    }

    #[test]
    fn test_state_key_depends_on_center_cells() {
        let mut vision = vec![0.0; 25];
        let a = EnvironmentSnapshot::new(5, 5, vision.clone(), ScalarSenses::default(), Vec2::ZERO)
            .unwrap();
        vision[12] = 1.0;
        let b = EnvironmentSnapshot::new(5, 5, vision.clone(), ScalarSenses::default(), Vec2::ZERO)
            .unwrap();
        // Corner cells are outside the sampled window
        vision[0] = -1.0;
        let c =
            EnvironmentSnapshot::new(5, 5, vision, ScalarSenses::default(), Vec2::ZERO).unwrap();

        assert_ne!(state_key(&a), state_key(&b));
        assert_eq!(state_key(&b), state_key(&c));
    }
}
