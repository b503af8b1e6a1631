//! Per-frame virtual controller input

use bitflags::bitflags;
use glam::Vec2;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Digital buttons of the virtual controller.
    ///
    /// Flags are addressed by name everywhere outside this block (action keys,
    /// logs, persisted tables), so new buttons can take any free bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Buttons: u32 {
        const ESCAPE = 1 << 0;
        const PAUSE = 1 << 1;
        const MENU_CONFIRM = 1 << 2;
        const MENU_CANCEL = 1 << 3;
        const MENU_DOWN = 1 << 4;
        const QUICK_RESTART = 1 << 5;
        const JUMP = 1 << 6;
        const DASH = 1 << 7;
        const GRAB = 1 << 8;
        const TALK = 1 << 9;
    }
}

impl Buttons {
    /// Names of the set flags joined with `|`, `"NONE"` when empty
    pub fn names(&self) -> String {
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        if names.is_empty() {
            "NONE".to_string()
        } else {
            names.join("|")
        }
    }
}

/// One tick's intended controller input. Never modified after it is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControllerFrame {
    /// Horizontal axis in [-1, 1]
    pub move_x: f32,
    /// Vertical axis in [-1, 1]
    pub move_y: f32,
    /// Dash direction, only present on frames that press dash
    pub aim: Option<Vec2>,
    pub buttons: Buttons,
}

impl ControllerFrame {
    /// No axes, no buttons
    pub fn neutral() -> Self {
        Self::default()
    }

    /// A frame pressing exactly `buttons`
    pub fn only(buttons: Buttons) -> Self {
        Self {
            buttons,
            ..Self::default()
        }
    }

    pub fn pressed(&self, button: Buttons) -> bool {
        self.buttons.contains(button)
    }
}

impl std::fmt::Display for ControllerFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[x {:+.2}, y {:+.2}, {}]",
            self.move_x,
            self.move_y,
            self.buttons.names()
        )
    }
}

/// Multi-frame jump hold triggered by a single long-jump request.
///
/// Every frame built through [`apply`](Self::apply) is subject to the hold,
/// including frames forced by the lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongJumpTimer {
    frame_count: u32,
    remaining: u32,
}

impl LongJumpTimer {
    pub const DEFAULT_FRAME_COUNT: u32 = 20;

    /// `frame_count` is the total number of frames a long jump holds jump,
    /// counting the frame that requested it
    pub fn new(frame_count: u32) -> Self {
        Self {
            frame_count,
            remaining: 0,
        }
    }

    /// Frames still forced after the current one
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_holding(&self) -> bool {
        self.remaining > 0
    }

    /// Apply the hold to a freshly built frame.
    ///
    /// While frames remain, jump is forced and the countdown drops by one. A
    /// new request is only accepted once the countdown is at zero; it presses
    /// jump now and keeps it pressed for the next `frame_count - 1` frames.
    pub fn apply(&mut self, frame: &mut ControllerFrame, requested: bool) {
        if self.remaining > 0 {
            frame.buttons.insert(Buttons::JUMP);
            self.remaining -= 1;
        } else if requested {
            frame.buttons.insert(Buttons::JUMP);
            self.remaining = self.frame_count.saturating_sub(1);
        }
    }

    /// Drop any hold in progress (new agent, restart)
    pub fn cancel(&mut self) {
        self.remaining = 0;
    }
}

impl Default for LongJumpTimer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FRAME_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_names() {
        assert_eq!(Buttons::empty().names(), "NONE");
        assert_eq!((Buttons::JUMP | Buttons::DASH).names(), "JUMP|DASH");
    }

    #[test]
    fn test_only_sets_requested_buttons() {
        let frame = ControllerFrame::only(Buttons::MENU_CONFIRM);
        assert!(frame.pressed(Buttons::MENU_CONFIRM));
        assert_eq!(frame.buttons, Buttons::MENU_CONFIRM);
        assert_eq!(frame.aim, None);
    }

    #[test]
    fn test_long_jump_holds_for_frame_count() {
        let mut timer = LongJumpTimer::new(4);

        let mut jumps = 0;
        for tick in 0..10 {
            let mut frame = ControllerFrame::neutral();
            timer.apply(&mut frame, tick == 0);
            if frame.pressed(Buttons::JUMP) {
                jumps += 1;
            }
        }
        assert_eq!(jumps, 4);
        assert!(!timer.is_holding());
    }

    #[test]
    fn test_long_jump_ignores_requests_while_holding() {
        let mut timer = LongJumpTimer::new(3);
        let mut frame = ControllerFrame::neutral();
        timer.apply(&mut frame, true);
        assert_eq!(timer.remaining(), 2);

        let mut frame = ControllerFrame::neutral();
        timer.apply(&mut frame, true);
        assert!(frame.pressed(Buttons::JUMP));
        assert_eq!(timer.remaining(), 1);
    }

    #[test]
    fn test_long_jump_forces_jump_on_forced_frames() {
        let mut timer = LongJumpTimer::new(3);
        timer.apply(&mut ControllerFrame::neutral(), true);

        let mut forced = ControllerFrame::only(Buttons::ESCAPE);
        timer.apply(&mut forced, false);
        assert_eq!(forced.buttons, Buttons::ESCAPE | Buttons::JUMP);
    }

    #[test]
    fn test_cancel_clears_hold() {
        let mut timer = LongJumpTimer::default();
        timer.apply(&mut ControllerFrame::neutral(), true);
        assert!(timer.is_holding());
        timer.cancel();

        let mut frame = ControllerFrame::neutral();
        timer.apply(&mut frame, false);
        assert!(!frame.pressed(Buttons::JUMP));
    }
}
