//! Recovery from host-driven interruptions
//!
//! Skipping a cutscene takes three frames: escape opens the pause menu, menu
//! down selects "skip", menu confirm accepts. A confirmed quick restart takes
//! two: quick restart, then menu confirm.
//!
//! Only one bit is persisted (`in_cutscene`). Which step comes next is read
//! from the buttons of the previously emitted frame, so nothing else may
//! emit escape or menu down while a skip is in flight.

use serde::{Deserialize, Serialize};

use crate::frame::{Buttons, ControllerFrame};
use crate::perception::HostStatus;

/// Phase as seen from outside, derived from the flag and the previous frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecyclePhase {
    Playing,
    CutsceneEscaping,
    CutsceneConfirming,
}

/// Frame the lifecycle wants emitted instead of the decoder's output.
/// Only the buttons are forced; the long-jump hold still applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Override {
    pub buttons: Buttons,
    pub reason: OverrideReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideReason {
    CutsceneEscape,
    CutsceneMenuDown,
    CutsceneConfirm,
    RestartConfirm,
    RestartRequest,
}

impl Override {
    fn new(buttons: Buttons, reason: OverrideReason) -> Self {
        Self { buttons, reason }
    }

    pub fn frame(&self) -> ControllerFrame {
        ControllerFrame::only(self.buttons)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    in_cutscene: bool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_cutscene(&self) -> bool {
        self.in_cutscene
    }

    pub fn phase(&self, previous: &ControllerFrame) -> LifecyclePhase {
        if !self.in_cutscene {
            LifecyclePhase::Playing
        } else if previous.pressed(Buttons::MENU_DOWN) {
            LifecyclePhase::CutsceneConfirming
        } else {
            LifecyclePhase::CutsceneEscaping
        }
    }

    /// Decide whether this tick is forced. `None` means normal control.
    pub fn step(&mut self, previous: &ControllerFrame, host: &HostStatus) -> Option<Override> {
        if self.in_cutscene {
            if previous.pressed(Buttons::ESCAPE) {
                log::debug!("Cutscene skip: menu down");
                return Some(Override::new(Buttons::MENU_DOWN, OverrideReason::CutsceneMenuDown));
            }
            self.in_cutscene = false;
            if previous.pressed(Buttons::MENU_DOWN) {
                log::info!("Cutscene skip complete");
                return Some(Override::new(Buttons::MENU_CONFIRM, OverrideReason::CutsceneConfirm));
            }
            log::debug!("Cutscene resolved without skip, resuming control");
        } else if host.cutscene.is_active() {
            log::info!("Entered cutscene, skipping");
            self.in_cutscene = true;
            return Some(Override::new(Buttons::ESCAPE, OverrideReason::CutsceneEscape));
        }

        if previous.pressed(Buttons::QUICK_RESTART) {
            log::debug!("Confirming quick restart");
            return Some(Override::new(Buttons::MENU_CONFIRM, OverrideReason::RestartConfirm));
        }

        if host.quick_restart_pending {
            return Some(Override::new(Buttons::QUICK_RESTART, OverrideReason::RestartRequest));
        }

        None
    }

    /// Forget any skip in progress
    pub fn reset(&mut self) {
        self.in_cutscene = false;
    }
}
