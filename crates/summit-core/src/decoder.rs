//! Network outputs to controller frames
//!
//! Decoding is split in two: [`ControlDecoder::decode_channels`] is a pure
//! thresholding pass, [`ControlDecoder::decode`] then runs the frame through
//! the long-jump hold.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::frame::{Buttons, ControllerFrame, LongJumpTimer};

/// Meaning of each position in the network's output vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputChannel {
    MoveX,
    MoveY,
    Jump,
    Dash,
    Grab,
    LongJump,
}

impl OutputChannel {
    pub const COUNT: usize = 6;

    pub const ALL: [OutputChannel; Self::COUNT] = [
        OutputChannel::MoveX,
        OutputChannel::MoveY,
        OutputChannel::Jump,
        OutputChannel::Dash,
        OutputChannel::Grab,
        OutputChannel::LongJump,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Label shown next to the output node when the network is drawn
    pub fn label(self) -> &'static str {
        match self {
            OutputChannel::MoveX => "Left/Right",
            OutputChannel::MoveY => "Up/Down",
            OutputChannel::Jump => "Jump",
            OutputChannel::Dash => "Dash",
            OutputChannel::Grab => "Grab",
            OutputChannel::LongJump => "Long Jump",
        }
    }

    /// Button pressed by this channel, if it maps to one directly
    pub fn button(self) -> Option<Buttons> {
        match self {
            OutputChannel::Jump => Some(Buttons::JUMP),
            OutputChannel::Dash => Some(Buttons::DASH),
            OutputChannel::Grab => Some(Buttons::GRAB),
            _ => None,
        }
    }

    pub fn is_axis(self) -> bool {
        matches!(self, OutputChannel::MoveX | OutputChannel::MoveY)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Magnitude a button channel must exceed to count as pressed (0..1)
    pub action_threshold: f32,
    /// Frames a long jump holds jump, including the requesting frame
    pub long_jump_frames: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            action_threshold: 0.55,
            long_jump_frames: LongJumpTimer::DEFAULT_FRAME_COUNT,
        }
    }
}

impl DecoderConfig {
    /// Threshold given as a percentage of full scale (55 -> 0.55)
    pub fn from_percent(percent: f32) -> Self {
        Self {
            action_threshold: percent / 100.0,
            ..Self::default()
        }
    }
}

/// Per-channel push applied before thresholding.
///
/// Axis channels are shifted by the bias. Button channels have their
/// magnitude shifted, so a positive bias makes a press more likely and a
/// negative bias less likely.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelBias(pub [f32; OutputChannel::COUNT]);

impl ChannelBias {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.0.iter().all(|&b| b == 0.0)
    }

    pub fn get(&self, channel: OutputChannel) -> f32 {
        self.0[channel.index()]
    }

    pub fn set(&mut self, channel: OutputChannel, bias: f32) {
        self.0[channel.index()] = bias;
    }
}

/// Thresholded outputs before the long-jump hold is applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedAction {
    pub frame: ControllerFrame,
    pub long_jump: bool,
}

#[derive(Debug, Clone)]
pub struct ControlDecoder {
    config: DecoderConfig,
}

impl ControlDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    fn button_pressed(&self, value: f32, bias: f32) -> bool {
        value.abs() + bias > self.config.action_threshold
    }

    /// Threshold every channel. No state is read or written.
    ///
    /// # Panics
    /// If `outputs` does not hold exactly [`OutputChannel::COUNT`] values.
    pub fn decode_channels(&self, outputs: &[f32], bias: &ChannelBias) -> DecodedAction {
        assert_eq!(
            outputs.len(),
            OutputChannel::COUNT,
            "Output vector must have one value per output channel"
        );

        let value = |channel: OutputChannel| outputs[channel.index()];

        let mut frame = ControllerFrame {
            move_x: (value(OutputChannel::MoveX) + bias.get(OutputChannel::MoveX)).clamp(-1.0, 1.0),
            move_y: (value(OutputChannel::MoveY) + bias.get(OutputChannel::MoveY)).clamp(-1.0, 1.0),
            ..ControllerFrame::default()
        };

        for channel in OutputChannel::ALL {
            if let Some(button) = channel.button()
                && self.button_pressed(value(channel), bias.get(channel))
            {
                frame.buttons.insert(button);
            }
        }

        if frame.pressed(Buttons::DASH) {
            frame.aim = Some(Vec2::new(frame.move_x, frame.move_y));
        }

        DecodedAction {
            frame,
            long_jump: self.button_pressed(
                value(OutputChannel::LongJump),
                bias.get(OutputChannel::LongJump),
            ),
        }
    }

    /// Threshold the outputs, then apply the long-jump hold.
    ///
    /// # Panics
    /// If `outputs` does not hold exactly [`OutputChannel::COUNT`] values.
    pub fn decode(
        &self,
        outputs: &[f32],
        bias: &ChannelBias,
        timer: &mut LongJumpTimer,
    ) -> ControllerFrame {
        let DecodedAction {
            mut frame,
            long_jump,
        } = self.decode_channels(outputs, bias);
        timer.apply(&mut frame, long_jump);
        frame
    }
}
