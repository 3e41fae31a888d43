//! Core data types for robot state and motor actuation.
//!
//! Key types for driver implementers:
//! - [`MotorId`]: Physical channel selector (1-based, 0 reserved)
//! - [`Polarity`]: Spin direction of a single channel
//! - [`ChannelState`]: What a channel is currently doing

use crate::protocol::wire_enum::wire_enum;

wire_enum! {
    /// Robot lifecycle state reported in every heartbeat
    pub enum RobotState {
        /// Waiting for work
        Idle = (0, "idle"),
        /// Executing a motion command
        Busy = (1, "busy"),
        /// Actuator fault latched, cleared by Reset
        Error = (2, "error"),
    }
}

impl Default for RobotState {
    fn default() -> Self {
        RobotState::Idle
    }
}

wire_enum! {
    /// Motor channel identity.
    ///
    /// On the wire `0` is reserved and `-1` terminates a motor list; neither
    /// is representable here.
    pub enum MotorId {
        /// Left drive motor (unified channel A)
        Motor1 = (1, "mot1"),
        /// Right drive motor (unified channel B)
        Motor2 = (2, "mot2"),
        Motor3 = (3, "mot3"),
        Motor4 = (4, "mot4"),
        Motor5 = (5, "mot5"),
        Motor6 = (6, "mot6"),
    }
}

impl MotorId {
    /// Unified-vehicle channel A
    pub const LEFT: MotorId = MotorId::Motor1;
    /// Unified-vehicle channel B
    pub const RIGHT: MotorId = MotorId::Motor2;

    /// Zero-based index into per-channel tables
    #[inline]
    pub fn index(self) -> usize {
        (self.code() - 1) as usize
    }

    /// Channel number as used in logs and actuator errors
    #[inline]
    pub fn channel(self) -> u8 {
        self.code() as u8
    }
}

wire_enum! {
    /// Logical motion direction of a MotorControl command
    pub enum Direction {
        Forward = (0, "forward"),
        Backward = (1, "backward"),
        Left = (2, "left"),
        Right = (3, "right"),
        /// Plain stop, not the emergency path
        Stop = (4, "stop"),
    }
}

/// Spin direction of one H-bridge channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// IN1 driven, IN2 low
    Forward,
    /// IN1 low, IN2 driven
    Reverse,
}

/// Observable state of a single actuation channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Both bridge inputs low, duty zero
    #[default]
    Disabled,
    /// Driven with the given polarity and raw duty value
    Driven { polarity: Polarity, duty: u16 },
}

impl ChannelState {
    /// True when the channel is producing torque
    pub fn is_driven(&self) -> bool {
        matches!(self, ChannelState::Driven { duty, .. } if *duty > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motor_index_matches_code() {
        for (i, id) in MotorId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
        }
        assert_eq!(MotorId::from_code(0), None);
        assert_eq!(MotorId::from_code(-1), None);
    }

    #[test]
    fn test_zero_duty_is_not_driven() {
        let idle = ChannelState::Driven {
            polarity: Polarity::Forward,
            duty: 0,
        };
        assert!(!idle.is_driven());
        assert!(!ChannelState::Disabled.is_driven());
    }
}
