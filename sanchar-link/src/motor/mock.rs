//! Recording actuator driver for testing

use crate::core::driver::ActuatorDriver;
use crate::core::types::{ChannelState, MotorId, Polarity};
use crate::error::{Error, Result};
use crate::protocol::messages::MAX_MOTORS;
use parking_lot::Mutex;
use std::sync::Arc;

/// One call made against the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCall {
    Drive {
        channel: MotorId,
        polarity: Polarity,
        duty: u16,
    },
    Disable {
        channel: MotorId,
    },
}

/// Actuator driver that records every call.
///
/// Clones share state, so a test keeps one clone for inspection and hands
/// the other to the executor.
#[derive(Clone, Default)]
pub struct RecordingDriver {
    state: Arc<Mutex<RecordingState>>,
}

#[derive(Debug, Default)]
struct RecordingState {
    channels: [ChannelState; MAX_MOTORS],
    calls: Vec<DriverCall>,
    fail_on: Option<MotorId>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last applied state of a channel
    pub fn state(&self, channel: MotorId) -> ChannelState {
        self.state.lock().channels[channel.index()]
    }

    /// Calls in order
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Make `drive` fail for one channel (`None` to heal)
    pub fn fail_on(&self, channel: Option<MotorId>) {
        self.state.lock().fail_on = channel;
    }
}

impl ActuatorDriver for RecordingDriver {
    fn drive(&mut self, channel: MotorId, polarity: Polarity, duty: u16) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_on == Some(channel) {
            return Err(Error::Actuator {
                channel: channel.channel(),
                reason: "injected fault".into(),
            });
        }
        state.calls.push(DriverCall::Drive {
            channel,
            polarity,
            duty,
        });
        state.channels[channel.index()] = ChannelState::Driven { polarity, duty };
        Ok(())
    }

    fn disable(&mut self, channel: MotorId) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::Disable { channel });
        state.channels[channel.index()] = ChannelState::Disabled;
        Ok(())
    }
}
