//! Driver for hosts without motor hardware
//!
//! Logs every pin change and keeps the channel table, so the daemon can run
//! against a real base station on a development machine.

use crate::core::driver::ActuatorDriver;
use crate::core::types::{ChannelState, MotorId, Polarity};
use crate::error::Result;
use crate::protocol::messages::MAX_MOTORS;

#[derive(Debug, Default)]
pub struct LoggingDriver {
    channels: [ChannelState; MAX_MOTORS],
}

impl LoggingDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActuatorDriver for LoggingDriver {
    fn drive(&mut self, channel: MotorId, polarity: Polarity, duty: u16) -> Result<()> {
        let next = ChannelState::Driven { polarity, duty };
        if self.channels[channel.index()] != next {
            log::info!("Motor {}: {:?} duty={}", channel, polarity, duty);
        }
        self.channels[channel.index()] = next;
        Ok(())
    }

    fn disable(&mut self, channel: MotorId) -> Result<()> {
        if self.channels[channel.index()] != ChannelState::Disabled {
            log::info!("Motor {}: disabled", channel);
        }
        self.channels[channel.index()] = ChannelState::Disabled;
        Ok(())
    }
}
