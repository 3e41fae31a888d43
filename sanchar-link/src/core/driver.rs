//! ActuatorDriver trait definition

use crate::core::types::{MotorId, Polarity};
use crate::error::Result;

/// Physical actuation backend (PWM + direction pins per channel).
///
/// Implementations must never block: every call happens on the dispatch
/// thread or inside the shutdown handler.
pub trait ActuatorDriver: Send {
    /// Drive a channel with the given polarity and raw duty value
    /// (`0..=duty_max` of the configured PWM range)
    fn drive(&mut self, channel: MotorId, polarity: Polarity, duty: u16) -> Result<()>;

    /// Release a channel: both bridge inputs low, duty zero
    fn disable(&mut self, channel: MotorId) -> Result<()>;

    /// Release every channel.
    ///
    /// Attempts all channels even when one fails and reports the first error.
    fn disable_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for &channel in MotorId::ALL {
            if let Err(e) = self.disable(channel) {
                log::error!("Failed to disable channel {}: {}", channel.channel(), e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
