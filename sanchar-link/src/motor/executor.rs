//! Motor control executor
//!
//! Turns a `motor_control` payload into per-channel actuation and owns the
//! scheduled stop for timed commands. The executor never waits: a timed
//! command only records a [`PendingStop`]; the run loop wakes at its deadline
//! and hands the token back through [`MotorExecutor::fire`].
//!
//! # Unified-vehicle steering (empty motor list)
//!
//! | direction | left (mot1) | right (mot2) |
//! |-----------|-------------|--------------|
//! | forward   | forward     | forward      |
//! | backward  | reverse     | reverse      |
//! | left      | forward     | reverse      |
//! | right     | reverse     | forward      |
//! | stop      | disabled    | disabled     |
//!
//! With an explicit motor list each listed channel spins forward for
//! `angle >= 0` and in reverse otherwise; `direction` is ignored.

use crate::core::driver::ActuatorDriver;
use crate::core::types::{ChannelState, Direction, MotorId, Polarity};
use crate::error::Result;
use crate::protocol::messages::{MAX_MOTORS, MotorControlPayload, MotorSelection};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Actuator driver shared between the executor and [`SafeStop`]
pub type SharedDriver = Arc<Mutex<Box<dyn ActuatorDriver>>>;

/// Wrap a driver for sharing
pub fn shared_driver(driver: impl ActuatorDriver + 'static) -> SharedDriver {
    Arc::new(Mutex::new(Box::new(driver)))
}

/// Cloneable handle to the unconditional stop path.
///
/// Usable from any thread, including while a command is being applied.
#[derive(Clone)]
pub struct SafeStop {
    driver: SharedDriver,
}

impl SafeStop {
    /// Disable every channel
    pub fn engage(&self) -> Result<()> {
        self.driver.lock().disable_all()
    }
}

/// Scheduled automatic stop of a timed command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingStop {
    pub deadline: Instant,
    pub generation: u64,
    /// Channels the timed command drove; only these are released
    pub channels: MotorSelection,
}

/// Maps motion commands onto the actuator driver
pub struct MotorExecutor {
    driver: SharedDriver,
    duty_max: u16,
    channels: [ChannelState; MAX_MOTORS],
    pending: Option<PendingStop>,
    generation: u64,
}

impl MotorExecutor {
    /// `duty_max` is the driver's full-scale duty value
    pub fn new(driver: SharedDriver, duty_max: u16) -> Self {
        Self {
            driver,
            duty_max,
            channels: [ChannelState::Disabled; MAX_MOTORS],
            pending: None,
            generation: 0,
        }
    }

    /// Handle for out-of-band stops
    pub fn safe_stop_handle(&self) -> SafeStop {
        SafeStop {
            driver: Arc::clone(&self.driver),
        }
    }

    /// Raw duty for a 0-100 speed
    pub fn scale_duty(&self, speed: u8) -> u16 {
        let speed = u32::from(speed.min(100));
        (speed * u32::from(self.duty_max) / 100) as u16
    }

    pub fn channel_state(&self, id: MotorId) -> ChannelState {
        self.channels[id.index()]
    }

    /// True while any channel is producing torque
    pub fn is_active(&self) -> bool {
        self.channels.iter().any(ChannelState::is_driven)
    }

    pub fn pending_stop(&self) -> Option<PendingStop> {
        self.pending
    }

    /// Apply a command now
    pub fn execute(&mut self, cmd: &MotorControlPayload, speed_limit: u8) -> Result<()> {
        self.execute_at(cmd, speed_limit, Instant::now())
    }

    /// Apply a command as of `now`.
    ///
    /// Supersedes any pending stop. The commanded speed is clamped to
    /// `speed_limit`. On a driver error every channel is released before the
    /// error is returned.
    pub fn execute_at(
        &mut self,
        cmd: &MotorControlPayload,
        speed_limit: u8,
        now: Instant,
    ) -> Result<()> {
        self.supersede();

        let speed = cmd.speed.min(speed_limit);
        let duty = self.scale_duty(speed);

        let targets = if cmd.motor_ids.is_empty() {
            let mut wheels = MotorSelection::EMPTY;
            wheels.push(MotorId::LEFT);
            wheels.push(MotorId::RIGHT);
            wheels
        } else {
            cmd.motor_ids
        };

        let result = if cmd.motor_ids.is_empty() {
            self.steer(cmd.direction, duty)
        } else {
            let polarity = if cmd.angle >= 0 {
                Polarity::Forward
            } else {
                Polarity::Reverse
            };
            cmd.motor_ids
                .iter()
                .try_for_each(|id| self.set_channel(id, Some(polarity), duty))
        };

        if let Err(e) = result {
            log::error!("Motor command failed, releasing all channels: {}", e);
            let _ = self.halt();
            return Err(e);
        }

        let mut driven = MotorSelection::EMPTY;
        for id in targets.iter().filter(|id| self.channel_state(*id).is_driven()) {
            driven.push(id);
        }

        if cmd.duration_ms > 0 && !driven.is_empty() {
            let stop = PendingStop {
                deadline: now + Duration::from_millis(u64::from(cmd.duration_ms)),
                generation: self.generation,
                channels: driven,
            };
            log::debug!(
                "Motor stop scheduled in {} ms (generation {})",
                cmd.duration_ms,
                stop.generation
            );
            self.pending = Some(stop);
        }
        Ok(())
    }

    /// Run the scheduled stop if `token` is still the current one.
    ///
    /// Releases only the channels the timed command drove; channels left
    /// running by earlier open-ended commands keep going. Returns `Ok(false)`
    /// for a stale token (superseded command).
    pub fn fire(&mut self, token: PendingStop) -> Result<bool> {
        if self.pending != Some(token) {
            log::trace!("Ignoring stale motor stop (generation {})", token.generation);
            return Ok(false);
        }
        log::debug!("Timed motor command expired (generation {})", token.generation);
        self.supersede();

        let result = token
            .channels
            .iter()
            .try_for_each(|id| self.set_channel(id, None, 0));
        if let Err(e) = result {
            log::error!("Timed stop failed, releasing all channels: {}", e);
            let _ = self.halt();
            return Err(e);
        }
        Ok(true)
    }

    /// Cancel any pending stop and release every channel
    pub fn halt(&mut self) -> Result<()> {
        self.supersede();
        self.channels = [ChannelState::Disabled; MAX_MOTORS];
        self.driver.lock().disable_all()
    }

    fn supersede(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.pending = None;
    }

    fn steer(&mut self, direction: Direction, duty: u16) -> Result<()> {
        use Polarity::{Forward, Reverse};

        let (left, right) = match direction {
            Direction::Forward => (Some(Forward), Some(Forward)),
            Direction::Backward => (Some(Reverse), Some(Reverse)),
            Direction::Left => (Some(Forward), Some(Reverse)),
            Direction::Right => (Some(Reverse), Some(Forward)),
            Direction::Stop => (None, None),
        };
        self.set_channel(MotorId::LEFT, left, duty)?;
        self.set_channel(MotorId::RIGHT, right, duty)
    }

    /// `None` polarity or zero duty releases the channel
    fn set_channel(&mut self, id: MotorId, polarity: Option<Polarity>, duty: u16) -> Result<()> {
        let mut driver = self.driver.lock();
        match polarity {
            Some(polarity) if duty > 0 => {
                driver.drive(id, polarity, duty)?;
                self.channels[id.index()] = ChannelState::Driven { polarity, duty };
            }
            _ => {
                driver.disable(id)?;
                self.channels[id.index()] = ChannelState::Disabled;
            }
        }
        log::trace!("Channel {} -> {:?}", id.channel(), self.channels[id.index()]);
        Ok(())
    }
}
