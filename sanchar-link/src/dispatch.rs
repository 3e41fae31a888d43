//! Command dispatcher
//!
//! Owns every piece of mutable firmware state: the dedup window, the
//! configuration store, the motor executor, the robot state and the stop
//! latch. One dispatcher lives on the dispatch thread; producers only ever
//! hand it raw datagrams and timer ticks.
//!
//! # Pipeline
//!
//! ```text
//! bytes ─> decode ─(protocol ok)─> bind backend ─> command? ─> dedup ─> handler ─> feedback
//!             │                                       │          │
//!             └─ drop                                 └─ ignore  └─ drop
//! ```
//!
//! Every fresh command gets exactly one feedback reply carrying its request
//! id. Decode failures, duplicates and non-command kinds get none.

use crate::config::AppConfig;
use crate::core::types::RobotState;
use crate::dedup::DedupFilter;
use crate::error::Result;
use crate::motor::{MotorExecutor, PendingStop, SafeStop, SharedDriver};
use crate::protocol::encode::Encoder;
use crate::protocol::messages::{
    Envelope, FeedbackPayload, MessageKind, Mode, MotorControlPayload, MovePayload,
    NavigationType, Payload, Severity, error_codes,
};
use crate::protocol::Decoder;
use crate::store::ConfigStore;
use crate::streaming::BackendRegistry;
use std::net::SocketAddr;

/// Dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Fresh commands handled
    pub processed: u64,
    pub decode_failures: u64,
    pub duplicates: u64,
    /// Well-formed non-command messages
    pub ignored: u64,
    /// Outbound messages produced by commands and timers
    pub replies: u64,
}

/// Routes decoded commands to the motor executor or the configuration store
pub struct Dispatcher {
    decoder: Decoder,
    encoder: Encoder,
    dedup: DedupFilter,
    store: ConfigStore,
    executor: MotorExecutor,
    state: RobotState,
    estop_latched: bool,
    fault: Option<String>,
    backend: BackendRegistry,
    stats: DispatcherStats,
}

impl Dispatcher {
    pub fn new(config: &AppConfig, driver: SharedDriver, backend: BackendRegistry) -> Self {
        Self {
            decoder: Decoder::new(config.protocol.tag.clone()),
            encoder: Encoder::new(config.protocol.tag.clone(), Some(config.protocol.robot_id)),
            dedup: DedupFilter::new(config.protocol.dedup_capacity),
            store: ConfigStore::new(),
            executor: MotorExecutor::new(driver, config.motors.duty_max),
            state: RobotState::Idle,
            estop_latched: false,
            fault: None,
            backend,
            stats: DispatcherStats::default(),
        }
    }

    pub fn state(&self) -> RobotState {
        self.state
    }

    pub fn stats(&self) -> DispatcherStats {
        self.stats
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn executor(&self) -> &MotorExecutor {
        &self.executor
    }

    pub fn is_estop_latched(&self) -> bool {
        self.estop_latched
    }

    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn backend(&self) -> Option<SocketAddr> {
        *self.backend.lock()
    }

    pub fn safe_stop_handle(&self) -> SafeStop {
        self.executor.safe_stop_handle()
    }

    /// Scheduled stop the run loop should wake for
    pub fn next_motor_stop(&self) -> Option<PendingStop> {
        self.executor.pending_stop()
    }

    /// Mode reported in unsolicited messages
    fn report_mode(&self) -> Mode {
        match self.store.navigation_type() {
            NavigationType::Manual => Mode::Manual,
            _ => Mode::Auto,
        }
    }

    /// Handle one inbound datagram and return the messages to send back
    pub fn handle_datagram(&mut self, bytes: &[u8], from: SocketAddr) -> Vec<Envelope> {
        let envelope = match self.decoder.decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.decode_failures += 1;
                if e.protocol_accepted() {
                    self.bind_backend(from);
                }
                log::debug!("Dropping datagram from {}: {}", from, e);
                return Vec::new();
            }
        };
        self.bind_backend(from);

        if envelope.kind() != MessageKind::Command {
            self.stats.ignored += 1;
            log::debug!("Ignoring inbound {} from {}", envelope.kind(), from);
            return Vec::new();
        }

        if self.dedup.seen_or_record(envelope.request_id) {
            self.stats.duplicates += 1;
            log::debug!("Duplicate request {} from {}", envelope.request_id, from);
            return Vec::new();
        }

        self.stats.processed += 1;
        let out = self.handle_command(&envelope);
        self.stats.replies += out.len() as u64;
        out
    }

    /// Build a heartbeat, or nothing while no backend is bound
    pub fn heartbeat(&self, rssi: i32) -> Option<Envelope> {
        self.backend()?;
        Some(self.encoder.heartbeat(self.state, rssi, self.report_mode()))
    }

    /// Timer path for a scheduled motor stop. Sends nothing on success.
    pub fn expire_motor_stop(&mut self, token: PendingStop) -> Vec<Envelope> {
        match self.executor.fire(token) {
            Ok(true) => {
                if self.state == RobotState::Busy && !self.executor.is_active() {
                    self.state = RobotState::Idle;
                }
                Vec::new()
            }
            Ok(false) => Vec::new(),
            Err(e) => {
                let message = e.to_string();
                self.latch_fault(&message);
                self.stats.replies += 1;
                vec![self.fault_report(0, message)]
            }
        }
    }

    /// Release every channel on the way out
    pub fn shutdown(&mut self) -> Result<()> {
        log::info!("Dispatcher shutting down, releasing motors");
        self.executor.halt()
    }

    fn handle_command(&mut self, envelope: &Envelope) -> Vec<Envelope> {
        let request_id = envelope.request_id;
        log::debug!(
            "Command {:?} (request {})",
            envelope.payload.command(),
            request_id
        );

        let (feedback, fault) = match self.run_command(&envelope.payload) {
            Ok(feedback) => (feedback, None),
            Err(e) => {
                let message = e.to_string();
                self.latch_fault(&message);
                (
                    FeedbackPayload::failure(error_codes::ACTUATOR_FAULT, message.clone()),
                    Some(self.fault_report(request_id, message)),
                )
            }
        };

        let mut out = vec![self.encoder.feedback(request_id, envelope.mode, feedback)];
        out.extend(fault);
        out
    }

    /// Apply a command. `Err` only for actuator failures.
    fn run_command(&mut self, payload: &Payload) -> Result<FeedbackPayload> {
        match payload {
            Payload::EmergencyStop => self.emergency_stop(),
            Payload::Reset => self.reset(),
            Payload::MotorControl(cmd) => self.motor_control(cmd),
            Payload::Move(goal) => Ok(self.move_to(goal)),
            Payload::SetConfig(set) => Ok(match self.store.set(set.property, &set.new_value) {
                Ok(()) => FeedbackPayload::success(),
                Err(e) => {
                    log::warn!("Rejected set_config: {}", e);
                    FeedbackPayload::failure(error_codes::CONFIG_REJECTED, e.to_string())
                }
            }),
            Payload::GetConfig(get) => Ok(FeedbackPayload::success()
                .with_extra("property", get.property.name())
                .with_extra("value", self.store.get(get.property))),
            Payload::Unknown(token) => {
                log::warn!("Unknown command {:?}", token);
                Ok(FeedbackPayload::failure(
                    error_codes::UNKNOWN_COMMAND,
                    format!("unknown command {}", token),
                ))
            }
            Payload::Heartbeat(_)
            | Payload::Feedback(_)
            | Payload::Event(_)
            | Payload::Error(_) => {
                // Filtered by kind before dedup
                Ok(FeedbackPayload::failure(
                    error_codes::UNKNOWN_COMMAND,
                    "not a command",
                ))
            }
        }
    }

    /// Refuse motion while stopped or faulted
    fn motion_blocked(&self) -> Option<FeedbackPayload> {
        if self.estop_latched {
            return Some(FeedbackPayload::failure(
                error_codes::EMERGENCY_STOP_ACTIVE,
                "emergency stop active, reset required",
            ));
        }
        self.fault.as_ref().map(|reason| {
            FeedbackPayload::failure(
                error_codes::ACTUATOR_FAULT,
                format!("actuator fault latched, reset required: {}", reason),
            )
        })
    }

    fn emergency_stop(&mut self) -> Result<FeedbackPayload> {
        log::warn!("EMERGENCY STOP");
        self.estop_latched = true;
        self.executor.halt()?;
        if self.state == RobotState::Busy {
            self.state = RobotState::Idle;
        }
        Ok(FeedbackPayload::success())
    }

    fn reset(&mut self) -> Result<FeedbackPayload> {
        log::info!(
            "Reset (stop latched: {}, fault: {:?})",
            self.estop_latched,
            self.fault
        );
        self.estop_latched = false;
        self.fault = None;
        self.state = RobotState::Idle;
        self.executor.halt()?;
        Ok(FeedbackPayload::success())
    }

    fn motor_control(&mut self, cmd: &MotorControlPayload) -> Result<FeedbackPayload> {
        if let Some(refusal) = self.motion_blocked() {
            return Ok(refusal);
        }
        self.executor.execute(cmd, self.store.speed_limit())?;
        self.state = if self.executor.is_active() {
            RobotState::Busy
        } else {
            RobotState::Idle
        };
        Ok(FeedbackPayload::success())
    }

    /// Navigation is not available; the goal is acknowledged as pending
    fn move_to(&mut self, goal: &MovePayload) -> FeedbackPayload {
        if let Some(refusal) = self.motion_blocked() {
            return refusal;
        }
        log::info!(
            "Move goal: ({}, {}) checkpoint={} navigation={} route={}",
            goal.destination_x,
            goal.destination_y,
            goal.checkpoint,
            goal.navigation_type,
            goal.route_policy
        );
        FeedbackPayload::pending()
    }

    fn bind_backend(&self, from: SocketAddr) {
        let mut backend = self.backend.lock();
        if *backend != Some(from) {
            log::info!("Backend endpoint now {}", from);
            *backend = Some(from);
        }
    }

    fn latch_fault(&mut self, reason: &str) {
        log::error!("Actuator fault: {}", reason);
        self.fault = Some(reason.to_string());
        self.state = RobotState::Error;
    }

    fn fault_report(&self, request_id: u16, message: String) -> Envelope {
        self.encoder.error(
            request_id,
            Severity::High,
            error_codes::ACTUATOR_FAULT,
            message,
            self.report_mode(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ChannelState, MotorId};
    use crate::motor::{RecordingDriver, shared_driver};
    use crate::protocol::messages::{DEFAULT_PROTOCOL_TAG, FeedbackStatus};
    use crate::streaming::backend_registry;
    use serde_json::{Value, json};

    fn dispatcher() -> (Dispatcher, RecordingDriver) {
        let driver = RecordingDriver::new();
        let dispatcher = Dispatcher::new(
            &AppConfig::default(),
            shared_driver(driver.clone()),
            backend_registry(),
        );
        (dispatcher, driver)
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 10], port))
    }

    fn command(request_id: u16, payload: Value) -> Vec<u8> {
        json!({
            "protocol": DEFAULT_PROTOCOL_TAG,
            "message_type": "command",
            "request_id": request_id,
            "mode": "manual",
            "payload": payload,
        })
        .to_string()
        .into_bytes()
    }

    fn feedback(out: &[Envelope]) -> &FeedbackPayload {
        match &out[0].payload {
            Payload::Feedback(fb) => fb,
            other => panic!("expected feedback, got {:?}", other),
        }
    }

    #[test]
    fn test_reply_correlates_request_id() {
        let (mut d, _) = dispatcher();
        let out = d.handle_datagram(&command(11, json!({"command": "reset"})), addr(9000));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].request_id, 11);
        assert_eq!(out[0].robot_id, Some(3));
        assert_eq!(feedback(&out).status, FeedbackStatus::Success);
        assert_eq!(d.backend(), Some(addr(9000)));
    }

    #[test]
    fn test_duplicate_dropped_without_side_effect() {
        let (mut d, driver) = dispatcher();
        let fwd = command(5, json!({"command": 2, "direction": 0, "speed": 50}));
        assert_eq!(d.handle_datagram(&fwd, addr(1)).len(), 1);

        d.handle_datagram(&command(6, json!({"command": 2, "direction": 4, "speed": 0})), addr(1));
        assert!(!driver.state(MotorId::LEFT).is_driven());

        // Replay of request 5 must not restart the motors
        assert!(d.handle_datagram(&fwd, addr(1)).is_empty());
        assert!(!driver.state(MotorId::LEFT).is_driven());
        assert_eq!(d.stats().duplicates, 1);
        assert_eq!(d.stats().processed, 2);
    }

    #[test]
    fn test_protocol_mismatch_no_binding() {
        let (mut d, _) = dispatcher();
        let bytes = json!({
            "protocol": "other/9",
            "message_type": "command",
            "request_id": 1,
            "payload": {"command": "reset"},
        })
        .to_string();
        assert!(d.handle_datagram(bytes.as_bytes(), addr(2)).is_empty());
        assert_eq!(d.backend(), None);
        assert_eq!(d.stats().decode_failures, 1);
        assert!(d.heartbeat(-50).is_none());
    }

    #[test]
    fn test_payload_failure_still_binds_backend() {
        let (mut d, _) = dispatcher();
        let bad = command(1, json!({"command": "motor_control", "speed": 500, "direction": 0}));
        assert!(d.handle_datagram(&bad, addr(3)).is_empty());
        assert_eq!(d.backend(), Some(addr(3)));
        // Rejected before dedup, so the id is still fresh
        let ok = command(1, json!({"command": "reset"}));
        assert_eq!(d.handle_datagram(&ok, addr(3)).len(), 1);
    }

    #[test]
    fn test_most_recent_sender_wins() {
        let (mut d, _) = dispatcher();
        d.handle_datagram(&command(1, json!({"command": "reset"})), addr(1));
        d.handle_datagram(&command(2, json!({"command": "reset"})), addr(2));
        assert_eq!(d.backend(), Some(addr(2)));
    }

    #[test]
    fn test_non_command_kinds_ignored() {
        let (mut d, _) = dispatcher();
        let hb = json!({
            "protocol": DEFAULT_PROTOCOL_TAG,
            "message_type": "heartbeat",
            "request_id": 9,
            "payload": {"state": "idle", "rssi": -40},
        })
        .to_string();
        assert!(d.handle_datagram(hb.as_bytes(), addr(4)).is_empty());
        assert_eq!(d.stats().ignored, 1);
        // Id 9 never entered the window
        let out = d.handle_datagram(&command(9, json!({"command": "reset"})), addr(4));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_motor_control_sets_busy() {
        let (mut d, driver) = dispatcher();
        let msg = command(1, json!({"command": 2, "direction": "forward", "speed": 80}));
        d.handle_datagram(&msg, addr(1));
        assert_eq!(d.state(), RobotState::Busy);
        assert!(driver.state(MotorId::RIGHT).is_driven());

        let msg = command(2, json!({"command": 2, "direction": "stop", "speed": 80}));
        d.handle_datagram(&msg, addr(1));
        assert_eq!(d.state(), RobotState::Idle);
        assert_eq!(driver.state(MotorId::RIGHT), ChannelState::Disabled);
    }

    #[test]
    fn test_emergency_stop_latches_until_reset() {
        let (mut d, driver) = dispatcher();
        d.handle_datagram(
            &command(1, json!({"command": 2, "direction": 0, "speed": 70, "duration_ms": 60000})),
            addr(1),
        );
        assert!(d.next_motor_stop().is_some());

        let out = d.handle_datagram(&command(2, json!({"command": 4, "stop": "stop"})), addr(1));
        assert_eq!(feedback(&out).status, FeedbackStatus::Success);
        assert_eq!(driver.state(MotorId::LEFT), ChannelState::Disabled);
        assert_eq!(driver.state(MotorId::RIGHT), ChannelState::Disabled);
        assert!(d.next_motor_stop().is_none());
        assert!(d.is_estop_latched());

        let msg = command(3, json!({"command": 2, "direction": 0, "speed": 70}));
        let out = d.handle_datagram(&msg, addr(1));
        assert_eq!(feedback(&out).error_code, Some(error_codes::EMERGENCY_STOP_ACTIVE));
        assert!(!driver.state(MotorId::LEFT).is_driven());

        d.handle_datagram(&command(4, json!({"command": 5, "reset": "reset"})), addr(1));
        assert!(!d.is_estop_latched());
        let msg = command(5, json!({"command": 2, "direction": 0, "speed": 70}));
        let out = d.handle_datagram(&msg, addr(1));
        assert_eq!(feedback(&out).status, FeedbackStatus::Success);
        assert!(driver.state(MotorId::LEFT).is_driven());
    }

    #[test]
    fn test_config_round_trip_and_rejection() {
        let (mut d, _) = dispatcher();
        let msg = command(1, json!({"command": 1, "prop": 0, "new_value": 77}));
        let out = d.handle_datagram(&msg, addr(1));
        assert_eq!(feedback(&out).status, FeedbackStatus::Success);

        let out = d.handle_datagram(&command(2, json!({"command": 0, "prop": 0})), addr(1));
        let fb = feedback(&out);
        assert_eq!(fb.extra["property"], "speed");
        assert_eq!(fb.extra["value"], 77);

        let out = d.handle_datagram(
            &command(3, json!({"command": "set_config", "property": "speed", "new_value": true})),
            addr(1),
        );
        assert_eq!(feedback(&out).error_code, Some(error_codes::CONFIG_REJECTED));
        assert_eq!(d.store().speed_limit(), 77);
    }

    #[test]
    fn test_unknown_command_fails() {
        let (mut d, driver) = dispatcher();
        let out = d.handle_datagram(&command(1, json!({"command": "moonwalk"})), addr(1));
        assert_eq!(feedback(&out).status, FeedbackStatus::Failure);
        assert_eq!(feedback(&out).error_code, Some(error_codes::UNKNOWN_COMMAND));
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_move_is_pending() {
        let (mut d, _) = dispatcher();
        let out = d.handle_datagram(
            &command(1, json!({
                "command": "move",
                "destination_x": 1,
                "destination_y": 2,
                "checkpoint": "base",
                "navigation_type": "checkpoint",
                "route_policy": "fast",
            })),
            addr(1),
        );
        assert_eq!(feedback(&out).status, FeedbackStatus::Pending);
        assert_eq!(d.state(), RobotState::Idle);
    }

    #[test]
    fn test_actuator_fault_reported() {
        let (mut d, driver) = dispatcher();
        driver.fail_on(Some(MotorId::LEFT));
        let msg = command(1, json!({"command": 2, "direction": 0, "speed": 40}));
        let out = d.handle_datagram(&msg, addr(1));
        assert_eq!(out.len(), 2);
        assert_eq!(feedback(&out).error_code, Some(error_codes::ACTUATOR_FAULT));
        assert_eq!(out[1].kind(), MessageKind::Error);
        assert_eq!(d.state(), RobotState::Error);
        let expected = Payload::Heartbeat(crate::protocol::messages::HeartbeatPayload {
            state: RobotState::Error,
            rssi: -50,
        });
        assert_eq!(d.heartbeat(-50).map(|hb| hb.payload), Some(expected));

        driver.fail_on(None);
        let msg = command(2, json!({"command": 2, "direction": 0, "speed": 40}));
        let out = d.handle_datagram(&msg, addr(1));
        assert_eq!(feedback(&out).error_code, Some(error_codes::ACTUATOR_FAULT));

        d.handle_datagram(&command(3, json!({"command": "reset"})), addr(1));
        assert_eq!(d.state(), RobotState::Idle);
        assert!(d.fault().is_none());
    }

    #[test]
    fn test_timed_stop_returns_to_idle() {
        let (mut d, driver) = dispatcher();
        d.handle_datagram(
            &command(1, json!({"command": 2, "direction": 1, "speed": 60, "duration_ms": 250})),
            addr(1),
        );
        let token = d.next_motor_stop().unwrap();
        assert!(d.expire_motor_stop(token).is_empty());
        assert_eq!(d.state(), RobotState::Idle);
        assert_eq!(driver.state(MotorId::LEFT), ChannelState::Disabled);
    }

    #[test]
    fn test_timed_stop_spares_open_ended_channels() {
        let (mut d, driver) = dispatcher();
        let open_ended = json!({"command": 2, "motor_id": [3, -1], "direction": 0, "speed": 50});
        d.handle_datagram(&command(1, open_ended), addr(1));
        assert!(driver.state(MotorId::Motor3).is_driven());

        let timed = json!({"command": 2, "direction": 0, "speed": 60, "duration_ms": 500});
        d.handle_datagram(&command(2, timed), addr(1));
        let token = d.next_motor_stop().unwrap();

        assert!(d.expire_motor_stop(token).is_empty());
        assert_eq!(driver.state(MotorId::LEFT), ChannelState::Disabled);
        assert_eq!(driver.state(MotorId::RIGHT), ChannelState::Disabled);
        assert!(driver.state(MotorId::Motor3).is_driven());
        assert_eq!(d.state(), RobotState::Busy);
    }

    #[test]
    fn test_heartbeat_mode_follows_navigation() {
        let (mut d, _) = dispatcher();
        d.handle_datagram(&command(1, json!({"command": "reset"})), addr(1));
        assert_eq!(d.heartbeat(-40).unwrap().mode, Mode::Manual);

        d.handle_datagram(
            &command(2, json!({"command": 1, "prop": "navigation_type", "new_value": "grid"})),
            addr(1),
        );
        assert_eq!(d.heartbeat(-40).unwrap().mode, Mode::Auto);
    }
}
