//! Envelope and payload types for the robot-net datagram protocol.
//!
//! One [`Envelope`] per datagram in either direction. Inbound envelopes carry
//! command payloads, outbound ones carry heartbeat, feedback, event or error
//! payloads. The message kind is never stored separately; it follows from the
//! payload variant so the two can not disagree.

use crate::core::types::{Direction, MotorId, RobotState};
use crate::protocol::wire_enum::wire_enum;
use crate::store::{ConfigField, ConfigValue};
use serde::{Deserialize, Serialize};

/// Protocol tag expected in every datagram unless configured otherwise
pub const DEFAULT_PROTOCOL_TAG: &str = "robot-net/1.0";

/// Most motors a single command may select
pub const MAX_MOTORS: usize = 6;

/// Error codes carried in failure feedback and error messages
pub mod error_codes {
    /// Command token inside a command envelope is not one we handle
    pub const UNKNOWN_COMMAND: i32 = 100;
    /// Configuration store refused the value
    pub const CONFIG_REJECTED: i32 = 101;
    /// Motion refused while the emergency stop latch is set
    pub const EMERGENCY_STOP_ACTIVE: i32 = 102;
    /// Actuator driver reported a failure
    pub const ACTUATOR_FAULT: i32 = 103;
}

wire_enum! {
    /// Top-level `message_type`
    pub enum MessageKind {
        Command = (0, "command"),
        Feedback = (1, "feedback"),
        Event = (2, "event"),
        Error = (3, "error"),
        Heartbeat = (4, "heartbeat"),
    }
}

wire_enum! {
    /// Envelope `mode` indicator
    pub enum Mode {
        Manual = (0, "manual"),
        Auto = (1, "auto"),
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Manual
    }
}

wire_enum! {
    /// Command discriminator inside a command payload
    pub enum CommandKind {
        GetConfig = (0, "get_config"),
        SetConfig = (1, "set_config"),
        MotorControl = (2, "motor_control"),
        Move = (3, "move"),
        EmergencyStop = (4, "emergency_stop"),
        Reset = (5, "reset"),
    }
}

wire_enum! {
    /// Named destinations for `move`
    pub enum Checkpoint {
        Home = (0, "home"),
        Load = (1, "load"),
        Base = (2, "base"),
    }
}

wire_enum! {
    pub enum NavigationType {
        Manual = (0, "manual"),
        Checkpoint = (1, "checkpoint"),
        Grid = (2, "grid"),
        FreeMove = (3, "free_move"),
    }
}

wire_enum! {
    pub enum RoutePolicy {
        Shortest = (0, "shortest"),
        Safest = (1, "safest"),
        Fast = (2, "fast"),
    }
}

wire_enum! {
    /// Outcome reported in a feedback payload
    pub enum FeedbackStatus {
        Success = (0, "success"),
        Failure = (1, "failure"),
        Pending = (2, "pending"),
    }
}

wire_enum! {
    pub enum Severity {
        Low = (0, "low"),
        Mid = (1, "mid"),
        High = (2, "high"),
    }
}

wire_enum! {
    /// Unsolicited events reported to the base station
    pub enum EventKind {
        ObstacleDetected = (10, "obstacle_detected"),
        ObstacleRemoved = (11, "obstacle_removed"),
        PoiReached = (12, "poi_reached"),
        LoadCollected = (13, "load_collected"),
        LoadDisposed = (14, "load_disposed"),
        RerouteRequired = (15, "reroute_required"),
        MissingLoad = (16, "missing_load"),
    }
}

impl EventKind {
    /// Event kinds that also appear as boolean flags in every event payload
    pub const FLAGS: [EventKind; 5] = [
        EventKind::ObstacleDetected,
        EventKind::PoiReached,
        EventKind::LoadCollected,
        EventKind::LoadDisposed,
        EventKind::RerouteRequired,
    ];
}

/// Envelope timestamp as received, or whole seconds since boot when sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Seconds(u64),
    Text(String),
}

/// Bounded, ordered motor selection.
///
/// Empty means unified-vehicle steering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorSelection {
    ids: [MotorId; MAX_MOTORS],
    len: usize,
}

impl Default for MotorSelection {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl MotorSelection {
    /// No motors selected
    pub const EMPTY: MotorSelection = MotorSelection {
        ids: [MotorId::Motor1; MAX_MOTORS],
        len: 0,
    };

    /// Build from a slice, `None` if it holds more than [`MAX_MOTORS`]
    pub fn from_slice(ids: &[MotorId]) -> Option<Self> {
        let mut selection = Self::EMPTY;
        for &id in ids {
            if !selection.push(id) {
                return None;
            }
        }
        Some(selection)
    }

    /// Append a motor; false when full
    pub fn push(&mut self, id: MotorId) -> bool {
        if self.len == MAX_MOTORS {
            return false;
        }
        self.ids[self.len] = id;
        self.len += 1;
        true
    }

    pub fn as_slice(&self) -> &[MotorId] {
        &self.ids[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = MotorId> + '_ {
        self.as_slice().iter().copied()
    }
}

/// `move` command body
#[derive(Debug, Clone, PartialEq)]
pub struct MovePayload {
    pub destination_x: i32,
    pub destination_y: i32,
    pub checkpoint: Checkpoint,
    pub navigation_type: NavigationType,
    pub route_policy: RoutePolicy,
}

/// `motor_control` command body
#[derive(Debug, Clone, PartialEq)]
pub struct MotorControlPayload {
    pub motor_ids: MotorSelection,
    pub direction: Direction,
    /// 0-100
    pub speed: u8,
    /// -360..=360
    pub angle: i16,
    /// 0 runs until superseded
    pub duration_ms: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetConfigPayload {
    pub property: ConfigField,
    pub new_value: ConfigValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetConfigPayload {
    pub property: ConfigField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPayload {
    pub state: RobotState,
    pub rssi: i32,
}

/// Reply to a command, correlated by request id
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackPayload {
    pub status: FeedbackStatus,
    pub error_code: Option<i32>,
    pub error_message: Option<String>,
    /// Handler-supplied fields copied into the payload object
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FeedbackPayload {
    pub fn success() -> Self {
        Self::with_status(FeedbackStatus::Success)
    }

    pub fn pending() -> Self {
        Self::with_status(FeedbackStatus::Pending)
    }

    pub fn failure(error_code: i32, error_message: impl Into<String>) -> Self {
        Self {
            error_code: Some(error_code),
            error_message: Some(error_message.into()),
            ..Self::with_status(FeedbackStatus::Failure)
        }
    }

    fn with_status(status: FeedbackStatus) -> Self {
        Self {
            status,
            error_code: None,
            error_message: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Attach an extra payload field
    pub fn with_extra(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventPayload {
    pub event: EventKind,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub severity: Severity,
    pub error_code: i32,
    pub error_message: String,
}

/// Kind-specific message body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Move(MovePayload),
    MotorControl(MotorControlPayload),
    SetConfig(SetConfigPayload),
    GetConfig(GetConfigPayload),
    EmergencyStop,
    Reset,
    /// Command envelope whose discriminator we do not handle
    Unknown(String),
    Heartbeat(HeartbeatPayload),
    Feedback(FeedbackPayload),
    Event(EventPayload),
    Error(ErrorPayload),
}

impl Payload {
    /// Message kind implied by this payload
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Move(_)
            | Payload::MotorControl(_)
            | Payload::SetConfig(_)
            | Payload::GetConfig(_)
            | Payload::EmergencyStop
            | Payload::Reset
            | Payload::Unknown(_) => MessageKind::Command,
            Payload::Heartbeat(_) => MessageKind::Heartbeat,
            Payload::Feedback(_) => MessageKind::Feedback,
            Payload::Event(_) => MessageKind::Event,
            Payload::Error(_) => MessageKind::Error,
        }
    }

    /// Command discriminator, `None` for non-commands and unknown tokens
    pub fn command(&self) -> Option<CommandKind> {
        match self {
            Payload::Move(_) => Some(CommandKind::Move),
            Payload::MotorControl(_) => Some(CommandKind::MotorControl),
            Payload::SetConfig(_) => Some(CommandKind::SetConfig),
            Payload::GetConfig(_) => Some(CommandKind::GetConfig),
            Payload::EmergencyStop => Some(CommandKind::EmergencyStop),
            Payload::Reset => Some(CommandKind::Reset),
            _ => None,
        }
    }
}

/// One protocol message
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub protocol: String,
    pub robot_id: Option<u16>,
    /// 0 means no correlation
    pub request_id: u16,
    pub mode: Mode,
    pub timestamp: Option<Timestamp>,
    pub payload: Payload,
}

impl Envelope {
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}
