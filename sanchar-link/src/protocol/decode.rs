//! Inbound datagram decoder
//!
//! Validation order: JSON object, protocol tag, message kind, envelope
//! fields, then the kind-specific payload. Payload parsing is strict: a
//! missing required key or an unexpected key rejects the whole datagram.
//! Envelope-level extra keys are tolerated.

use crate::core::types::{Direction, MotorId, RobotState};
use crate::error::DecodeError;
use crate::protocol::messages::{
    Checkpoint, CommandKind, Envelope, ErrorPayload, EventKind, EventPayload, FeedbackPayload,
    FeedbackStatus, GetConfigPayload, HeartbeatPayload, MAX_MOTORS, MessageKind, Mode,
    MotorControlPayload, MotorSelection, MovePayload, NavigationType, Payload, RoutePolicy,
    SetConfigPayload, Severity, Timestamp,
};
use crate::store::{ConfigField, ConfigValue};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Motor list terminator used by the base station
const END_OF_MOTORS: i64 = -1;

/// Accepted `angle` range in degrees
const ANGLE_RANGE: std::ops::RangeInclusive<i64> = -360..=360;

/// Pure datagram decoder bound to one protocol tag
#[derive(Debug, Clone)]
pub struct Decoder {
    protocol_tag: String,
}

impl Decoder {
    pub fn new(protocol_tag: impl Into<String>) -> Self {
        Self {
            protocol_tag: protocol_tag.into(),
        }
    }

    /// Decode one datagram. Never returns a partially populated envelope.
    pub fn decode(&self, bytes: &[u8]) -> DecodeResult<Envelope> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let Value::Object(mut root) = value else {
            return Err(DecodeError::Malformed("top level is not an object".into()));
        };

        match root.remove("protocol") {
            None | Some(Value::Null) => return Err(DecodeError::MissingProtocol),
            Some(Value::String(tag)) if tag == self.protocol_tag => {}
            Some(other) => {
                return Err(DecodeError::ProtocolMismatch {
                    expected: self.protocol_tag.clone(),
                    actual: match other {
                        Value::String(s) => s,
                        v => v.to_string(),
                    },
                });
            }
        }

        let (kind, legacy_command) = message_kind(root.remove("message_type"))?;
        let robot_id = optional_u16(root.remove("robot_id"), "robot_id")?;
        let request_id = request_id(root.remove("request_id"))?;
        let mode = match non_null(root.remove("mode")) {
            Some(v) => parse::<Mode>(v, "mode")?,
            None => Mode::Manual,
        };
        let timestamp = timestamp(root.remove("timestamp"))?;

        let payload = match non_null(root.remove("payload")) {
            Some(Value::Object(map)) => Some(map),
            Some(_) => return Err(DecodeError::invalid("payload", "expected an object")),
            None => None,
        };

        if !root.is_empty() {
            log::trace!(
                "Decoder: ignoring envelope keys {:?}",
                root.keys().collect::<Vec<_>>()
            );
        }

        let required = |payload: Option<_>| payload.ok_or(DecodeError::MissingPayload);
        let payload = match kind {
            MessageKind::Command => decode_command(payload, legacy_command)?,
            MessageKind::Heartbeat => decode_heartbeat(required(payload)?)?,
            MessageKind::Feedback => decode_feedback(required(payload)?)?,
            MessageKind::Event => decode_event(required(payload)?)?,
            MessageKind::Error => decode_error(required(payload)?)?,
        };

        Ok(Envelope {
            protocol: self.protocol_tag.clone(),
            robot_id,
            request_id,
            mode,
            timestamp,
            payload,
        })
    }
}

/// Payload keys still to be consumed
struct Fields {
    map: Map<String, Value>,
}

impl Fields {
    fn new(map: Map<String, Value>) -> Self {
        Self { map }
    }

    /// Remove `key` or the first alias present. Null counts as absent.
    fn take(&mut self, key: &str, aliases: &[&str]) -> Option<Value> {
        let found = std::iter::once(key)
            .chain(aliases.iter().copied())
            .find_map(|k| self.map.remove(k));
        for alias in aliases {
            self.map.remove(*alias);
        }
        non_null(found)
    }

    fn required<T: DeserializeOwned>(
        &mut self,
        key: &'static str,
        aliases: &[&str],
    ) -> DecodeResult<T> {
        let value = self.take(key, aliases).ok_or(DecodeError::MissingField(key))?;
        parse(value, key)
    }

    fn optional<T: DeserializeOwned>(
        &mut self,
        key: &'static str,
        aliases: &[&str],
    ) -> DecodeResult<Option<T>> {
        self.take(key, aliases).map(|v| parse(v, key)).transpose()
    }

    /// Reject leftovers
    fn finish(self) -> DecodeResult<()> {
        match self.map.into_iter().next() {
            Some((key, _)) => Err(DecodeError::UnknownField(key)),
            None => Ok(()),
        }
    }

    /// Remaining keys, for payloads that carry free-form extras
    fn into_rest(self) -> Map<String, Value> {
        self.map
    }
}

fn non_null(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}

fn parse<T: DeserializeOwned>(value: Value, field: &'static str) -> DecodeResult<T> {
    serde_json::from_value(value).map_err(|e| DecodeError::invalid(field, e.to_string()))
}

fn ranged(
    value: i64,
    range: std::ops::RangeInclusive<i64>,
    field: &'static str,
) -> DecodeResult<i64> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(DecodeError::invalid(
            field,
            format!("{} outside {}..={}", value, range.start(), range.end()),
        ))
    }
}

/// Returns the kind plus the command implied by legacy top-level tokens
fn message_kind(value: Option<Value>) -> DecodeResult<(MessageKind, Option<CommandKind>)> {
    let Some(value) = non_null(value) else {
        return Err(DecodeError::UnknownMessageKind("<absent>".into()));
    };
    if let Value::String(s) = &value {
        match s.trim().to_ascii_lowercase().as_str() {
            "emergency_stop" => return Ok((MessageKind::Command, Some(CommandKind::EmergencyStop))),
            "reset" => return Ok((MessageKind::Command, Some(CommandKind::Reset))),
            _ => {}
        }
    }
    let rendered = value.to_string();
    serde_json::from_value::<MessageKind>(value)
        .map(|kind| (kind, None))
        .map_err(|_| DecodeError::UnknownMessageKind(rendered))
}

fn optional_u16(value: Option<Value>, field: &'static str) -> DecodeResult<Option<u16>> {
    non_null(value).map(|v| parse::<u16>(v, field)).transpose()
}

/// Integer, hex string, or absent (0)
fn request_id(value: Option<Value>) -> DecodeResult<u16> {
    match non_null(value) {
        None => Ok(0),
        Some(Value::String(s)) => u16::from_str_radix(s.trim(), 16)
            .map_err(|e| DecodeError::invalid("request_id", format!("{:?}: {}", s, e))),
        Some(v) => parse::<u16>(v, "request_id"),
    }
}

fn timestamp(value: Option<Value>) -> DecodeResult<Option<Timestamp>> {
    match non_null(value) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(Timestamp::Text(s))),
        Some(v) => parse::<u64>(v, "timestamp").map(|s| Some(Timestamp::Seconds(s))),
    }
}

/// Known command, or the raw token for an unknown one
fn command_kind(value: Value) -> DecodeResult<Result<CommandKind, String>> {
    match value {
        Value::String(s) => {
            let kind = match s.trim().to_ascii_lowercase().as_str() {
                "get_property" => Some(CommandKind::GetConfig),
                "set_property" => Some(CommandKind::SetConfig),
                other => CommandKind::from_name(other),
            };
            Ok(kind.ok_or(s))
        }
        Value::Number(n) => Ok(n
            .as_i64()
            .and_then(CommandKind::from_code)
            .ok_or_else(|| n.to_string())),
        _ => Err(DecodeError::invalid("command", "expected a name or integer code")),
    }
}

fn decode_command(
    payload: Option<Map<String, Value>>,
    legacy: Option<CommandKind>,
) -> DecodeResult<Payload> {
    let mut fields = match (payload, legacy) {
        (Some(map), _) => Fields::new(map),
        (None, Some(_)) => Fields::new(Map::new()),
        (None, None) => return Err(DecodeError::MissingPayload),
    };

    let command = match (fields.take("command", &[]), legacy) {
        (Some(token), None) => command_kind(token)?,
        (None, Some(kind)) => Ok(kind),
        (Some(token), Some(kind)) => match command_kind(token)? {
            Ok(inner) if inner == kind => Ok(kind),
            _ => return Err(DecodeError::invalid("command", "contradicts message_type")),
        },
        (None, None) => return Err(DecodeError::MissingField("command")),
    };

    let command = match command {
        Ok(kind) => kind,
        // Unknown tokens are answered by the dispatcher, remaining keys are meaningless
        Err(token) => return Ok(Payload::Unknown(token)),
    };

    let payload = match command {
        CommandKind::Move => Payload::Move(MovePayload {
            destination_x: fields.required("destination_x", &[])?,
            destination_y: fields.required("destination_y", &[])?,
            checkpoint: fields.required::<Checkpoint>("checkpoint", &["destination_checkpoint"])?,
            navigation_type: fields.required::<NavigationType>("navigation_type", &[])?,
            route_policy: fields.required::<RoutePolicy>("route_policy", &[])?,
        }),
        CommandKind::MotorControl => {
            let motor_ids = match fields.take("motor_ids", &["motor_id"]) {
                Some(list) => motor_selection(list)?,
                None => MotorSelection::EMPTY,
            };
            let direction = fields.required::<Direction>("direction", &[])?;
            let speed = ranged(fields.required::<i64>("speed", &[])?, 0..=100, "speed")?;
            let angle = ranged(
                fields.optional::<i64>("angle", &[])?.unwrap_or(0),
                ANGLE_RANGE,
                "angle",
            )?;
            let duration_ms = fields
                .optional::<u32>("duration_ms", &["duration"])?
                .unwrap_or(0);
            Payload::MotorControl(MotorControlPayload {
                motor_ids,
                direction,
                speed: speed as u8,
                angle: angle as i16,
                duration_ms,
            })
        }
        CommandKind::SetConfig => Payload::SetConfig(SetConfigPayload {
            property: fields.required::<ConfigField>("property", &["prop"])?,
            new_value: fields.required::<ConfigValue>("new_value", &["value"])?,
        }),
        CommandKind::GetConfig => Payload::GetConfig(GetConfigPayload {
            property: fields.required::<ConfigField>("property", &["prop"])?,
        }),
        CommandKind::EmergencyStop => {
            literal_token(&mut fields, "stop", &["emergency_stop"], &["stop", "emergency_stop"])?;
            Payload::EmergencyStop
        }
        CommandKind::Reset => {
            literal_token(&mut fields, "reset", &[], &["reset"])?;
            Payload::Reset
        }
    };

    fields.finish()?;
    Ok(payload)
}

/// Optional keyword field that must match one of `accepted`
fn literal_token(
    fields: &mut Fields,
    key: &'static str,
    aliases: &[&str],
    accepted: &[&str],
) -> DecodeResult<()> {
    match fields.optional::<String>(key, aliases)? {
        Some(token) if !accepted.contains(&token.trim().to_ascii_lowercase().as_str()) => Err(
            DecodeError::invalid(key, format!("unexpected token {:?}", token)),
        ),
        _ => Ok(()),
    }
}

/// Sentinel-terminated list of motor ids into a bounded selection
fn motor_selection(value: Value) -> DecodeResult<MotorSelection> {
    let Value::Array(items) = value else {
        return Err(DecodeError::invalid("motor_ids", "expected a list"));
    };

    let mut selection = MotorSelection::EMPTY;
    for item in items {
        match item.as_i64() {
            Some(END_OF_MOTORS) => break,
            Some(0) => return Err(DecodeError::invalid("motor_ids", "motor id 0 is reserved")),
            _ => {}
        }
        let id = parse::<MotorId>(item, "motor_ids")?;
        if !selection.push(id) {
            return Err(DecodeError::invalid(
                "motor_ids",
                format!("more than {} motors", MAX_MOTORS),
            ));
        }
    }
    Ok(selection)
}

fn decode_heartbeat(map: Map<String, Value>) -> DecodeResult<Payload> {
    let mut fields = Fields::new(map);
    let payload = HeartbeatPayload {
        state: fields.required::<RobotState>("state", &[])?,
        rssi: fields.required("rssi", &[])?,
    };
    fields.finish()?;
    Ok(Payload::Heartbeat(payload))
}

fn decode_feedback(map: Map<String, Value>) -> DecodeResult<Payload> {
    let mut fields = Fields::new(map);
    let status = fields.required::<FeedbackStatus>("status", &[])?;
    let error_code = fields.optional("error_code", &[])?;
    let error_message = fields.optional("error_message", &["error"])?;
    Ok(Payload::Feedback(FeedbackPayload {
        status,
        error_code,
        error_message,
        extra: fields.into_rest(),
    }))
}

fn decode_event(map: Map<String, Value>) -> DecodeResult<Payload> {
    let mut fields = Fields::new(map);
    let event = fields.required::<EventKind>("event", &[])?;
    let details = fields.optional::<String>("details", &[])?.unwrap_or_default();
    for flag in EventKind::FLAGS {
        fields.optional::<bool>(flag.name(), &[])?;
    }
    fields.finish()?;
    Ok(Payload::Event(EventPayload { event, details }))
}

fn decode_error(map: Map<String, Value>) -> DecodeResult<Payload> {
    let mut fields = Fields::new(map);
    let payload = ErrorPayload {
        severity: fields.required::<Severity>("severity", &[])?,
        error_code: fields.required("error_code", &[])?,
        error_message: fields.required("error_message", &["error"])?,
    };
    fields.finish()?;
    Ok(Payload::Error(payload))
}
