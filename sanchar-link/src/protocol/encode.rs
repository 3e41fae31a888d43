//! Outbound message construction and serialization
//!
//! The [`Encoder`] stamps envelopes with the configured protocol tag, robot
//! id and uptime seconds. It does no I/O; the transport sends the bytes.

use crate::core::types::RobotState;
use crate::error::{Error, Result};
use crate::protocol::messages::{
    Envelope, ErrorPayload, EventKind, EventPayload, FeedbackPayload, HeartbeatPayload, Mode,
    Payload, Severity, Timestamp,
};
use serde_json::{Map, Value, json};
use std::time::Instant;

/// Builds outbound envelopes
#[derive(Debug, Clone)]
pub struct Encoder {
    protocol_tag: String,
    robot_id: Option<u16>,
    started: Instant,
}

impl Encoder {
    pub fn new(protocol_tag: impl Into<String>, robot_id: Option<u16>) -> Self {
        Self {
            protocol_tag: protocol_tag.into(),
            robot_id,
            started: Instant::now(),
        }
    }

    /// Whole seconds since the encoder was created
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    fn envelope(&self, request_id: u16, mode: Mode, payload: Payload) -> Envelope {
        Envelope {
            protocol: self.protocol_tag.clone(),
            robot_id: self.robot_id,
            request_id,
            mode,
            timestamp: Some(Timestamp::Seconds(self.uptime_secs())),
            payload,
        }
    }

    pub fn heartbeat(&self, state: RobotState, rssi: i32, mode: Mode) -> Envelope {
        self.envelope(0, mode, Payload::Heartbeat(HeartbeatPayload { state, rssi }))
    }

    /// Reply correlated with `request_id`
    pub fn feedback(&self, request_id: u16, mode: Mode, feedback: FeedbackPayload) -> Envelope {
        self.envelope(request_id, mode, Payload::Feedback(feedback))
    }

    pub fn event(&self, event: EventKind, details: impl Into<String>, mode: Mode) -> Envelope {
        self.envelope(
            0,
            mode,
            Payload::Event(EventPayload {
                event,
                details: details.into(),
            }),
        )
    }

    pub fn error(
        &self,
        request_id: u16,
        severity: Severity,
        error_code: i32,
        error_message: impl Into<String>,
        mode: Mode,
    ) -> Envelope {
        self.envelope(
            request_id,
            mode,
            Payload::Error(ErrorPayload {
                severity,
                error_code,
                error_message: error_message.into(),
            }),
        )
    }
}

/// JSON value of an outbound envelope
pub fn to_json(envelope: &Envelope) -> Result<Value> {
    let mut root = Map::new();
    root.insert("protocol".into(), json!(envelope.protocol));
    if let Some(robot_id) = envelope.robot_id {
        root.insert("robot_id".into(), json!(robot_id));
    }
    root.insert("message_type".into(), json!(envelope.kind()));
    root.insert("request_id".into(), json!(envelope.request_id));
    root.insert("mode".into(), json!(envelope.mode));
    if let Some(ts) = &envelope.timestamp {
        root.insert("timestamp".into(), serde_json::to_value(ts)?);
    }
    root.insert("payload".into(), payload_json(&envelope.payload)?);
    Ok(Value::Object(root))
}

/// Datagram bytes of an outbound envelope
pub fn to_bytes(envelope: &Envelope) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&to_json(envelope)?)?)
}

fn payload_json(payload: &Payload) -> Result<Value> {
    let value = match payload {
        Payload::Heartbeat(hb) => json!({
            "state": hb.state,
            "rssi": hb.rssi,
        }),
        Payload::Feedback(fb) => {
            let mut map = fb.extra.clone();
            map.insert("status".into(), json!(fb.status));
            if let Some(code) = fb.error_code {
                map.insert("error_code".into(), json!(code));
            }
            if let Some(message) = &fb.error_message {
                map.insert("error_message".into(), json!(message));
            }
            Value::Object(map)
        }
        Payload::Event(ev) => {
            let mut map = Map::new();
            map.insert("event".into(), json!(ev.event));
            map.insert("details".into(), json!(ev.details));
            for flag in EventKind::FLAGS {
                map.insert(flag.name().into(), json!(flag == ev.event));
            }
            Value::Object(map)
        }
        Payload::Error(err) => json!({
            "severity": err.severity,
            "error_code": err.error_code,
            "error_message": err.error_message,
        }),
        other => {
            return Err(Error::Other(format!(
                "{:?} payloads are inbound only",
                other.command()
            )));
        }
    };
    Ok(value)
}
