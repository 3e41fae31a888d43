//! robot-net/1.0 wire protocol
//!
//! JSON datagrams with a common envelope (`protocol`, `message_type`,
//! `request_id`, `mode`, `timestamp`, `payload`). Enumerations travel as
//! either snake_case names or integer codes; see [`wire_enum`].

pub mod decode;
pub mod encode;
pub mod messages;
pub(crate) mod wire_enum;

pub use decode::Decoder;
pub use encode::{Encoder, to_bytes, to_json};
pub use messages::{
    CommandKind, DEFAULT_PROTOCOL_TAG, Envelope, FeedbackPayload, FeedbackStatus, MessageKind,
    Mode, MotorControlPayload, MotorSelection, Payload, error_codes,
};
