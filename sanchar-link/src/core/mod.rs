//! Core abstractions shared by the protocol, store and motor layers.
//!
//! - [`driver::ActuatorDriver`]: Trait to implement for new motor hardware
//! - [`types`]: Robot state, motor identities and actuation primitives

pub mod driver;
pub mod types;
