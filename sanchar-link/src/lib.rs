//! SancharLink - command link firmware for a mobile robot
//!
//! Accepts robot-net/1.0 JSON commands from a base station over UDP, drives
//! the motors, and reports heartbeats, feedback, events and errors back to
//! whichever station spoke last.
//!
//! ## Data flow
//!
//! ```text
//! UdpListener ─┐
//!              ├─> Trigger queue ─> Firmware loop ─> Dispatcher ─┬─> MotorExecutor ─> ActuatorDriver
//! Heartbeat ───┘                         │                      └─> ConfigStore
//!                                        └─> UdpLink (feedback, heartbeat, error)
//! ```

pub mod app;
pub mod config;
pub mod core;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod firmware;
pub mod heartbeat;
pub mod motor;
pub mod protocol;
pub mod store;
pub mod streaming;

// Re-export commonly used types
pub use app::{SancharApp, ShutdownHandle};
pub use config::AppConfig;
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
