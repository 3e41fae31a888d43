//! Motor actuation: command executor and driver implementations

pub mod executor;
pub mod host;
pub mod mock;

pub use executor::{MotorExecutor, PendingStop, SafeStop, SharedDriver, shared_driver};
pub use host::LoggingDriver;
pub use mock::{DriverCall, RecordingDriver};
