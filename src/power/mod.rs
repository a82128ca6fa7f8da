//! Clock re-acquisition and the USB device power lifecycle.

pub mod clocks;
pub mod lifecycle;
pub mod wait;

pub use clocks::{ClockControl, ClockError, ClockSequencer, ClockStage, HseStartup};
pub use lifecycle::{ConfigurationStatus, DeviceState, DeviceStateCell, LifecycleController, ResumeError};
pub use wait::{Spin, Timeout};
