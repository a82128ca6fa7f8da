//! Application layer for the virtual COM port.
//!
//! Applications use the hardware abstractions from the peripherals layer and only run
//! while the host has the port open.

/// Loopback application for the CDC ACM port
pub mod echo_app;
