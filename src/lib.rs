//! Hardware-independent core of the vcom-rs firmware.
//!
//! Everything in here talks to the chip only through small capability traits
//! ([`power::ClockControl`], [`serial::UniqueIdSource`], [`power::ConfigurationStatus`])
//! so the decision logic can be exercised on the host. The firmware binary provides
//! the STM32F303 implementations of those traits.

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to the modules below
#[macro_use]
mod fmt;

pub mod packets;
pub mod power;
pub mod serial;
