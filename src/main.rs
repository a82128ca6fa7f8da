//! Main application entry point for the vcom-rs virtual COM port firmware.
//!
//! Brings up the STM32F303 clock tree, derives the USB serial number from the
//! silicon unique ID and hands the USB peripheral to the USB task.

#![no_std]
#![no_main]

// Application modules
mod apps;
mod peripherals;

use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Timer};
use peripherals::usb_power::{DEVICE_STATE, STATE_CHANGED};
use peripherals::{configure_interrupts, init_system, SiliconId};
use static_cell::StaticCell;
use vcom_rs::serial::{compute_serial_number, SerialNumberString, SERIAL_CHARS};

// Import panic handler and defmt RTT for debugging
#[cfg(not(feature = "debug"))]
use panic_halt as _;
#[cfg(feature = "debug")]
use {defmt_rtt as _, panic_probe as _};

/// ASCII copy of the serial number descriptor, borrowed by the USB stack for the
/// lifetime of the device.
static SERIAL_NUMBER: StaticCell<[u8; SERIAL_CHARS]> = StaticCell::new();

/// Interval of the heartbeat log when nothing else happens
const HEARTBEAT: Duration = Duration::from_secs(60);

/// Main application entry point
///
/// Initializes the system and spawns the USB task, then reports lifecycle changes.
/// This function never returns.
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting vcom-rs firmware v{}", env!("CARGO_PKG_VERSION"));

    // Initialize STM32 peripherals with the 72 MHz / 48 MHz USB clock tree
    let peripherals = init_system();
    configure_interrupts();

    // Serial number must be in place before the USB device is built
    let mut descriptor = SerialNumberString::default();
    if !compute_serial_number(&SiliconId, &mut descriptor) {
        warn!("Using default USB serial number");
    }
    let serial_number = descriptor.to_ascii(SERIAL_NUMBER.init([0; SERIAL_CHARS]));

    info!("System initialized, spawning USB task...");
    spawner
        .spawn(peripherals::usb_system::usb_task(claim_usb!(peripherals, serial_number)))
        .unwrap();

    loop {
        match select(STATE_CHANGED.wait(), Timer::after(HEARTBEAT)).await {
            Either::First(state) => info!("USB device {}", state.name()),
            Either::Second(()) => info!("Heartbeat - USB device {}", DEVICE_STATE.load().name()),
        }
    }
}
