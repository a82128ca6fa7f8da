//! Loopback application for the virtual COM port.
//!
//! Echoes every packet the host writes to the port. It is the function that makes the
//! device worth configuring, and the easiest way to check that the port keeps working
//! across a suspend/resume cycle.

use crate::peripherals::usb_power::DEVICE_STATE;
use crate::peripherals::usb_system::MAX_PACKET_SIZE;
use crate::peripherals::{PortError, VirtualComPort};
use defmt::{debug, info, warn};
use embassy_time::Timer;

/// One bulk OUT packet
const BUFFER_SIZE: usize = MAX_PACKET_SIZE as usize;

/// Delay before waiting for the port again after it was closed
const REOPEN_DELAY_MS: u64 = 100;

/// Echo application on top of the virtual COM port.
///
/// ```rust,ignore
/// let mut echo_app = EchoApp::new(port);
/// echo_app.run().await; // Runs forever
/// ```
pub struct EchoApp<'d> {
    port: VirtualComPort<'d>,
}

impl<'d> EchoApp<'d> {
    pub const fn new(port: VirtualComPort<'d>) -> Self {
        Self { port }
    }

    /// Waits for the host to open the port, echoes until it closes, then waits
    /// again. Never returns.
    pub async fn run(&mut self) -> ! {
        info!("Echo application started");

        loop {
            self.port.wait_open().await;
            info!("Echo app: port open, device {}", DEVICE_STATE.load().name());

            self.echo_until_closed().await;
            warn!("Echo app: port closed (device {})", DEVICE_STATE.load().name());
            Timer::after_millis(REOPEN_DELAY_MS).await;
        }
    }

    async fn echo_until_closed(&mut self) {
        let mut buffer = [0u8; BUFFER_SIZE];

        loop {
            let result = match self.port.read(&mut buffer).await {
                Ok(len) => {
                    debug!("Echoing {} bytes: {:02x}", len, &buffer[..len]);
                    self.port.write(&buffer[..len]).await
                }
                Err(error) => Err(error),
            };

            match result {
                Ok(()) => {}
                Err(PortError::Overflow) => warn!("Echo app: oversized packet dropped"),
                Err(PortError::Closed) => return,
            }
        }
    }
}
