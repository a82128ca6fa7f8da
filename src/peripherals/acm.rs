//! Virtual COM port on the CDC ACM class.
//!
//! The port is open while the host holds DTR. Writes are whole bulk transfers: the
//! payload is split into endpoint-sized packets and closed with a zero-length packet
//! when it ends on a packet boundary.

use defmt::{debug, info};
use embassy_stm32::{peripherals::USB, usb::Driver};
use embassy_usb::{
    class::cdc_acm::{CdcAcmClass, State},
    driver::EndpointError,
    Builder,
};
use static_cell::StaticCell;
use vcom_rs::packets::Packets;

use super::usb_system::MAX_PACKET_SIZE;

/// Class state for the single CDC ACM interface.
pub static ACM_STATE: StaticCell<State<'static>> = StaticCell::new();

/// Why a port operation did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum PortError {
    /// The host closed the port, or the device left the configured state
    Closed,
    /// The host sent more than fits in the receive buffer
    Overflow,
}

impl From<EndpointError> for PortError {
    fn from(error: EndpointError) -> Self {
        match error {
            EndpointError::BufferOverflow => PortError::Overflow,
            EndpointError::Disabled => PortError::Closed,
        }
    }
}

/// Serial port seen by the host as "STM32 Virtual ComPort".
pub struct VirtualComPort<'d> {
    class: CdcAcmClass<'d, Driver<'d, USB>>,
}

impl<'d> VirtualComPort<'d> {
    /// Register the CDC ACM interface on `builder`.
    pub fn new(builder: &mut Builder<'d, Driver<'d, USB>>, state: &'d mut State<'d>) -> Self {
        Self {
            class: CdcAcmClass::new(builder, state, MAX_PACKET_SIZE),
        }
    }

    /// Wait until the host opens the port.
    pub async fn wait_open(&mut self) {
        self.class.wait_connection().await;

        let coding = self.class.line_coding();
        info!(
            "Port opened: {} baud, {} data bits, dtr {}, rts {}",
            coding.data_rate(),
            coding.data_bits(),
            self.class.dtr(),
            self.class.rts()
        );
    }

    /// Read one packet into `buf`, returning its length.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        Ok(self.class.read_packet(buf).await?)
    }

    /// Send `data` to the host as one bulk transfer.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), PortError> {
        for packet in Packets::new(data, usize::from(MAX_PACKET_SIZE)) {
            if packet.is_empty() {
                debug!("Terminating transfer with a zero-length packet");
            }
            self.class.write_packet(packet).await?;
        }
        Ok(())
    }
}
