//! USB system abstraction for the STM32F303 full-speed device peripheral.
//!
//! Provides USB device initialization, the D+ soft-connect pull-up and wiring of the
//! power lifecycle handler.

use defmt::info;
use embassy_stm32::{
    bind_interrupts,
    gpio::{Level, OutputOpenDrain, Speed},
    peripherals::{PA11, PA12, PE14, USB},
    usb::{Driver, InterruptHandler},
    Peri,
};
use embassy_futures::join::join;
use embassy_time::Timer;
use embassy_usb::{class::cdc_acm::State, Builder, UsbDevice};
use static_cell::ConstStaticCell;

use super::acm::{VirtualComPort, ACM_STATE};
use super::usb_power::{PowerHandler, POWER_HANDLER};
use crate::apps::echo_app::EchoApp;

/// Peripheral collection for UsbSystem
pub struct UsbClaims<'d> {
    pub usb: Peri<'d, USB>,
    pub dp: Peri<'d, PA12>,         // USB_DP
    pub dm: Peri<'d, PA11>,         // USB_DM
    pub disconnect: Peri<'d, PE14>, // D+ pull-up control
    pub usb_buffers: &'d mut UsbBuffers,
    pub serial_number: &'d str,
}

/// Macro to claim peripherals for UsbSystem
#[macro_export]
macro_rules! claim_usb {
    ($peripherals:expr, $serial_number:expr) => {{
        $crate::peripherals::usb_system::UsbClaims {
            usb: $peripherals.USB,
            dp: $peripherals.PA12,         // USB_DP
            dm: $peripherals.PA11,         // USB_DM
            disconnect: $peripherals.PE14, // D+ pull-up control
            usb_buffers: $crate::peripherals::usb_system::USB_BUFFERS.take(),
            serial_number: $serial_number,
        }
    }};
}

/// Maximum packet size for full-speed bulk endpoints.
pub const MAX_PACKET_SIZE: u16 = 64;

/// USB vendor and product ID (ST Virtual COM Port).
pub const USB_VID: u16 = 0x0483;
pub const USB_PID: u16 = 0x5740;

/// Time the pull-up is held released so the host sees a detach.
const DISCONNECT_MS: u64 = 10;

bind_interrupts!(
    /// USB interrupt handlers
    pub struct UsbInterrupts {
        USB_LP_CAN_RX0 => InterruptHandler<USB>;
    }
);

/// USB buffers for device operation.
#[repr(C, align(4))]
pub struct UsbBuffers {
    /// USB configuration descriptor buffer
    pub config_descriptor: [u8; 256],
    /// USB BOS descriptor buffer
    pub bos_descriptor: [u8; 256],
    /// USB control transfer buffer
    pub control_buf: [u8; 64],
}
pub static USB_BUFFERS: ConstStaticCell<UsbBuffers> = ConstStaticCell::new(UsbBuffers::new());

impl UsbBuffers {
    /// Create a new set of USB buffers.
    pub const fn new() -> Self {
        Self {
            config_descriptor: [0u8; 256],
            bos_descriptor: [0u8; 256],
            control_buf: [0u8; 64],
        }
    }
}

impl Default for UsbBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// Software connection/disconnection of the USB cable.
///
/// PE14 drives the D+ pull-up through an open-drain output: low connects, high
/// (released) disconnects.
pub struct UsbCable<'d> {
    pin: OutputOpenDrain<'d>,
}

impl<'d> UsbCable<'d> {
    /// Take the pin, starting disconnected.
    pub fn new(pin: Peri<'d, PE14>) -> Self {
        Self {
            pin: OutputOpenDrain::new(pin, Level::High, Speed::Low),
        }
    }

    pub fn connect(&mut self) {
        self.pin.set_low();
    }

    pub fn disconnect(&mut self) {
        self.pin.set_high();
    }
}

/// USB device system abstraction.
///
/// Manages USB device initialization and operation.
pub struct UsbSystem<'d> {
    /// The USB device instance
    usb_device: Option<UsbDevice<'d, Driver<'d, USB>>>,
    /// The USB builder (consumed when creating the device)
    builder: Option<Builder<'d, Driver<'d, USB>>>,
    /// D+ pull-up
    cable: UsbCable<'d>,
}

impl<'d> UsbSystem<'d> {
    /// Create a new USB system
    ///
    /// # Arguments
    /// * `claims` - UsbClaims struct containing all required peripherals, buffers and
    ///   the serial number string
    pub fn new(claims: UsbClaims<'d>) -> Self {
        info!("Initializing USB system...");
        let UsbClaims {
            usb,
            dp,
            dm,
            disconnect,
            usb_buffers,
            serial_number,
        } = claims;

        // Keep the host from seeing us until the device is ready to run
        let cable = UsbCable::new(disconnect);

        // Configure USB device descriptor
        let mut config = embassy_usb::Config::new(USB_VID, USB_PID);
        config.manufacturer = Some("STMicroelectronics");
        config.product = Some("STM32 Virtual ComPort");
        config.serial_number = Some(serial_number);
        config.max_power = 100;
        config.max_packet_size_0 = MAX_PACKET_SIZE as u8;

        let driver = Driver::new(usb, UsbInterrupts, dp, dm);

        // Create the USB builder with all required buffers
        let mut builder = Builder::new(
            driver,
            config,
            &mut usb_buffers.config_descriptor,
            &mut usb_buffers.bos_descriptor,
            &mut [], // No Microsoft OS descriptors
            &mut usb_buffers.control_buf,
        );

        // Suspend/resume and configuration events drive the power lifecycle
        builder.handler(POWER_HANDLER.init(PowerHandler::new()));

        info!("USB system initialized with serial number {}", serial_number);

        Self {
            usb_device: None,
            builder: Some(builder),
            cable,
        }
    }

    /// Get mutable access to the USB builder for class registration.
    ///
    /// USB classes (like CDC ACM) use this to register their endpoints.
    ///
    /// # Panics
    ///
    /// Panics if the builder has already been consumed.
    pub fn builder(&mut self) -> &mut Builder<'d, Driver<'d, USB>> {
        self.builder.as_mut().expect("USB builder has already been consumed")
    }

    /// Run the USB device.
    ///
    /// Builds the USB device, signals a detach/attach to the host through the pull-up
    /// and runs the device. This function runs indefinitely.
    pub async fn run(&mut self) -> ! {
        // Build the device if not already built
        if self.usb_device.is_none() {
            if let Some(builder) = self.builder.take() {
                info!("Building USB device...");
                self.usb_device = Some(builder.build());
                info!("USB device built successfully");
            }
        }

        self.cable.disconnect();
        Timer::after_millis(DISCONNECT_MS).await;
        self.cable.connect();
        info!("USB cable connected");

        // Run the USB device task
        let device = self.usb_device.as_mut().expect("Failed to build USB device");
        device.run().await;
    }
}

/// USB system task with the virtual COM port loopback
#[embassy_executor::task]
pub async fn usb_task(claims: UsbClaims<'static>) -> ! {
    let mut usb_system = UsbSystem::new(claims);
    let port = VirtualComPort::new(usb_system.builder(), ACM_STATE.init(State::new()));
    let mut echo = EchoApp::new(port);

    // Run both the USB device and the echo app concurrently
    join(usb_system.run(), echo.run()).await.0
}
