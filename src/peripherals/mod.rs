pub mod acm;
pub mod rcc;
pub mod system;
pub mod usb_power;
pub mod usb_system;

pub use acm::{PortError, VirtualComPort};
pub use system::{configure_interrupts, init_system, SiliconId};
