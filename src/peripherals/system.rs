//! System initialization and clock configuration for STM32F303.
//!
//! Brings up the clock tree for full-speed USB operation and exposes the factory
//! unique ID used for the USB serial number.

use embassy_stm32::{
    interrupt::{self, InterruptExt, Priority},
    rcc::*,
    time::Hertz,
    Config, Peripherals,
};
use vcom_rs::serial::{UniqueId, UniqueIdSource};

/// Initialize the STM32F303 with the clock configuration required for USB.
///
/// Configures:
/// - **8 MHz** HSE in bypass mode (driven from the ST-LINK MCO on the Discovery board)
/// - **72 MHz** system clock from PLL = HSE × 9
/// - **72 MHz** AHB, **36 MHz** APB1 (its maximum), **72 MHz** APB2
/// - **48 MHz** USB clock, PLL / 1.5 (`USBPRE` reset value)
///
/// The USB resume path re-acquires exactly this HSE → PLL → SYSCLK chain, see
/// [`crate::peripherals::rcc::SystemClocks`].
pub fn init_system() -> Peripherals {
    let mut config = Config::default();

    // External 8 MHz clock from the ST-LINK
    config.rcc.hse = Some(Hse {
        freq: Hertz(8_000_000),
        mode: HseMode::Bypass,
    });

    // PLL = HSE(8MHz) / 1 * 9 = 72MHz
    config.rcc.pll = Some(Pll {
        src: PllSource::HSE,
        prediv: PllPreDiv::DIV1,
        mul: PllMul::MUL9,
    });

    config.rcc.sys = Sysclk::PLL1_P;             // 72 MHz system clock
    config.rcc.ahb_pre = AHBPrescaler::DIV1;     // 72 MHz AHB clock
    config.rcc.apb1_pre = APBPrescaler::DIV2;    // 36 MHz APB1 clock
    config.rcc.apb2_pre = APBPrescaler::DIV1;    // 72 MHz APB2 clock

    embassy_stm32::init(config)
}

/// Interrupt priorities for the USB peripheral.
///
/// The USB low-priority line carries all regular endpoint and bus events, including
/// suspend and resume. It is kept below anything time critical since resume may spin
/// on the clock tree.
pub fn configure_interrupts() {
    interrupt::USB_LP_CAN_RX0.set_priority(Priority::P6);
}

/// 96-bit factory unique ID (`0x1FFF_F7AC`).
pub struct SiliconId;

impl UniqueIdSource for SiliconId {
    fn unique_id(&self) -> UniqueId {
        UniqueId::from_bytes(embassy_stm32::uid::uid())
    }
}
