//! RCC register access backing the resume clock sequencer.

use embassy_stm32::pac::RCC;
use vcom_rs::power::ClockControl;

/// `RCC_CFGR.SW` / `RCC_CFGR.SWS` masks.
const CFGR_SW_MASK: u32 = 0b0000_0011;
const CFGR_SWS_MASK: u32 = 0b0000_1100;
/// `SW` value selecting the PLL.
const CFGR_SW_PLL: u32 = 0b10;

/// STM32F303 clock-control primitives.
///
/// Only ever touched from the USB task, after `embassy_stm32::init` configured the
/// tree once. The sequencer puts it back into that same configuration on resume.
pub struct SystemClocks {
    _private: (),
}

impl SystemClocks {
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for SystemClocks {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockControl for SystemClocks {
    fn enable_hse(&mut self) {
        RCC.cr().modify(|w| w.set_hseon(true));
    }

    fn hse_ready(&self) -> bool {
        RCC.cr().read().hserdy()
    }

    fn enable_pll(&mut self) {
        RCC.cr().modify(|w| w.set_pllon(true));
    }

    fn pll_ready(&self) -> bool {
        RCC.cr().read().pllrdy()
    }

    fn select_pll_sysclk(&mut self) {
        RCC.cfgr().modify(|w| w.0 = (w.0 & !CFGR_SW_MASK) | CFGR_SW_PLL);
    }

    fn sysclk_status(&self) -> u8 {
        (RCC.cfgr().read().0 & CFGR_SWS_MASK) as u8
    }
}
