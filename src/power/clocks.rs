//! System clock re-acquisition after USB suspend.
//!
//! While the bus is suspended the clock tree may have been dropped back to the
//! internal oscillator. On resume the sequencer walks the tree back up in the only
//! order the RCC accepts:
//!
//! 1. HSE on, wait for `HSERDY`
//! 2. PLL on, wait for `PLLRDY`
//! 3. SYSCLK switched to the PLL, wait for `SWS` to report it
//!
//! Each wait goes through the sequencer's [`Spin`] policy.

use super::wait::Spin;

/// `RCC_CFGR.SWS` value (already in register position) when SYSCLK runs from HSI.
pub const SWS_HSI: u8 = 0x00;
/// `RCC_CFGR.SWS` value when SYSCLK runs from the PLL.
pub const SWS_PLL: u8 = 0x08;

/// Number of `HSERDY` polls after which the HSE startup is reported as timed out.
pub const HSE_STARTUP_TIMEOUT: u32 = 0x5000;

/// Clock-control primitives the sequencer drives.
///
/// The firmware implements this on top of the RCC registers; tests substitute a
/// simulated RCC.
pub trait ClockControl {
    /// Set `HSEON`.
    fn enable_hse(&mut self);
    /// `HSERDY` flag.
    fn hse_ready(&self) -> bool;
    /// Set `PLLON`.
    fn enable_pll(&mut self);
    /// `PLLRDY` flag.
    fn pll_ready(&self) -> bool;
    /// Request the PLL as SYSCLK source (`SW`).
    fn select_pll_sysclk(&mut self);
    /// Current `SWS` bits, masked but not shifted (compare with [`SWS_PLL`]).
    fn sysclk_status(&self) -> u8;
}

/// Outcome of the bounded HSE startup check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(firmware_log, derive(defmt::Format))]
pub enum HseStartup {
    /// `HSERDY` came up within [`HSE_STARTUP_TIMEOUT`] polls
    Ready,
    /// `HSERDY` was still low after [`HSE_STARTUP_TIMEOUT`] polls
    TimedOut,
}

/// Point in the sequence at which a bounded wait gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(firmware_log, derive(defmt::Format))]
pub enum ClockStage {
    HseReady,
    PllReady,
    SysclkSwitch,
}

/// Clock sequencing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(firmware_log, derive(defmt::Format))]
pub enum ClockError {
    /// A readiness flag never came up within the configured poll limit
    AcquisitionFailed(ClockStage),
}

/// Brings SYSCLK back to the full-speed PLL configuration.
pub struct ClockSequencer<C> {
    rcc: C,
    wait: Spin,
    hse_startup: Option<HseStartup>,
}

impl<C: ClockControl> ClockSequencer<C> {
    /// Create a sequencer over `rcc` using `wait` for every readiness flag.
    pub const fn new(rcc: C, wait: Spin) -> Self {
        Self {
            rcc,
            wait,
            hse_startup: None,
        }
    }

    /// Clock-control backend.
    pub fn control(&self) -> &C {
        &self.rcc
    }

    /// HSE startup status captured by the last [`restore_clocks`](Self::restore_clocks).
    pub fn hse_startup(&self) -> Option<HseStartup> {
        self.hse_startup
    }

    /// Re-acquire HSE and PLL and switch SYSCLK back to the PLL.
    ///
    /// With [`Spin::forever`] this only returns once all three conditions have been
    /// observed and never fails. With a bounded policy the first flag that does not
    /// come up is reported and the remaining steps are skipped.
    pub fn restore_clocks(&mut self) -> Result<(), ClockError> {
        self.rcc.enable_hse();
        let startup = self.wait_for_hse_startup();
        self.hse_startup = Some(startup);
        if startup == HseStartup::TimedOut {
            warn!("HSE not ready after {} polls, still waiting", HSE_STARTUP_TIMEOUT);
        }

        self.settle(ClockStage::HseReady, |rcc| rcc.hse_ready())?;

        self.rcc.enable_pll();
        self.settle(ClockStage::PllReady, |rcc| rcc.pll_ready())?;

        self.rcc.select_pll_sysclk();
        self.settle(ClockStage::SysclkSwitch, |rcc| rcc.sysclk_status() == SWS_PLL)?;

        debug!("SYSCLK running from PLL");
        Ok(())
    }

    fn wait_for_hse_startup(&self) -> HseStartup {
        match Spin::bounded(HSE_STARTUP_TIMEOUT).until(|| self.rcc.hse_ready()) {
            Ok(()) => HseStartup::Ready,
            Err(_) => HseStartup::TimedOut,
        }
    }

    fn settle(&self, stage: ClockStage, ready: impl Fn(&C) -> bool) -> Result<(), ClockError> {
        self.wait.until(|| ready(&self.rcc)).map_err(|_| {
            error!("Clock acquisition failed at {}", stage);
            ClockError::AcquisitionFailed(stage)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::testing::{FakeRcc, Op};

    #[test]
    fn restores_in_hardware_order() {
        let mut clocks = ClockSequencer::new(FakeRcc::healthy(), Spin::forever());
        assert_eq!(clocks.restore_clocks(), Ok(()));
        assert_eq!(clocks.control().ops, [Op::EnableHse, Op::EnablePll, Op::SelectPll]);
        assert_eq!(clocks.hse_startup(), Some(HseStartup::Ready));
    }

    #[test]
    fn returns_only_after_every_flag_observed() {
        let rcc = FakeRcc::new(Some(40), Some(25), Some(7));
        let mut clocks = ClockSequencer::new(rcc, Spin::forever());
        clocks.restore_clocks().unwrap();

        let rcc = clocks.control();
        assert!(rcc.hse_seen.get());
        assert!(rcc.pll_seen.get());
        assert!(rcc.switch_seen.get());
    }

    #[test]
    fn slow_hse_reports_startup_timeout_but_still_locks() {
        let rcc = FakeRcc::new(Some(HSE_STARTUP_TIMEOUT + 100), Some(0), Some(0));
        let mut clocks = ClockSequencer::new(rcc, Spin::forever());
        assert_eq!(clocks.restore_clocks(), Ok(()));
        assert_eq!(clocks.hse_startup(), Some(HseStartup::TimedOut));
        assert!(clocks.control().hse_seen.get());
    }

    #[test]
    fn bounded_wait_reports_dead_oscillator() {
        let rcc = FakeRcc::new(None, Some(0), Some(0));
        let mut clocks = ClockSequencer::new(rcc, Spin::bounded(100));
        assert_eq!(
            clocks.restore_clocks(),
            Err(ClockError::AcquisitionFailed(ClockStage::HseReady))
        );
        // PLL must not be touched without a running reference clock
        assert_eq!(clocks.control().ops, [Op::EnableHse]);
    }

    #[test]
    fn bounded_wait_reports_unlocked_pll() {
        let rcc = FakeRcc::new(Some(0), None, Some(0));
        let mut clocks = ClockSequencer::new(rcc, Spin::bounded(100));
        assert_eq!(
            clocks.restore_clocks(),
            Err(ClockError::AcquisitionFailed(ClockStage::PllReady))
        );
        assert_eq!(clocks.control().ops, [Op::EnableHse, Op::EnablePll]);
    }

    #[test]
    fn bounded_wait_reports_stuck_switch() {
        let rcc = FakeRcc::new(Some(0), Some(0), None);
        let mut clocks = ClockSequencer::new(rcc, Spin::bounded(100));
        assert_eq!(
            clocks.restore_clocks(),
            Err(ClockError::AcquisitionFailed(ClockStage::SysclkSwitch))
        );
        assert!(!clocks.control().switch_seen.get());
    }

    #[test]
    fn bounded_wait_within_limit_succeeds() {
        let rcc = FakeRcc::new(Some(10), Some(10), Some(10));
        let mut clocks = ClockSequencer::new(rcc, Spin::bounded(100));
        assert_eq!(clocks.restore_clocks(), Ok(()));
    }
}
