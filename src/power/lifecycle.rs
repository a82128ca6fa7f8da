//! USB device power lifecycle: attached, configured and suspended.
//!
//! | Current                | Event                       | Next                        |
//! |------------------------|-----------------------------|-----------------------------|
//! | Attached / Configured  | enter suspend               | Suspended                   |
//! | Suspended              | exit suspend (clocks back)  | Configured if config != 0, else Attached |
//! | any                    | bus reset                   | Attached                    |
//! | Attached               | configuration set != 0      | Configured                  |
//! | Configured             | configuration set to 0      | Attached                    |
//!
//! A configuration change while suspended is only picked up at resume. Suspend never
//! touches the clocks; resume re-acquires them before the state is changed. If that
//! fails the device stays suspended and the next configuration event retries the
//! resume, since the bus will not report it again.

use core::sync::atomic::{AtomicU8, Ordering};

use super::clocks::{ClockControl, ClockError, ClockSequencer};

/// Power/attach state of the USB device.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(firmware_log, derive(defmt::Format))]
pub enum DeviceState {
    Attached = 0,
    Configured = 1,
    Suspended = 2,
}

impl DeviceState {
    const fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Self::Configured,
            2 => Self::Suspended,
            _ => Self::Attached,
        }
    }

    /// Short lowercase name for log output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Attached => "attached",
            Self::Configured => "configured",
            Self::Suspended => "suspended",
        }
    }
}

/// Shared home of the [`DeviceState`].
///
/// Written only by a [`LifecycleController`], with a single atomic store, so other
/// layers may read it at any time without locking.
pub struct DeviceStateCell(AtomicU8);

impl DeviceStateCell {
    pub const fn new(initial: DeviceState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn load(&self) -> DeviceState {
        DeviceState::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, state: DeviceState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Configuration value selected by the host, as reported by the USB stack.
pub trait ConfigurationStatus {
    /// Current configuration index, 0 while unconfigured.
    fn current_configuration(&self) -> u8;
}

impl ConfigurationStatus for u8 {
    fn current_configuration(&self) -> u8 {
        *self
    }
}

impl ConfigurationStatus for AtomicU8 {
    fn current_configuration(&self) -> u8 {
        self.load(Ordering::Acquire)
    }
}

/// Resume errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(firmware_log, derive(defmt::Format))]
pub enum ResumeError {
    /// The clock tree could not be re-acquired; the device stays suspended
    Clocks(ClockError),
}

impl From<ClockError> for ResumeError {
    fn from(error: ClockError) -> Self {
        ResumeError::Clocks(error)
    }
}

/// Drives the [`DeviceState`] from USB power and configuration events.
///
/// The entry points are not reentrant; the USB stack calls them one at a time.
pub struct LifecycleController<'a, C> {
    state: &'a DeviceStateCell,
    clocks: ClockSequencer<C>,
    resume_pending: bool,
}

impl<'a, C: ClockControl> LifecycleController<'a, C> {
    /// Create a controller publishing into `state`.
    ///
    /// The initial state is whatever start-of-day code stored in the cell.
    pub const fn new(state: &'a DeviceStateCell, clocks: ClockSequencer<C>) -> Self {
        Self {
            state,
            clocks,
            resume_pending: false,
        }
    }

    /// Current device state.
    pub fn state(&self) -> DeviceState {
        self.state.load()
    }

    /// Clock sequencer used on resume.
    pub fn clocks(&self) -> &ClockSequencer<C> {
        &self.clocks
    }

    /// Whether the last resume failed to re-acquire the clocks.
    pub fn resume_pending(&self) -> bool {
        self.resume_pending
    }

    /// Bus went idle. Clocks are left as they are.
    pub fn enter_suspend(&mut self) -> DeviceState {
        self.resume_pending = false;
        match self.state() {
            DeviceState::Suspended => debug!("Already suspended"),
            previous => self.transition(previous, DeviceState::Suspended),
        }
        DeviceState::Suspended
    }

    /// Bus activity resumed.
    ///
    /// Restores the clock tree, then picks [`DeviceState::Configured`] or
    /// [`DeviceState::Attached`] from `configuration`. A resume while not suspended is
    /// ignored and leaves the clocks alone.
    pub fn exit_suspend(&mut self, configuration: &impl ConfigurationStatus) -> Result<DeviceState, ResumeError> {
        let previous = self.state();
        if previous != DeviceState::Suspended {
            warn!("Resume while {}, ignoring", previous.name());
            return Ok(previous);
        }

        if let Err(error) = self.clocks.restore_clocks() {
            self.resume_pending = true;
            return Err(error.into());
        }
        self.resume_pending = false;

        let next = Self::attached_or_configured(configuration.current_configuration());
        self.transition(previous, next);
        Ok(next)
    }

    /// Bus reset: the host forgets the configuration.
    pub fn reset(&mut self) -> DeviceState {
        self.resume_pending = false;
        let previous = self.state();
        self.transition(previous, DeviceState::Attached);
        DeviceState::Attached
    }

    /// Host selected `configuration` (0 = deconfigured).
    ///
    /// While suspended the value only takes effect at the next resume, unless a resume
    /// already failed, in which case the clock sequence is retried now.
    pub fn set_configuration(&mut self, configuration: u8) -> DeviceState {
        let previous = self.state();
        if previous == DeviceState::Suspended {
            if !self.resume_pending {
                debug!("Configuration {} recorded while suspended", configuration);
                return previous;
            }

            debug!("Retrying resume for configuration {}", configuration);
            return self.exit_suspend(&configuration).unwrap_or(DeviceState::Suspended);
        }

        let next = Self::attached_or_configured(configuration);
        self.transition(previous, next);
        next
    }

    const fn attached_or_configured(configuration: u8) -> DeviceState {
        if configuration != 0 {
            DeviceState::Configured
        } else {
            DeviceState::Attached
        }
    }

    fn transition(&self, from: DeviceState, to: DeviceState) {
        if from != to {
            debug!("Device state {} -> {}", from.name(), to.name());
        }
        self.state.store(to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::clocks::{ClockStage, SWS_PLL};
    use crate::power::testing::{FakeRcc, Op};
    use crate::power::wait::Spin;

    fn controller(state: &DeviceStateCell, rcc: FakeRcc) -> LifecycleController<'_, FakeRcc> {
        LifecycleController::new(state, ClockSequencer::new(rcc, Spin::forever()))
    }

    #[test]
    fn suspend_resume_returns_to_configured() {
        let cell = DeviceStateCell::new(DeviceState::Configured);
        let mut device = controller(&cell, FakeRcc::healthy());

        assert_eq!(device.enter_suspend(), DeviceState::Suspended);
        assert_eq!(cell.load(), DeviceState::Suspended);
        assert_eq!(device.exit_suspend(&1u8), Ok(DeviceState::Configured));
        assert_eq!(cell.load(), DeviceState::Configured);
    }

    #[test]
    fn resume_without_configuration_is_attached() {
        for initial in [DeviceState::Attached, DeviceState::Configured] {
            let cell = DeviceStateCell::new(initial);
            let mut device = controller(&cell, FakeRcc::healthy());

            device.enter_suspend();
            assert_eq!(device.exit_suspend(&0u8), Ok(DeviceState::Attached));
        }
    }

    #[test]
    fn attached_device_configured_during_suspend_resumes_configured() {
        let cell = DeviceStateCell::new(DeviceState::Attached);
        let mut device = controller(&cell, FakeRcc::healthy());
        let configuration = AtomicU8::new(0);

        device.enter_suspend();
        configuration.store(1, Ordering::Release);
        assert_eq!(device.set_configuration(1), DeviceState::Suspended);
        assert_eq!(device.exit_suspend(&configuration), Ok(DeviceState::Configured));
    }

    #[test]
    fn suspend_leaves_clocks_untouched() {
        let cell = DeviceStateCell::new(DeviceState::Configured);
        let mut device = controller(&cell, FakeRcc::healthy());

        device.enter_suspend();
        assert!(device.clocks().control().ops.is_empty());
    }

    #[test]
    fn resume_restores_clocks_before_changing_state() {
        let cell = DeviceStateCell::new(DeviceState::Configured);
        let mut device = controller(&cell, FakeRcc::new(Some(3), Some(3), Some(3)));

        device.enter_suspend();
        device.exit_suspend(&1u8).unwrap();

        let rcc = device.clocks().control();
        assert_eq!(rcc.ops, [Op::EnableHse, Op::EnablePll, Op::SelectPll]);
        assert!(rcc.switch_seen.get());
        assert_eq!(rcc.sysclk_status(), SWS_PLL);
    }

    #[test]
    fn spurious_resume_is_ignored() {
        let cell = DeviceStateCell::new(DeviceState::Configured);
        let mut device = controller(&cell, FakeRcc::healthy());

        assert_eq!(device.exit_suspend(&0u8), Ok(DeviceState::Configured));
        assert_eq!(cell.load(), DeviceState::Configured);
        assert!(device.clocks().control().ops.is_empty());
    }

    #[test]
    fn repeated_suspend_stays_suspended() {
        let cell = DeviceStateCell::new(DeviceState::Attached);
        let mut device = controller(&cell, FakeRcc::healthy());

        device.enter_suspend();
        assert_eq!(device.enter_suspend(), DeviceState::Suspended);
        assert_eq!(device.exit_suspend(&0u8), Ok(DeviceState::Attached));
    }

    #[test]
    fn failed_clock_recovery_stays_suspended() {
        let cell = DeviceStateCell::new(DeviceState::Configured);
        let rcc = FakeRcc::new(Some(0), None, Some(0));
        let mut device = LifecycleController::new(&cell, ClockSequencer::new(rcc, Spin::bounded(50)));

        device.enter_suspend();
        assert_eq!(
            device.exit_suspend(&1u8),
            Err(ResumeError::Clocks(ClockError::AcquisitionFailed(ClockStage::PllReady)))
        );
        assert_eq!(cell.load(), DeviceState::Suspended);
    }

    #[test]
    fn configuration_after_failed_resume_retries_clocks() {
        let cell = DeviceStateCell::new(DeviceState::Configured);
        // PLL only locks after more polls than the bounded wait allows in one go
        let rcc = FakeRcc::new(Some(0), Some(60), Some(0));
        let mut device = LifecycleController::new(&cell, ClockSequencer::new(rcc, Spin::bounded(50)));

        device.enter_suspend();
        assert!(device.exit_suspend(&1u8).is_err());
        assert!(device.resume_pending());

        assert_eq!(device.set_configuration(1), DeviceState::Configured);
        assert_eq!(cell.load(), DeviceState::Configured);
        assert!(!device.resume_pending());
        assert!(device.clocks().control().switch_seen.get());
    }

    #[test]
    fn configuration_retry_that_fails_again_stays_suspended() {
        let cell = DeviceStateCell::new(DeviceState::Configured);
        let rcc = FakeRcc::new(Some(0), None, Some(0));
        let mut device = LifecycleController::new(&cell, ClockSequencer::new(rcc, Spin::bounded(50)));

        device.enter_suspend();
        assert!(device.exit_suspend(&1u8).is_err());
        assert_eq!(device.set_configuration(1), DeviceState::Suspended);
        assert!(device.resume_pending());

        // A new suspend cycle starts clean
        device.enter_suspend();
        assert!(!device.resume_pending());
    }

    #[test]
    fn configuration_events_toggle_configured() {
        let cell = DeviceStateCell::new(DeviceState::Attached);
        let mut device = controller(&cell, FakeRcc::healthy());

        assert_eq!(device.set_configuration(1), DeviceState::Configured);
        assert_eq!(device.set_configuration(0), DeviceState::Attached);
    }

    #[test]
    fn reset_returns_to_attached_from_any_state() {
        for initial in [DeviceState::Attached, DeviceState::Configured, DeviceState::Suspended] {
            let cell = DeviceStateCell::new(initial);
            let mut device = controller(&cell, FakeRcc::healthy());
            assert_eq!(device.reset(), DeviceState::Attached);
            assert_eq!(cell.load(), DeviceState::Attached);
        }
    }

    #[test]
    fn controllers_are_independent() {
        let first = DeviceStateCell::new(DeviceState::Configured);
        let second = DeviceStateCell::new(DeviceState::Configured);
        let mut a = controller(&first, FakeRcc::healthy());
        let b = controller(&second, FakeRcc::healthy());

        a.enter_suspend();
        assert_eq!(a.state(), DeviceState::Suspended);
        assert_eq!(b.state(), DeviceState::Configured);
    }
}
