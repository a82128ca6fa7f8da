//! Bridges embassy-usb bus events into the device power lifecycle.

use core::sync::atomic::{AtomicU8, Ordering};

use defmt::{error, info, Debug2Format};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use static_cell::StaticCell;
use vcom_rs::power::{ClockSequencer, DeviceState, DeviceStateCell, LifecycleController, Spin};

use super::rcc::SystemClocks;

/// Poll limit per clock flag when resume uses a bounded wait.
#[cfg(feature = "bounded-clock-wait")]
pub const RESUME_POLL_LIMIT: u32 = 0x0010_0000;

/// Device state, readable from any task.
pub static DEVICE_STATE: DeviceStateCell = DeviceStateCell::new(DeviceState::Attached);

/// Configuration value last selected by the host (0 = unconfigured).
pub static CURRENT_CONFIGURATION: AtomicU8 = AtomicU8::new(0);

/// Latest device state, signalled on every lifecycle event.
pub static STATE_CHANGED: Signal<CriticalSectionRawMutex, DeviceState> = Signal::new();

pub static POWER_HANDLER: StaticCell<PowerHandler> = StaticCell::new();

/// Wait policy for the resume clock sequence.
fn resume_wait() -> Spin {
    #[cfg(feature = "bounded-clock-wait")]
    {
        Spin::bounded(RESUME_POLL_LIMIT)
    }
    #[cfg(not(feature = "bounded-clock-wait"))]
    {
        Spin::forever()
    }
}

/// USB event handler owning the lifecycle controller.
///
/// Registered with the embassy-usb builder; every callback runs in the USB task, so
/// the (possibly unbounded) clock wait on resume blocks only that task.
///
/// With `bounded-clock-wait` a failed resume leaves the device suspended. embassy-usb
/// reports the resume only once, so the controller retries the clock sequence on the
/// next configuration event; a bus reset or a new suspend cycle also clears it.
pub struct PowerHandler {
    lifecycle: LifecycleController<'static, SystemClocks>,
    configuration: &'static AtomicU8,
    signal: &'static Signal<CriticalSectionRawMutex, DeviceState>,
}

impl PowerHandler {
    pub fn new() -> Self {
        Self {
            lifecycle: LifecycleController::new(
                &DEVICE_STATE,
                ClockSequencer::new(SystemClocks::new(), resume_wait()),
            ),
            configuration: &CURRENT_CONFIGURATION,
            signal: &STATE_CHANGED,
        }
    }

    fn publish(&self, state: DeviceState) {
        self.signal.signal(state);
    }
}

impl Default for PowerHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl embassy_usb::Handler for PowerHandler {
    fn enabled(&mut self, enabled: bool) {
        info!("USB enabled: {}", enabled);
    }

    fn reset(&mut self) {
        info!("USB bus reset");
        self.configuration.store(0, Ordering::Release);
        let state = self.lifecycle.reset();
        self.publish(state);
    }

    fn addressed(&mut self, addr: u8) {
        info!("USB addressed: {}", addr);
    }

    fn configured(&mut self, configured: bool) {
        info!("USB configured: {}", configured);
        let value = u8::from(configured);
        self.configuration.store(value, Ordering::Release);
        let state = self.lifecycle.set_configuration(value);
        self.publish(state);
    }

    fn suspended(&mut self, suspended: bool) {
        info!("USB suspended: {}", suspended);
        if suspended {
            let state = self.lifecycle.enter_suspend();
            self.publish(state);
            return;
        }

        match self.lifecycle.exit_suspend(self.configuration) {
            Ok(state) => self.publish(state),
            Err(e) => error!("Resume failed, staying suspended: {}", Debug2Format(&e)),
        }
    }
}
