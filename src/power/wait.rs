//! Polling waits on hardware readiness flags.

/// The condition was still false when the poll limit ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(firmware_log, derive(defmt::Format))]
pub struct Timeout;

/// Busy-wait policy used for every hardware flag the sequencer waits on.
///
/// [`Spin::forever`] blocks until the condition holds, however long that takes. If
/// the hardware never asserts the flag the caller hangs. [`Spin::bounded`] gives up
/// after a fixed number of polls and reports [`Timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(firmware_log, derive(defmt::Format))]
pub struct Spin {
    limit: Option<u32>,
}

impl Spin {
    /// Poll without a limit.
    pub const fn forever() -> Self {
        Self { limit: None }
    }

    /// Poll at most `polls` times (at least once).
    pub const fn bounded(polls: u32) -> Self {
        Self { limit: Some(polls) }
    }

    /// The poll limit, `None` when unbounded.
    pub const fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// Poll `ready` until it returns `true`.
    pub fn until(&self, mut ready: impl FnMut() -> bool) -> Result<(), Timeout> {
        match self.limit {
            None => {
                while !ready() {
                    core::hint::spin_loop();
                }
                Ok(())
            }
            Some(polls) => {
                for _ in 0..polls.max(1) {
                    if ready() {
                        return Ok(());
                    }
                    core::hint::spin_loop();
                }
                Err(Timeout)
            }
        }
    }
}

impl Default for Spin {
    fn default() -> Self {
        Self::forever()
    }
}
