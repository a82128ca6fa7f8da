//! Logging shims for the library.
//!
//! Forward to `defmt` when building for the target with the `defmt` feature
//! (`firmware_log` is set by the build script). Otherwise the arguments are only
//! borrowed so host builds stay warning free without a global logger.

#![allow(unused_macros)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(firmware_log)]
            ::defmt::trace!($s $(, $x)*);
            #[cfg(not(firmware_log))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(firmware_log)]
            ::defmt::debug!($s $(, $x)*);
            #[cfg(not(firmware_log))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(firmware_log)]
            ::defmt::info!($s $(, $x)*);
            #[cfg(not(firmware_log))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(firmware_log)]
            ::defmt::warn!($s $(, $x)*);
            #[cfg(not(firmware_log))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(firmware_log)]
            ::defmt::error!($s $(, $x)*);
            #[cfg(not(firmware_log))]
            let _ = ($( & $x ),*);
        }
    };
}
