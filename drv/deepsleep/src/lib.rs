// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deep-sleep HAL for the reference platform.
//!
//! The reference platform has no deep-sleep support at all, so this module
//! is a lifecycle flag wrapped around stubs: every operation validates its
//! arguments and the lifecycle, then reports that the platform cannot do
//! it. The stubs exist because the daemon above us probes them
//! unconditionally and expects honest status codes, not because anything
//! here will ever sleep.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;
use num_derive::FromPrimitive;

/// Status codes reported across the deep-sleep HAL boundary.
#[derive(Copy, Clone, Debug, FromPrimitive, PartialEq, Eq)]
#[repr(u8)]
pub enum DsError {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    InvalidArgument = 3,
    /// The platform could not enter deep sleep. On this platform, it never
    /// can.
    SetFailure = 4,
    /// The platform could not complete a deep-sleep wakeup.
    WakeupFailure = 5,
}

impl fmt::Display for DsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            DsError::NotInitialized => "deep sleep module is not initialized",
            DsError::AlreadyInitialized => {
                "deep sleep module is already initialized"
            }
            DsError::InvalidArgument => "argument out of enumerated range",
            DsError::SetFailure => "platform failed to enter deep sleep",
            DsError::WakeupFailure => "platform failed to wake from deep sleep",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for DsError {}

/// Deep-sleep module lifecycle plus the stubs behind it.
///
/// The lifecycle flag is a compare-and-swap so concurrent init/terminate
/// callers race cleanly: exactly one of them wins, the rest get the
/// appropriate status.
#[derive(Default)]
pub struct DeepSleepManager {
    initialized: AtomicBool,
}

impl DeepSleepManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&self) -> Result<(), DsError> {
        self.initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| DsError::AlreadyInitialized)
    }

    pub fn terminate(&self) -> Result<(), DsError> {
        self.initialized
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| DsError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Requests deep sleep with a wake timeout in seconds. On success the
    /// platform would report whether the wake was GPIO-driven; this
    /// platform always fails the request instead.
    pub fn set_deep_sleep(
        &self,
        _timeout_secs: u32,
        _network_standby: bool,
    ) -> Result<bool, DsError> {
        if !self.is_initialized() {
            return Err(DsError::NotInitialized);
        }
        warn!("deep sleep requested, but this platform has no deep sleep support");
        Err(DsError::SetFailure)
    }

    /// Requests an exit from deep sleep. Same story as
    /// [`set_deep_sleep`](Self::set_deep_sleep).
    pub fn wakeup(&self) -> Result<(), DsError> {
        if !self.is_initialized() {
            return Err(DsError::NotInitialized);
        }
        warn!("deep sleep wakeup requested, but this platform has no deep sleep support");
        Err(DsError::WakeupFailure)
    }
}
