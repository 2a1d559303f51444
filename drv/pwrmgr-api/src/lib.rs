// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common definitions for the reference-platform power management HAL,
//! shared by the HAL implementation and the tools that drive it.
//!
//! The power-manager daemon above us speaks in raw integers; everything it
//! hands across the boundary is validated by `FromPrimitive` conversion into
//! one of the enums below, never by hand-rolled range checks.

use std::fmt;
use std::str::FromStr;

pub use num_derive::FromPrimitive;
pub use num_traits::FromPrimitive;

/// Commanded power state of the CPE. This is the state most recently
/// *requested* of the platform, which is not necessarily the state most
/// recently *applied* — transitions are carried out asynchronously.
#[derive(Copy, Clone, Debug, FromPrimitive, PartialEq, Eq)]
#[repr(u8)]
pub enum PowerState {
    /// Power the box down entirely. Terminal: dispatching this state does
    /// not return under normal operation.
    Off = 0,
    /// Standby: the platform stays up with the CPU clocked for minimum
    /// power draw.
    Standby = 1,
    /// Fully on, full performance.
    On = 2,
    /// Standby substate that keeps the CPU responsive to load.
    StandbyLightSleep = 3,
    /// Standby substate that clocks the CPU as conservatively as the
    /// platform allows short of powering off.
    StandbyDeepSleep = 4,
}

impl PowerState {
    /// The scaling governor this state maps onto, or `None` for [`Off`],
    /// which powers the platform down instead of retuning it.
    ///
    /// [`Off`]: PowerState::Off
    pub fn governor(self) -> Option<Governor> {
        match self {
            PowerState::Off => None,
            PowerState::Standby => Some(Governor::Powersave),
            PowerState::On => Some(Governor::Performance),
            PowerState::StandbyLightSleep => Some(Governor::Ondemand),
            PowerState::StandbyDeepSleep => Some(Governor::Conservative),
        }
    }
}

/// CPU frequency scaling governor policy names, exactly the token set the
/// kernel accepts in the `scaling_governor` control file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Governor {
    Conservative,
    Ondemand,
    Userspace,
    Powersave,
    Performance,
    Schedutil,
}

impl Governor {
    pub const ALL: [Governor; 6] = [
        Governor::Conservative,
        Governor::Ondemand,
        Governor::Userspace,
        Governor::Powersave,
        Governor::Performance,
        Governor::Schedutil,
    ];

    /// The literal token written to (and read from) sysfs.
    pub fn as_str(self) -> &'static str {
        match self {
            Governor::Conservative => "conservative",
            Governor::Ondemand => "ondemand",
            Governor::Userspace => "userspace",
            Governor::Powersave => "powersave",
            Governor::Performance => "performance",
            Governor::Schedutil => "schedutil",
        }
    }
}

impl fmt::Display for Governor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Governor {
    type Err = UnknownGovernor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Governor::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or(UnknownGovernor)
    }
}

/// Error type for parsing a governor token that is not in the fixed set.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UnknownGovernor;

impl fmt::Display for UnknownGovernor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("not a recognized scaling governor")
    }
}

impl std::error::Error for UnknownGovernor {}

/// Status codes reported across the HAL boundary, one per call; there is no
/// asynchronous error channel for failures on the worker side.
#[derive(Copy, Clone, Debug, FromPrimitive, PartialEq, Eq)]
#[repr(u8)]
pub enum PmError {
    /// The operation requires a prior successful init.
    NotInitialized = 1,
    /// Init was called on an already-initialized module.
    AlreadyInitialized = 2,
    /// A parameter was outside its enumerated range.
    InvalidArgument = 3,
    /// Module bring-up failed (control file inaccessible, or the worker
    /// could not be started).
    InitFailure = 4,
    /// A synchronization primitive failed during a set operation.
    SetFailure = 5,
    /// A synchronization primitive failed during a get operation.
    GetFailure = 6,
    /// A synchronization primitive failed during teardown.
    TermFailure = 7,
    /// A sysfs read could not be completed or parsed.
    ReadFailure = 8,
    /// The platform does not implement the requested capability.
    OperationNotSupported = 9,
}

impl fmt::Display for PmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            PmError::NotInitialized => "power manager is not initialized",
            PmError::AlreadyInitialized => {
                "power manager is already initialized"
            }
            PmError::InvalidArgument => "argument out of enumerated range",
            PmError::InitFailure => "power manager initialization failed",
            PmError::SetFailure => "set operation failed",
            PmError::GetFailure => "get operation failed",
            PmError::TermFailure => "termination failed",
            PmError::ReadFailure => "sysfs read failed",
            PmError::OperationNotSupported => {
                "operation not supported on this platform"
            }
        };
        f.write_str(msg)
    }
}

impl std::error::Error for PmError {}

/// Wake-up source types the daemon may ask us to configure. The reference
/// platform supports none of them, but the type set is fixed by the
/// daemon-facing contract.
#[derive(Copy, Clone, Debug, FromPrimitive, PartialEq, Eq)]
#[repr(u8)]
pub enum WakeupSource {
    Voice = 0,
    PresenceDetection = 1,
    Bluetooth = 2,
    Wifi = 3,
    Ir = 4,
    PowerKey = 5,
    Timer = 6,
    Cec = 7,
    Lan = 8,
}

/// Core temperature classification against the configured thresholds.
#[derive(Copy, Clone, Debug, FromPrimitive, PartialEq, Eq)]
#[repr(u8)]
pub enum ThermalState {
    Normal = 0,
    High = 1,
    Critical = 2,
}
