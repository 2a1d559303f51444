// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core temperature accessors.
//!
//! Single-shot reads of the platform's thermal zone file (integer
//! millidegrees Celsius) classified against a pair of runtime-settable
//! thresholds. There is no policy here — no trip actions, no scaling — just
//! the measurement and the classification the daemon asks for.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use log::warn;

use drv_pwrmgr_api::{PmError, ThermalState};

use crate::config::PlatformConfig;

/// Threshold pair, degrees Celsius.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Thresholds {
    /// At or above this, the core reports [`ThermalState::High`].
    pub high: f32,
    /// At or above this, the core reports [`ThermalState::Critical`].
    pub critical: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high: 60.0,
            critical: 75.0,
        }
    }
}

/// One temperature sample plus its classification at sample time.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ThermalReading {
    pub celsius: f32,
    pub state: ThermalState,
}

pub struct ThermalMonitor {
    zone: PathBuf,
    thresholds: Mutex<Thresholds>,
}

impl ThermalMonitor {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            zone: config.thermal_zone_path.clone(),
            thresholds: Mutex::new(Thresholds::default()),
        }
    }

    /// Reads the thermal zone once and classifies the result. Read or
    /// parse failures propagate to this caller only; nothing is cached.
    pub fn read(&self) -> Result<ThermalReading, PmError> {
        let raw = fs::read_to_string(&self.zone).map_err(|err| {
            warn!("thermal zone {} read failed: {err}", self.zone.display());
            PmError::ReadFailure
        })?;
        let millidegrees =
            raw.trim().parse::<i64>().map_err(|_| PmError::ReadFailure)?;
        let celsius = millidegrees as f32 / 1000.0;

        let thresholds = self.thresholds()?;
        let mut state = ThermalState::Normal;
        if celsius >= thresholds.high {
            state = ThermalState::High;
        }
        if celsius >= thresholds.critical {
            state = ThermalState::Critical;
        }
        Ok(ThermalReading { celsius, state })
    }

    pub fn thresholds(&self) -> Result<Thresholds, PmError> {
        self.thresholds
            .lock()
            .map(|t| *t)
            .map_err(|_| PmError::GetFailure)
    }

    pub fn set_thresholds(
        &self,
        thresholds: Thresholds,
    ) -> Result<(), PmError> {
        let mut current =
            self.thresholds.lock().map_err(|_| PmError::SetFailure)?;
        *current = thresholds;
        Ok(())
    }
}
