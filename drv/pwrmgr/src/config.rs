// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Platform path configuration.
//!
//! The defaults are the reference platform's fixed sysfs paths; a config
//! file only needs to name the ones it wants to move (tests and odd board
//! variants, mostly).

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformConfig {
    /// CPU frequency scaling governor control file.
    pub scaling_governor_path: PathBuf,
    /// Core thermal zone temperature file, integer millidegrees Celsius.
    pub thermal_zone_path: PathBuf,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            scaling_governor_path: PathBuf::from(
                "/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor",
            ),
            thermal_zone_path: PathBuf::from(
                "/sys/class/thermal/thermal_zone0/temp",
            ),
        }
    }
}
