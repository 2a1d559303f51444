// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Operator tool for poking the power management HAL by hand.
//!
//! This drives the same code paths the power-manager daemon does, which
//! makes it useful both for bring-up on a new board revision and for
//! checking what a deployed box currently thinks its power state is.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};

use drv_pwrmgr::config::PlatformConfig;
use drv_pwrmgr::governor::GovernorFile;
use drv_pwrmgr::thermal::ThermalMonitor;
use drv_pwrmgr::PowerManager;
use drv_pwrmgr_api::PowerState;

#[derive(Parser)]
#[clap(name = "pwrctl", about = "reference platform power management tool")]
struct Args {
    /// TOML file overriding the platform sysfs paths.
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(clap::Subcommand)]
enum Cmd {
    /// Show the current governor and core temperature.
    Status,
    /// Apply a power state and wait for the governor write to land.
    Set { state: String },
    /// Stop the coordinator and power-cycle the platform.
    Reset { state: String },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.cmd {
        Cmd::Status => cmd_status(&config),
        Cmd::Set { state } => cmd_set(&config, parse_state(&state)?),
        Cmd::Reset { state } => cmd_reset(&config, parse_state(&state)?),
    }
}

fn load_config(path: Option<&Path>) -> Result<PlatformConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(PlatformConfig::default()),
    }
}

fn cmd_status(config: &PlatformConfig) -> Result<()> {
    let governor = GovernorFile::new(config.scaling_governor_path.clone());
    match governor.read() {
        Ok(token) => println!("governor: {}", token.trim()),
        Err(err) => println!("governor: unavailable ({err})"),
    }

    let thermal = ThermalMonitor::new(config);
    match thermal.read() {
        Ok(reading) => println!(
            "core temperature: {:.1} C ({:?})",
            reading.celsius, reading.state
        ),
        Err(err) => println!("core temperature: unavailable ({err})"),
    }
    Ok(())
}

fn cmd_set(config: &PlatformConfig, state: PowerState) -> Result<()> {
    let mgr = PowerManager::new(config);
    mgr.init().context("initializing power manager")?;
    mgr.set_power_state(state)
        .context("requesting power state")?;

    match state.governor() {
        Some(wanted) => {
            // The transition is asynchronous; give the worker a moment to
            // land the write before tearing the coordinator down.
            if wait_for_token(&config.scaling_governor_path, wanted.as_str())
            {
                info!("governor now {wanted}");
            } else {
                warn!("governor write did not land before timeout");
            }
        }
        None => {
            // Off: if the platform is going down, we go down with it.
            std::thread::sleep(Duration::from_secs(5));
            warn!("platform did not power off");
        }
    }

    mgr.terminate().context("terminating power manager")?;
    Ok(())
}

fn cmd_reset(config: &PlatformConfig, state: PowerState) -> Result<()> {
    let mgr = PowerManager::new(config);
    mgr.init().context("initializing power manager")?;
    mgr.reset(state).context("requesting platform power-cycle")?;
    // Reachable only if the power-cycle utility returned at all.
    warn!("platform reset requested; still running");
    Ok(())
}

fn wait_for_token(path: &Path, token: &str) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if fs::read_to_string(path)
            .map(|s| s.trim() == token)
            .unwrap_or(false)
        {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn parse_state(name: &str) -> Result<PowerState> {
    let state = match name {
        "off" => PowerState::Off,
        "standby" => PowerState::Standby,
        "on" => PowerState::On,
        "light-sleep" | "standby-light-sleep" => {
            PowerState::StandbyLightSleep
        }
        "deep-sleep" | "standby-deep-sleep" => PowerState::StandbyDeepSleep,
        _ => bail!(
            "unknown power state {name:?} (expected off, standby, on, \
             light-sleep, or deep-sleep)"
        ),
    };
    Ok(state)
}
