// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Platform power-cycle primitives.
//!
//! The coordinator invokes power-off and reboot through this trait so that
//! tests can substitute a recording fake instead of terminating the test
//! process. The production implementation goes through the platform's
//! `poweroff`/`reboot` utilities rather than the raw reboot syscall, so
//! init gets a chance to run its shutdown hooks.

use std::io;
use std::process::Command;

pub trait PlatformControl: Send + Sync {
    /// Powers the platform down. Not expected to return control under
    /// normal operation.
    fn power_off(&self) -> io::Result<()>;

    /// Reboots the platform. Not expected to return control under normal
    /// operation.
    fn reboot(&self) -> io::Result<()>;

    /// Flushes pending disk writes. Called before power-off and after
    /// every applied transition.
    fn sync(&self);
}

/// The real thing.
pub struct SystemControl;

impl PlatformControl for SystemControl {
    fn power_off(&self) -> io::Result<()> {
        run("poweroff")
    }

    fn reboot(&self) -> io::Result<()> {
        run("reboot")
    }

    fn sync(&self) {
        unsafe { libc::sync() }
    }
}

fn run(utility: &str) -> io::Result<()> {
    let status = Command::new(utility).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{utility} exited with {status}"),
        ))
    }
}
