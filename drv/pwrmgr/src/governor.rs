// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scaling-governor control file adapter.
//!
//! This is the leaf that actually touches sysfs: it reads the platform's one
//! `scaling_governor` file, validates tokens against the fixed governor set
//! before writing, and offers the read+write probe init uses to decide
//! whether the platform is usable at all.
//!
//! The file is accessed without any inter-process coordination; this process
//! is assumed to be the sole writer on the platform.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use drv_pwrmgr_api::Governor;

/// Handle on the platform's CPU frequency scaling governor control file.
/// Stateless beyond the path; every operation opens the file fresh, the way
/// sysfs files are meant to be used.
#[derive(Clone, Debug)]
pub struct GovernorFile {
    path: PathBuf,
}

impl GovernorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checks that the control file can be opened for both read and write.
    /// Used once at init time; a platform that fails this probe cannot
    /// honor any state transition.
    pub fn probe(&self) -> bool {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .is_ok()
    }

    /// Reads the current governor token, raw. The kernel terminates the
    /// content with a newline; we hand it back untrimmed and let callers
    /// decide. An empty read is an error — the file exists but the platform
    /// gave us nothing.
    pub fn read(&self) -> io::Result<String> {
        let mut contents = String::new();
        File::open(&self.path)?.read_to_string(&mut contents)?;
        if contents.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "governor control file read produced no data",
            ));
        }
        Ok(contents)
    }

    /// Writes a governor by validated token. Tokens outside the fixed set
    /// are rejected with `InvalidInput` before any I/O is attempted.
    pub fn write_name(&self, name: &str) -> io::Result<()> {
        let governor = name.parse::<Governor>().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{name:?} is not a recognized scaling governor"),
            )
        })?;
        self.write(governor)
    }

    /// Writes the literal governor token to the control file. No retry on
    /// failure; the coordinator logs and carries on.
    pub fn write(&self, governor: Governor) -> io::Result<()> {
        // Truncation matters for the tests' plain files and is a no-op on
        // the real sysfs attribute.
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.write_all(governor.as_str().as_bytes())
    }
}
