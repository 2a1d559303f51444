// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power management HAL for the reference platform.
//!
//! Most of the daemon-facing surface here is either a pass-through write to
//! the platform's one scaling-governor control file or an explicit "not
//! supported on this platform" stub. The part with real structure is the
//! power-state coordinator: a single background worker thread that
//! serializes transition side effects, fed through a single-slot overwrite
//! mailbox.
//!
//! The mailbox is deliberately *not* a queue. A set operation records the
//! new target and pokes the worker; if several sets land before the worker
//! gets scheduled, the earlier targets are simply overwritten and only the
//! last one is applied. Callers get their status back before the side
//! effect runs, and there is no asynchronous channel reporting worker-side
//! failures — a governor write that fails after the fact is logged here and
//! visible nowhere else.
//!
//! Shutdown is the one place a caller blocks: terminate (and reset, which
//! ends in a power-cycle) clears the worker's running flag, wakes it, and
//! joins it before reporting success, so the worker can never outlive the
//! manager that owns it.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;

use log::{error, info, warn};

use drv_pwrmgr_api::{FromPrimitive, PmError, PowerState, WakeupSource};

pub mod config;
pub mod governor;
pub mod platform;
#[cfg(feature = "thermal")]
pub mod thermal;

use config::PlatformConfig;
use governor::GovernorFile;
use platform::{PlatformControl, SystemControl};

/// Owner of the power-state mailbox and the worker thread. One of these
/// exists per process in production; tests create as many isolated
/// instances as they like.
///
/// The manager starts out uninitialized. Every operation other than
/// [`init`](Self::init) fails with [`PmError::NotInitialized`] until init
/// succeeds, and init itself fails with [`PmError::AlreadyInitialized`]
/// the second time. The worker thread, the wake signal, and initialized-ness
/// are created and torn down together; none outlives the others.
pub struct PowerManager {
    governor: GovernorFile,
    platform: Arc<dyn PlatformControl>,
    // `Some` exactly while the worker is alive. The lock also serializes
    // init/terminate transitions: whoever holds it owns the lifecycle.
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    shared: Arc<Shared>,
    handle: thread::JoinHandle<()>,
}

struct Shared {
    mailbox: Mutex<Mailbox>,
    wake: Condvar,
}

/// Single-slot overwrite mailbox between callers and the worker. Both the
/// target slot and the running flag live under the one lock, which is only
/// ever held for short, non-blocking sections — never across file I/O.
struct Mailbox {
    target: PowerState,
    pending: bool,
    running: bool,
}

impl PowerManager {
    /// Creates a manager for the real platform. The manager starts
    /// uninitialized; call [`init`](Self::init) before anything else.
    pub fn new(config: &PlatformConfig) -> Self {
        Self::with_platform(config, Arc::new(SystemControl))
    }

    /// Like [`new`](Self::new), with the power-cycle primitives swapped
    /// out.
    pub fn with_platform(
        config: &PlatformConfig,
        platform: Arc<dyn PlatformControl>,
    ) -> Self {
        Self {
            governor: GovernorFile::new(
                config.scaling_governor_path.clone(),
            ),
            platform,
            worker: Mutex::new(None),
        }
    }

    /// Brings the module up: probes the governor control file, starts the
    /// worker, and records the resting state.
    ///
    /// The resting state is [`PowerState::On`] and no governor write
    /// happens on its behalf — the worker blocks until the first set.
    pub fn init(&self) -> Result<(), PmError> {
        let mut slot = self.worker.lock().map_err(|_| PmError::InitFailure)?;
        if slot.is_some() {
            return Err(PmError::AlreadyInitialized);
        }
        if !self.governor.probe() {
            error!(
                "governor control file {} is not accessible read+write",
                self.governor.path().display()
            );
            return Err(PmError::InitFailure);
        }

        let shared = Arc::new(Shared {
            mailbox: Mutex::new(Mailbox {
                target: PowerState::On,
                pending: false,
                running: true,
            }),
            wake: Condvar::new(),
        });
        let handle = {
            let shared = Arc::clone(&shared);
            let governor = self.governor.clone();
            let platform = Arc::clone(&self.platform);
            thread::Builder::new()
                .name("pwrmgr-worker".to_string())
                .spawn(move || worker_loop(&shared, &governor, &*platform))
                .map_err(|_| PmError::InitFailure)?
        };
        *slot = Some(Worker { shared, handle });
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.worker.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Records `state` as the new target and wakes the worker. Returns as
    /// soon as the target is durably recorded; the side effect happens
    /// later, on the worker.
    pub fn set_power_state(&self, state: PowerState) -> Result<(), PmError> {
        let slot = self.worker.lock().map_err(|_| PmError::SetFailure)?;
        let worker = slot.as_ref().ok_or(PmError::NotInitialized)?;
        post(worker, state)
    }

    /// Daemon-facing variant of [`set_power_state`](Self::set_power_state)
    /// taking the raw state value.
    pub fn set_power_state_raw(&self, raw: u32) -> Result<(), PmError> {
        let slot = self.worker.lock().map_err(|_| PmError::SetFailure)?;
        let worker = slot.as_ref().ok_or(PmError::NotInitialized)?;
        let state =
            PowerState::from_u32(raw).ok_or(PmError::InvalidArgument)?;
        post(worker, state)
    }

    /// Returns the most recently *requested* state — the worker may not
    /// have applied it yet.
    pub fn get_power_state(&self) -> Result<PowerState, PmError> {
        let slot = self.worker.lock().map_err(|_| PmError::GetFailure)?;
        let worker = slot.as_ref().ok_or(PmError::NotInitialized)?;
        let mailbox = worker
            .shared
            .mailbox
            .lock()
            .map_err(|_| PmError::GetFailure)?;
        Ok(mailbox.target)
    }

    /// Stops and joins the worker, then marks the module uninitialized.
    /// Blocks the caller until the worker has actually exited.
    pub fn terminate(&self) -> Result<(), PmError> {
        let mut slot = self.worker.lock().map_err(|_| PmError::TermFailure)?;
        let worker = slot.take().ok_or(PmError::NotInitialized)?;
        // Holding the lifecycle lock across the join is what guarantees at
        // most one init/terminate transition in flight at a time.
        worker.stop_and_join()
    }

    /// Shuts the worker down exactly like [`terminate`](Self::terminate),
    /// then power-cycles the platform: power-off for [`PowerState::Off`],
    /// reboot for anything else. Not expected to return under normal
    /// operation; if the platform call itself fails, the module is left
    /// uninitialized and the caller gets [`PmError::SetFailure`].
    pub fn reset(&self, state: PowerState) -> Result<(), PmError> {
        let mut slot = self.worker.lock().map_err(|_| PmError::SetFailure)?;
        let worker = slot.take().ok_or(PmError::NotInitialized)?;
        worker.stop_and_join()?;
        drop(slot);

        self.platform.sync();
        let result = match state {
            PowerState::Off => self.platform.power_off(),
            _ => self.platform.reboot(),
        };
        result.map_err(|err| {
            error!("platform power-cycle for {state:?} failed: {err}");
            PmError::SetFailure
        })
    }

    /// Daemon-facing variant of [`reset`](Self::reset) taking the raw
    /// state value.
    pub fn reset_raw(&self, raw: u32) -> Result<(), PmError> {
        if !self.is_initialized() {
            return Err(PmError::NotInitialized);
        }
        let state =
            PowerState::from_u32(raw).ok_or(PmError::InvalidArgument)?;
        self.reset(state)
    }

    /// Wake-up source configuration is not implemented on the reference
    /// platform; this validates the call and reports as much.
    pub fn set_wakeup_source(
        &self,
        _source: WakeupSource,
        _enable: bool,
    ) -> Result<(), PmError> {
        if !self.is_initialized() {
            return Err(PmError::NotInitialized);
        }
        Err(PmError::OperationNotSupported)
    }

    /// Daemon-facing variant of
    /// [`set_wakeup_source`](Self::set_wakeup_source).
    pub fn set_wakeup_source_raw(
        &self,
        raw: u32,
        enable: bool,
    ) -> Result<(), PmError> {
        if !self.is_initialized() {
            return Err(PmError::NotInitialized);
        }
        let source =
            WakeupSource::from_u32(raw).ok_or(PmError::InvalidArgument)?;
        self.set_wakeup_source(source, enable)
    }

    /// Counterpart to [`set_wakeup_source`](Self::set_wakeup_source);
    /// equally unsupported here.
    pub fn get_wakeup_source(
        &self,
        _source: WakeupSource,
    ) -> Result<bool, PmError> {
        if !self.is_initialized() {
            return Err(PmError::NotInitialized);
        }
        Err(PmError::OperationNotSupported)
    }
}

impl Drop for PowerManager {
    fn drop(&mut self) {
        // The owner may drop without terminating; the worker must not
        // outlive the manager.
        if let Ok(mut slot) = self.worker.lock() {
            if let Some(worker) = slot.take() {
                let _ = worker.stop_and_join();
            }
        }
    }
}

impl Worker {
    fn stop_and_join(self) -> Result<(), PmError> {
        {
            // A poisoned mailbox means the worker panicked. We still clear
            // the flag so the join below cannot hang, and let the join
            // report the panic.
            let mut mailbox = self
                .shared
                .mailbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            mailbox.running = false;
        }
        self.wake();
        self.handle.join().map_err(|_| PmError::TermFailure)
    }

    fn wake(&self) {
        self.shared.wake.notify_one();
    }
}

fn post(worker: &Worker, state: PowerState) -> Result<(), PmError> {
    {
        let mut mailbox = worker
            .shared
            .mailbox
            .lock()
            .map_err(|_| PmError::SetFailure)?;
        mailbox.target = state;
        mailbox.pending = true;
    }
    worker.wake();
    Ok(())
}

/// The worker: waits for a poke, re-reads the target, performs the side
/// effect, repeats. Exits when the running flag is cleared — checked before
/// the pending slot, so a terminate that races a pending transition wins
/// and the transition is dropped on the floor. A transition already being
/// applied, on the other hand, runs to completion; there is no
/// mid-transition cancellation.
fn worker_loop(
    shared: &Shared,
    governor: &GovernorFile,
    platform: &dyn PlatformControl,
) {
    loop {
        let target = {
            let mut mailbox = match shared.mailbox.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            loop {
                if !mailbox.running {
                    return;
                }
                if mailbox.pending {
                    break;
                }
                mailbox = match shared.wake.wait(mailbox) {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
            }
            mailbox.pending = false;
            mailbox.target
            // Lock dropped here; the dispatch below does file I/O.
        };

        match target {
            PowerState::Off => {
                info!("powering off");
                platform.sync();
                if let Err(err) = platform.power_off() {
                    error!("power-off failed: {err}");
                }
            }
            state => {
                // Total for every state but Off, which is handled above.
                if let Some(wanted) = state.governor() {
                    info!("state {state:?}: selecting {wanted} governor");
                    if let Err(err) = governor.write(wanted) {
                        // The set call has already returned; a missed
                        // governor write is logged and must not take the
                        // worker down.
                        warn!(
                            "governor write for {state:?} failed: {err}"
                        );
                    }
                }
            }
        }
        platform.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    enum Event {
        Sync,
        PowerOff,
        Reboot,
    }

    /// Records power-cycle calls instead of terminating the test process.
    #[derive(Clone, Default)]
    struct FakePlatform {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl FakePlatform {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn saw(&self, event: Event) -> bool {
            self.events().contains(&event)
        }

        fn push(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl PlatformControl for FakePlatform {
        fn power_off(&self) -> io::Result<()> {
            self.push(Event::PowerOff);
            Ok(())
        }

        fn reboot(&self) -> io::Result<()> {
            self.push(Event::Reboot);
            Ok(())
        }

        fn sync(&self) {
            self.push(Event::Sync);
        }
    }

    struct Rig {
        _dir: TempDir,
        governor_path: PathBuf,
        platform: FakePlatform,
        mgr: PowerManager,
    }

    fn rig() -> Rig {
        let dir = TempDir::new().unwrap();
        let governor_path = dir.path().join("scaling_governor");
        fs::write(&governor_path, "ondemand\n").unwrap();
        let platform = FakePlatform::default();
        let config = PlatformConfig {
            scaling_governor_path: governor_path.clone(),
            ..PlatformConfig::default()
        };
        let mgr =
            PowerManager::with_platform(&config, Arc::new(platform.clone()));
        Rig {
            _dir: dir,
            governor_path,
            platform,
            mgr,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            if Instant::now() > deadline {
                panic!("timed out waiting for worker");
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn wait_for_governor(path: &Path, token: &str) {
        wait_until(|| {
            fs::read_to_string(path).map(|s| s == token).unwrap_or(false)
        });
    }

    #[test]
    fn set_then_get_reflects_request() {
        let rig = rig();
        rig.mgr.init().unwrap();

        for state in [
            PowerState::Standby,
            PowerState::On,
            PowerState::StandbyLightSleep,
            PowerState::StandbyDeepSleep,
        ] {
            rig.mgr.set_power_state(state).unwrap();
            assert_eq!(rig.mgr.get_power_state().unwrap(), state);
        }

        rig.mgr.terminate().unwrap();
    }

    #[test]
    fn resting_state_is_on_with_no_governor_write() {
        let rig = rig();
        rig.mgr.init().unwrap();

        assert_eq!(rig.mgr.get_power_state().unwrap(), PowerState::On);
        // Init performs no transition on the worker's behalf.
        assert_eq!(
            fs::read_to_string(&rig.governor_path).unwrap(),
            "ondemand\n"
        );
        assert_eq!(rig.platform.events(), vec![]);

        rig.mgr.terminate().unwrap();
    }

    #[test]
    fn calls_before_init_are_rejected() {
        let rig = rig();

        assert_eq!(
            rig.mgr.get_power_state(),
            Err(PmError::NotInitialized)
        );
        assert_eq!(
            rig.mgr.set_power_state(PowerState::On),
            Err(PmError::NotInitialized)
        );
        assert_eq!(rig.mgr.terminate(), Err(PmError::NotInitialized));
        assert_eq!(
            rig.mgr.reset(PowerState::Off),
            Err(PmError::NotInitialized)
        );
        assert_eq!(
            rig.mgr.set_wakeup_source(WakeupSource::Ir, true),
            Err(PmError::NotInitialized)
        );
    }

    #[test]
    fn invalid_raw_state_does_not_disturb_recorded_state() {
        let rig = rig();
        rig.mgr.init().unwrap();

        rig.mgr.set_power_state(PowerState::Standby).unwrap();
        assert_eq!(
            rig.mgr.set_power_state_raw(99),
            Err(PmError::InvalidArgument)
        );
        assert_eq!(
            rig.mgr.get_power_state().unwrap(),
            PowerState::Standby
        );

        rig.mgr.terminate().unwrap();
    }

    #[test]
    fn double_init_is_rejected() {
        let rig = rig();
        rig.mgr.init().unwrap();
        assert_eq!(rig.mgr.init(), Err(PmError::AlreadyInitialized));

        rig.mgr.terminate().unwrap();
        // Termination completed; the lifecycle is allowed to start over.
        rig.mgr.init().unwrap();
        rig.mgr.terminate().unwrap();
        assert_eq!(rig.mgr.terminate(), Err(PmError::NotInitialized));
    }

    #[test]
    fn terminate_tears_down_the_module() {
        let rig = rig();
        rig.mgr.init().unwrap();
        rig.mgr.terminate().unwrap();

        assert!(!rig.mgr.is_initialized());
        assert_eq!(
            rig.mgr.get_power_state(),
            Err(PmError::NotInitialized)
        );
        assert_eq!(
            rig.mgr.set_power_state(PowerState::On),
            Err(PmError::NotInitialized)
        );
    }

    #[test]
    fn standby_applies_powersave() {
        let rig = rig();
        rig.mgr.init().unwrap();

        rig.mgr.set_power_state(PowerState::Standby).unwrap();
        wait_for_governor(&rig.governor_path, "powersave");

        rig.mgr.terminate().unwrap();
    }

    #[test]
    fn deep_sleep_applies_conservative() {
        let rig = rig();
        rig.mgr.init().unwrap();

        rig.mgr
            .set_power_state(PowerState::StandbyDeepSleep)
            .unwrap();
        wait_for_governor(&rig.governor_path, "conservative");

        rig.mgr.terminate().unwrap();
    }

    #[test]
    fn coalesced_sets_apply_the_last_target() {
        let rig = rig();
        rig.mgr.init().unwrap();

        // Two sets with no scheduling delay between them: the mailbox is a
        // one-element overwrite buffer, so the worker is allowed to apply
        // Standby then On, or just On — but never a stale Standby after On
        // was recorded. Either way the file must end up at On's governor.
        rig.mgr.set_power_state(PowerState::Standby).unwrap();
        rig.mgr.set_power_state(PowerState::On).unwrap();

        wait_for_governor(&rig.governor_path, "performance");
        rig.mgr.terminate().unwrap();

        assert_eq!(
            fs::read_to_string(&rig.governor_path).unwrap(),
            "performance"
        );
    }

    #[test]
    fn off_powers_down_without_touching_the_governor() {
        let rig = rig();
        rig.mgr.init().unwrap();

        rig.mgr.set_power_state(PowerState::Off).unwrap();
        wait_until(|| rig.platform.saw(Event::PowerOff));

        // Disk writes are flushed before the power-off is requested.
        let events = rig.platform.events();
        assert_eq!(events[..2], [Event::Sync, Event::PowerOff]);
        assert_eq!(
            fs::read_to_string(&rig.governor_path).unwrap(),
            "ondemand\n"
        );

        rig.mgr.terminate().unwrap();
    }

    #[test]
    fn reset_to_off_powers_off() {
        let rig = rig();
        rig.mgr.init().unwrap();

        rig.mgr.reset(PowerState::Off).unwrap();
        assert!(rig.platform.saw(Event::PowerOff));
        assert!(!rig.platform.saw(Event::Reboot));
        // The worker was stopped before the power-off was issued.
        assert_eq!(
            rig.mgr.get_power_state(),
            Err(PmError::NotInitialized)
        );
    }

    #[test]
    fn reset_to_any_other_state_reboots() {
        let rig = rig();
        rig.mgr.init().unwrap();

        rig.mgr.reset(PowerState::On).unwrap();
        assert!(rig.platform.saw(Event::Reboot));
        assert!(!rig.platform.saw(Event::PowerOff));
        assert!(!rig.mgr.is_initialized());
    }

    #[test]
    fn reset_raw_validates_the_state() {
        let rig = rig();
        rig.mgr.init().unwrap();

        assert_eq!(rig.mgr.reset_raw(99), Err(PmError::InvalidArgument));
        // The invalid reset changed nothing.
        assert!(rig.mgr.is_initialized());
        assert!(!rig.platform.saw(Event::Reboot));

        rig.mgr.terminate().unwrap();
    }

    #[test]
    fn init_fails_when_control_file_is_inaccessible() {
        let dir = TempDir::new().unwrap();
        let config = PlatformConfig {
            scaling_governor_path: dir.path().join("nope"),
            ..PlatformConfig::default()
        };
        let platform = FakePlatform::default();
        let mgr =
            PowerManager::with_platform(&config, Arc::new(platform.clone()));

        assert_eq!(mgr.init(), Err(PmError::InitFailure));
        // No worker was created and the module stayed uninitialized.
        assert!(!mgr.is_initialized());
        assert_eq!(mgr.get_power_state(), Err(PmError::NotInitialized));
        assert_eq!(platform.events(), vec![]);
    }

    #[test]
    fn governor_write_failure_is_invisible_and_nonfatal() {
        let rig = rig();
        rig.mgr.init().unwrap();

        // Yank the control file out from under the worker. The set still
        // reports success — the caller has no way to observe the worker's
        // failure — and the worker must survive it.
        fs::remove_file(&rig.governor_path).unwrap();
        rig.mgr.set_power_state(PowerState::Standby).unwrap();

        // Sync runs after every attempted transition, so one new sync event
        // tells us the worker processed the doomed write and kept going.
        wait_until(|| rig.platform.saw(Event::Sync));

        fs::write(&rig.governor_path, "ondemand\n").unwrap();
        rig.mgr.set_power_state(PowerState::On).unwrap();
        wait_for_governor(&rig.governor_path, "performance");

        rig.mgr.terminate().unwrap();
    }

    #[test]
    fn wakeup_sources_are_unsupported() {
        let rig = rig();
        rig.mgr.init().unwrap();

        assert_eq!(
            rig.mgr.set_wakeup_source(WakeupSource::Voice, true),
            Err(PmError::OperationNotSupported)
        );
        assert_eq!(
            rig.mgr.get_wakeup_source(WakeupSource::Lan),
            Err(PmError::OperationNotSupported)
        );
        assert_eq!(
            rig.mgr.set_wakeup_source_raw(99, true),
            Err(PmError::InvalidArgument)
        );

        rig.mgr.terminate().unwrap();
    }

    #[test]
    fn drop_joins_the_worker() {
        let rig = rig();
        rig.mgr.init().unwrap();
        rig.mgr.set_power_state(PowerState::Standby).unwrap();
        // Dropping the rig (and the manager in it) must not leak or hang on
        // the worker thread.
        drop(rig);
    }

    #[test]
    fn concurrent_setters_leave_a_valid_target() {
        let rig = rig();
        rig.mgr.init().unwrap();
        let mgr = Arc::new(rig.mgr);

        let threads = (0..8usize)
            .map(|tid| {
                let mgr = Arc::clone(&mgr);
                thread::spawn(move || {
                    let states = [
                        PowerState::Standby,
                        PowerState::On,
                        PowerState::StandbyLightSleep,
                        PowerState::StandbyDeepSleep,
                    ];
                    for i in 0..64 {
                        let state = states[(tid + i) % states.len()];
                        mgr.set_power_state(state).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();
        for t in threads {
            t.join().unwrap();
        }

        // Whatever interleaving happened, the recorded target is one of the
        // requested states and the module still works.
        let last = mgr.get_power_state().unwrap();
        assert_ne!(last, PowerState::Off);
        mgr.terminate().unwrap();
    }
}
