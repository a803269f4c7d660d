//! Privileged power/frequency sampling.
//!
//! Lifecycle: `Idle → Requesting → Granted → (Sampling ⇄ DecodeCycle) → Stopped`,
//! with `Requesting → Idle` when elevation fails and `Requesting → Stopped`
//! when the session is stopped while the prompt is open. The sampler daemon
//! is started once through a [`PrivilegedLauncher`] and then runs on its own;
//! decoding its output file happens on a dedicated worker thread fed by
//! [`PrivilegedSampleSource::trigger_decode`], so the host cadence never waits
//! on file I/O.

pub mod decoder;
pub mod launcher;
pub mod plist;
pub mod tail;

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};

pub use decoder::{ClusterKind, ClusterSample, DecodeError, PowerSample};
pub use launcher::{LaunchError, PrivilegedLauncher, SamplerCommand};

use crate::config::SamplerConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Requesting,
    Granted,
    Sampling,
    DecodeCycle,
    Stopped,
}

impl SessionState {
    /// A session is active from the elevation request until it is stopped.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Requesting | Self::Granted | Self::Sampling | Self::DecodeCycle
        )
    }
}

/// Published status of the privileged session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegedSession {
    pub state: SessionState,
    pub granted: bool,
    pub daemon_pid: Option<u32>,
    /// Last elevation or termination error.
    pub last_error: Option<String>,
    pub last_decode_error: Option<String>,
    pub decoded_count: u64,
    pub decode_failures: u64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Session status and latest decoded sample, shared with the telemetry store.
#[derive(Debug, Default)]
pub struct PowerSlot {
    session: Mutex<PrivilegedSession>,
    sample: Mutex<Option<PowerSample>>,
}

impl PowerSlot {
    pub fn session(&self) -> PrivilegedSession {
        lock(&self.session).clone()
    }

    pub fn sample(&self) -> Option<PowerSample> {
        lock(&self.sample).clone()
    }

    fn update_session<R>(&self, f: impl FnOnce(&mut PrivilegedSession) -> R) -> R {
        f(&mut lock(&self.session))
    }

    /// One decode cycle against `path`.
    ///
    /// A missing or malformed document leaves the previous sample in place.
    /// Returns whether a new sample was published.
    pub fn run_decode(&self, path: &Path) -> bool {
        let entered = self.update_session(|s| {
            if s.state == SessionState::Sampling {
                s.state = SessionState::DecodeCycle;
                true
            } else {
                false
            }
        });

        let result = decoder::decode_file(path);
        let published = match result {
            Ok(Some(sample)) => {
                *lock(&self.sample) = Some(sample);
                self.update_session(|s| {
                    s.decoded_count += 1;
                    s.last_decode_error = None;
                });
                true
            }
            Ok(None) => false,
            Err(e) => {
                log::warn!("power sample decode failed, keeping previous sample: {e}");
                self.update_session(|s| {
                    s.decode_failures += 1;
                    s.last_decode_error = Some(e.to_string());
                });
                false
            }
        };

        if entered {
            self.update_session(|s| {
                if s.state == SessionState::DecodeCycle {
                    s.state = SessionState::Sampling;
                }
            });
        }
        published
    }
}

struct DecodeWorker {
    tx: SyncSender<()>,
    handle: JoinHandle<()>,
}

impl DecodeWorker {
    fn spawn(slot: Arc<PowerSlot>, path: PathBuf) -> std::io::Result<Self> {
        // One pending request at most; extra triggers coalesce.
        let (tx, rx) = mpsc::sync_channel::<()>(1);
        let handle = thread::Builder::new()
            .name("liquidmon-decode".into())
            .spawn(move || {
                while rx.recv().is_ok() {
                    let outcome =
                        std::panic::catch_unwind(AssertUnwindSafe(|| slot.run_decode(&path)));
                    if outcome.is_err() {
                        log::warn!("decode worker recovered from a panic");
                    }
                }
            })?;
        Ok(Self { tx, handle })
    }

    fn shutdown(self) {
        drop(self.tx);
        if self.handle.join().is_err() {
            log::warn!("decode worker exited abnormally");
        }
    }
}

/// Owner of the privileged session: elevation, daemon pid, decode worker.
pub struct PrivilegedSampleSource {
    command: SamplerCommand,
    launcher: Box<dyn PrivilegedLauncher>,
    slot: Arc<PowerSlot>,
    worker: Mutex<Option<DecodeWorker>>,
}

impl PrivilegedSampleSource {
    pub fn new(config: &SamplerConfig, launcher: Box<dyn PrivilegedLauncher>) -> Self {
        Self::with_slot(config, launcher, Arc::new(PowerSlot::default()))
    }

    /// Use an existing slot, typically the one owned by the telemetry store.
    pub fn with_slot(
        config: &SamplerConfig,
        launcher: Box<dyn PrivilegedLauncher>,
        slot: Arc<PowerSlot>,
    ) -> Self {
        Self {
            command: SamplerCommand::from_config(config),
            launcher,
            slot,
            worker: Mutex::new(None),
        }
    }

    pub fn slot(&self) -> Arc<PowerSlot> {
        Arc::clone(&self.slot)
    }

    pub fn command(&self) -> &SamplerCommand {
        &self.command
    }

    pub fn session(&self) -> PrivilegedSession {
        self.slot.session()
    }

    pub fn is_sampling(&self) -> bool {
        matches!(
            self.slot.session().state,
            SessionState::Sampling | SessionState::DecodeCycle
        )
    }

    /// Prompt for elevation and start the sampler.
    ///
    /// On any error the session returns to `Idle` with the error recorded.
    /// There is no automatic retry. If [`stop`](Self::stop) runs while the
    /// prompt is open, the freshly started sampler is killed and the call
    /// fails with [`LaunchError::Cancelled`].
    pub fn request_access(&self) -> Result<u32, LaunchError> {
        let admitted = self.slot.update_session(|s| {
            if s.state.is_active() {
                return false;
            }
            s.state = SessionState::Requesting;
            s.last_error = None;
            true
        });
        if !admitted {
            return Err(LaunchError::AlreadyActive);
        }

        // The prompt can take as long as the user does; no locks held here.
        let launched = self.launcher.launch(&self.command);
        let pid = match launched {
            Ok(pid) => pid,
            Err(e) => {
                log::warn!("privileged sampler not started: {e}");
                self.slot.update_session(|s| {
                    if s.state == SessionState::Requesting {
                        s.state = SessionState::Idle;
                    }
                    s.granted = false;
                    s.daemon_pid = None;
                    s.last_error = Some(e.to_string());
                });
                return Err(e);
            }
        };

        // The worker is installed before the session commits so that a
        // concurrent stop() always finds it.
        let worker_error = match DecodeWorker::spawn(self.slot(), self.command.stdout_path.clone())
        {
            Ok(worker) => {
                if let Some(stale) = lock(&self.worker).replace(worker) {
                    stale.shutdown();
                }
                None
            }
            Err(e) => {
                log::warn!("could not start decode worker: {e}");
                Some(format!("decode worker: {e}"))
            }
        };

        // stop() may have run while the prompt was open; it wins.
        let committed = self.slot.update_session(|s| {
            if s.state != SessionState::Requesting {
                return false;
            }
            s.state = if worker_error.is_some() {
                SessionState::Granted
            } else {
                SessionState::Sampling
            };
            s.granted = true;
            s.daemon_pid = Some(pid);
            if worker_error.is_some() {
                s.last_error = worker_error.clone();
            }
            true
        });

        if !committed {
            log::info!("session stopped during elevation, killing sampler pid {pid}");
            if let Some(worker) = lock(&self.worker).take() {
                worker.shutdown();
            }
            if let Err(e) = self.launcher.terminate(pid) {
                log::warn!("{e}");
                self.slot.update_session(|s| s.last_error = Some(e.to_string()));
            }
            return Err(LaunchError::Cancelled);
        }

        log::info!("privileged sampler running as pid {pid}");
        Ok(pid)
    }

    /// Queue a decode cycle without blocking. Dropped if one is already queued.
    pub fn trigger_decode(&self) {
        if !self.is_sampling() {
            return;
        }
        if let Some(worker) = lock(&self.worker).as_ref() {
            match worker.tx.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => {}
                Err(TrySendError::Disconnected(())) => {
                    log::debug!("decode worker is gone");
                }
            }
        }
    }

    /// Decode on the calling thread.
    pub fn decode_now(&self) -> bool {
        self.slot.run_decode(&self.command.stdout_path)
    }

    /// Kill the sampler (best effort) and reset the session.
    ///
    /// The session ends up `Stopped` and not granted even when the kill fails.
    /// A request still waiting on its elevation prompt is cancelled.
    pub fn stop(&self) {
        let pid = self.slot.update_session(|s| {
            s.state = SessionState::Stopped;
            s.granted = false;
            s.daemon_pid.take()
        });

        if let Some(worker) = lock(&self.worker).take() {
            worker.shutdown();
        }

        if let Some(pid) = pid {
            match self.launcher.terminate(pid) {
                Ok(()) => log::info!("stopped privileged sampler pid {pid}"),
                Err(e) => {
                    log::warn!("{e}");
                    self.slot.update_session(|s| s.last_error = Some(e.to_string()));
                }
            }
        }
    }
}

impl Drop for PrivilegedSampleSource {
    fn drop(&mut self) {
        let running = self.slot.session().daemon_pid.is_some();
        if running || lock(&self.worker).is_some() {
            self.stop();
        }
    }
}
