//! Periodic schedules and their owner.
//!
//! [`PeriodicTask`] runs a closure on a named thread at a fixed interval until
//! it is stopped. Stop is cooperative: the flag is checked between
//! iterations, so in-flight work always completes. [`Monitor`] owns the host,
//! process and battery tasks plus the privileged power source.

use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::MonitorConfig;
use crate::platform::{self, HostPlatform};
use crate::power::launcher::default_launcher;
use crate::power::{LaunchError, PrivilegedLauncher, PrivilegedSampleSource};
use crate::processes::ProcessAggregator;
use crate::sampler::HostSampler;
use crate::state::{TelemetrySnapshot, TelemetryStore};

/// A closure running on its own thread every `interval`.
pub struct PeriodicTask {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Start immediately; the first run happens without delay.
    ///
    /// A panic inside `work` is caught and logged, and the schedule continues.
    pub fn spawn<F>(name: &str, interval: Duration, mut work: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let task_name = name.to_string();

        let handle = thread::Builder::new()
            .name(format!("liquidmon-{name}"))
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    let started = Instant::now();
                    if std::panic::catch_unwind(AssertUnwindSafe(&mut work)).is_err() {
                        log::warn!("{task_name} task panicked; continuing schedule");
                    }
                    let deadline = started + interval;
                    loop {
                        if flag.load(Ordering::Acquire) {
                            return;
                        }
                        let now = Instant::now();
                        if now >= deadline {
                            break;
                        }
                        thread::park_timeout(deadline - now);
                    }
                }
            })?;

        Ok(Self {
            name: name.to_string(),
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal stop, wake the thread, and wait for the current iteration.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::warn!("{} task exited abnormally", self.name);
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns every schedule and the shared store.
pub struct Monitor {
    config: MonitorConfig,
    platform: Arc<dyn HostPlatform>,
    store: Arc<TelemetryStore>,
    power: Arc<PrivilegedSampleSource>,
    tasks: Vec<PeriodicTask>,
}

impl Monitor {
    /// Native platform and the default elevation launcher.
    pub fn new(config: MonitorConfig) -> Self {
        let platform = platform::native(config.command_timeout());
        let launcher = default_launcher(config.sampler.elevation_timeout());
        Self::with_parts(config, platform, launcher)
    }

    pub fn with_parts(
        config: MonitorConfig,
        platform: Arc<dyn HostPlatform>,
        launcher: Box<dyn PrivilegedLauncher>,
    ) -> Self {
        let store = Arc::new(TelemetryStore::new());
        let power = Arc::new(PrivilegedSampleSource::with_slot(
            &config.sampler,
            launcher,
            store.power_slot(),
        ));
        Self {
            config,
            platform,
            store,
            power,
            tasks: Vec::new(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<TelemetryStore> {
        Arc::clone(&self.store)
    }

    pub fn power(&self) -> Arc<PrivilegedSampleSource> {
        Arc::clone(&self.power)
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Start the host, process and battery schedules. No-op when running.
    pub fn start(&mut self) -> io::Result<()> {
        if self.is_running() {
            return Ok(());
        }
        log::info!("starting monitor on {}", self.platform.name());

        let mut host = HostSampler::new(Arc::clone(&self.platform), self.config.history_capacity);
        let store = Arc::clone(&self.store);
        let power = Arc::clone(&self.power);
        let host_task = PeriodicTask::spawn("host", self.config.host_interval(), move || {
            host.refresh();
            store.publish_host(host.publish());
            power.trigger_decode();
        })?;

        let mut aggregator = ProcessAggregator::new(Arc::clone(&self.platform), &self.config);
        let store = Arc::clone(&self.store);
        let process_task =
            PeriodicTask::spawn("processes", self.config.process_interval(), move || {
                aggregator.refresh();
                store.publish_processes(aggregator.publish());
            })?;

        let platform = Arc::clone(&self.platform);
        let store = Arc::clone(&self.store);
        let battery_task =
            PeriodicTask::spawn("battery", self.config.battery_interval(), move || {
                store.publish_battery(platform.battery_status());
            })?;

        self.tasks = vec![host_task, process_task, battery_task];
        Ok(())
    }

    /// Stop every schedule, then the privileged sampler if one is running.
    pub fn stop(&mut self) {
        for mut task in self.tasks.drain(..) {
            task.stop();
        }
        if self.power.session().state.is_active() {
            self.power.stop();
        }
    }

    /// Prompt for elevation and start the power sampler. Blocks on the prompt.
    pub fn enable_power(&self) -> Result<u32, LaunchError> {
        self.power.request_access()
    }

    pub fn disable_power(&self) {
        self.power.stop();
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.store.snapshot()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn task_runs_repeatedly_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut task = PeriodicTask::spawn("count", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        task.stop();
        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop >= 3);
        assert!(!task.is_running());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn stop_wakes_long_interval() {
        let mut task = PeriodicTask::spawn("slow", Duration::from_secs(3600), || {}).unwrap();
        let started = Instant::now();
        task.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn panics_do_not_end_schedule() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut task = PeriodicTask::spawn("panicky", Duration::from_millis(5), move || {
            if c.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first run fails");
            }
        })
        .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        task.stop();
        assert!(count.load(Ordering::SeqCst) >= 2);
    }
}
