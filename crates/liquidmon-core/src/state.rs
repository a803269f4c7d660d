//! Shared telemetry state.
//!
//! One slot per producer: the host task writes `host`, the process task writes
//! `processes`, the battery task writes `battery`, and the privileged source
//! owns `power`. Each write replaces the slot's value under its own lock, so a
//! reader never sees a half-updated slot. [`TelemetryStore::snapshot`] copies
//! every slot out for presentation.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::platform::BatteryStatus;
use crate::power::{PowerSample, PowerSlot, PrivilegedSession};
use crate::processes::{ProcessTelemetry, unix_millis};
use crate::sampler::HostTelemetry;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct TelemetryStore {
    host: Mutex<HostTelemetry>,
    processes: Mutex<ProcessTelemetry>,
    battery: Mutex<Option<BatteryStatus>>,
    power: Arc<PowerSlot>,
}

/// Point-in-time copy of all published telemetry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub collected_unix_ms: u64,
    pub host: HostTelemetry,
    pub processes: ProcessTelemetry,
    pub battery: Option<BatteryStatus>,
    pub power_session: PrivilegedSession,
    pub power: Option<PowerSample>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot handed to the privileged source so it can publish directly.
    pub fn power_slot(&self) -> Arc<PowerSlot> {
        Arc::clone(&self.power)
    }

    pub fn publish_host(&self, host: HostTelemetry) {
        *lock(&self.host) = host;
    }

    pub fn publish_processes(&self, processes: ProcessTelemetry) {
        *lock(&self.processes) = processes;
    }

    pub fn publish_battery(&self, battery: Option<BatteryStatus>) {
        *lock(&self.battery) = battery;
    }

    pub fn host(&self) -> HostTelemetry {
        lock(&self.host).clone()
    }

    pub fn processes(&self) -> ProcessTelemetry {
        lock(&self.processes).clone()
    }

    pub fn battery(&self) -> Option<BatteryStatus> {
        *lock(&self.battery)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            collected_unix_ms: unix_millis(),
            host: self.host(),
            processes: self.processes(),
            battery: self.battery(),
            power_session: self.power.session(),
            power: self.power.sample(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::HostStats;

    #[test]
    fn empty_store_snapshot() {
        let store = TelemetryStore::new();
        let snap = store.snapshot();
        assert_eq!(snap.host.stats.cycle, 0);
        assert!(snap.processes.processes.is_empty());
        assert!(snap.battery.is_none());
        assert!(snap.power.is_none());
        assert!(snap.collected_unix_ms > 0);
    }

    #[test]
    fn slots_are_independent() {
        let store = TelemetryStore::new();
        store.publish_host(HostTelemetry {
            stats: HostStats {
                cycle: 7,
                cpu_usage: 33.0,
                ..HostStats::default()
            },
            ..HostTelemetry::default()
        });
        store.publish_battery(Some(BatteryStatus {
            level: 0.5,
            charging: true,
            minutes_remaining: -1,
        }));
        let snap = store.snapshot();
        assert_eq!(snap.host.stats.cycle, 7);
        assert_eq!(snap.battery.map(|b| b.charging), Some(true));
        assert!(snap.processes.history.is_empty());
    }

    #[test]
    fn snapshot_serializes() {
        let store = TelemetryStore::new();
        let json = serde_json::to_string(&store.snapshot()).unwrap();
        assert!(json.contains("\"power_session\""));
        assert!(json.contains("\"state\":\"idle\""));
    }
}
