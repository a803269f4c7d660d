//! Per-process aggregation.
//!
//! Each refresh lists the running user-facing applications, joins them with
//! one batch of `ps` output (`pid user %cpu`), replaces the process list
//! wholesale, and appends a Top-N + "Others" snapshot to a bounded history.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::MonitorConfig;
use crate::history::TrailingWindow;
use crate::platform::HostPlatform;
use crate::platform::helpers::{current_user, run_command};

/// Label of the aggregate bucket for everything outside the top N.
pub const OTHERS_LABEL: &str = "Others";

/// A running application as reported by the platform's app listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppEntry {
    pub pid: u32,
    pub name: String,
    pub bundle_id: Option<String>,
    /// Path of the application bundle or executable, for icon lookup.
    pub icon_path: Option<String>,
}

/// One row of `ps -A -o pid=,user=,%cpu=`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessUsage {
    pub user: String,
    pub cpu_percent: f64,
}

/// Joined view of an application and its CPU usage for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub owning_user: String,
    pub cpu_percent: f64,
    pub bundle_id: Option<String>,
    pub icon_path: Option<String>,
}

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// One bar of a process history snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppUsage {
    pub name: String,
    pub cpu_percent: f64,
    pub color: Rgb,
}

/// Top-N usage at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessHistorySnapshot {
    pub id: uuid::Uuid,
    pub timestamp_unix_ms: u64,
    pub apps: Vec<AppUsage>,
}

// ---------------------------------------------------------------------------
// ps accessory
// ---------------------------------------------------------------------------

/// Parse `pid user %cpu` lines. Lines that are not exactly three tokens, or
/// whose pid / %cpu do not parse, are skipped.
pub fn parse_ps_output(output: &str) -> HashMap<u32, ProcessUsage> {
    let mut map = HashMap::new();
    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [pid, user, cpu] = tokens.as_slice() else {
            continue;
        };
        let (Ok(pid), Ok(cpu_percent)) = (pid.parse::<u32>(), cpu.parse::<f64>()) else {
            continue;
        };
        map.insert(
            pid,
            ProcessUsage {
                user: (*user).to_string(),
                cpu_percent,
            },
        );
    }
    map
}

/// One batch call to `ps` for every process. Empty on failure.
pub fn query_ps(timeout: Duration) -> HashMap<u32, ProcessUsage> {
    run_command("ps", &["-A", "-o", "pid=,user=,%cpu="], timeout)
        .map(|out| parse_ps_output(&out))
        .unwrap_or_default()
}

/// Join apps with usage by pid and sort by name.
///
/// Apps missing from the `ps` batch (exited in between) are kept with 0% and
/// the current user as owner.
pub fn join_usage(apps: Vec<AppEntry>, usage: &HashMap<u32, ProcessUsage>) -> Vec<ProcessRecord> {
    let fallback_user = current_user();
    let mut records: Vec<ProcessRecord> = apps
        .into_iter()
        .map(|app| {
            let (owning_user, cpu_percent) = match usage.get(&app.pid) {
                Some(u) => (u.user.clone(), u.cpu_percent),
                None => (fallback_user.clone(), 0.0),
            };
            ProcessRecord {
                pid: app.pid,
                name: app.name,
                owning_user,
                cpu_percent,
                bundle_id: app.bundle_id,
                icon_path: app.icon_path,
            }
        })
        .collect();
    records.sort_by(|a, b| a.name.cmp(&b.name).then(a.pid.cmp(&b.pid)));
    records
}

// ---------------------------------------------------------------------------
// Top-N + Others
// ---------------------------------------------------------------------------

/// The `top_n` records by CPU%, then an "Others" bucket holding the sum of
/// the rest when that sum exceeds `others_threshold`.
pub fn top_usage(records: &[ProcessRecord], top_n: usize, others_threshold: f64) -> Vec<AppUsage> {
    let mut sorted: Vec<&ProcessRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        b.cpu_percent
            .total_cmp(&a.cpu_percent)
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut apps: Vec<AppUsage> = sorted
        .iter()
        .take(top_n)
        .map(|r| AppUsage {
            name: r.name.clone(),
            cpu_percent: r.cpu_percent,
            color: stable_color(&r.name),
        })
        .collect();

    let others: f64 = sorted.iter().skip(top_n).map(|r| r.cpu_percent).sum();
    if others > others_threshold {
        apps.push(AppUsage {
            name: OTHERS_LABEL.to_string(),
            cpu_percent: others,
            color: stable_color(OTHERS_LABEL),
        });
    }
    apps
}

/// Deterministic color for a name: same name, same color, every run.
///
/// Hue comes from the name's SHA-256 digest; saturation and brightness vary
/// slightly so neighbouring hues stay distinguishable. "Others" is gray.
pub fn stable_color(name: &str) -> Rgb {
    if name == OTHERS_LABEL {
        return Rgb {
            r: 128,
            g: 128,
            b: 128,
        };
    }
    let digest = Sha256::digest(name.as_bytes());
    let word = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let hue = f64::from(word % 360) / 360.0;
    let saturation = 0.7 + f64::from(digest[4] % 30) / 100.0;
    let brightness = 0.8 + f64::from(digest[5] % 20) / 100.0;
    hsb_to_rgb(hue, saturation, brightness)
}

fn hsb_to_rgb(h: f64, s: f64, v: f64) -> Rgb {
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    let (r, g, b) = match sector as i64 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    let to_u8 = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb {
        r: to_u8(r),
        g: to_u8(g),
        b: to_u8(b),
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Published result of one process refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessTelemetry {
    pub processes: Vec<ProcessRecord>,
    pub history: Vec<ProcessHistorySnapshot>,
}

pub struct ProcessAggregator {
    platform: Arc<dyn HostPlatform>,
    top_n: usize,
    others_threshold: f64,
    processes: Vec<ProcessRecord>,
    history: TrailingWindow<ProcessHistorySnapshot>,
}

impl ProcessAggregator {
    pub fn new(platform: Arc<dyn HostPlatform>, config: &MonitorConfig) -> Self {
        Self {
            platform,
            top_n: config.top_n,
            others_threshold: config.others_threshold,
            processes: Vec::new(),
            history: TrailingWindow::new(config.process_history_capacity),
        }
    }

    /// List apps, join `ps` usage, replace the list, append a snapshot.
    pub fn refresh(&mut self) {
        let apps = self.platform.running_apps();
        let usage = self.platform.process_usage();
        self.processes = join_usage(apps, &usage);

        let snapshot = ProcessHistorySnapshot {
            id: uuid::Uuid::new_v4(),
            timestamp_unix_ms: unix_millis(),
            apps: top_usage(&self.processes, self.top_n, self.others_threshold),
        };
        log::trace!(
            "process refresh: {} apps, {} in snapshot",
            self.processes.len(),
            snapshot.apps.len()
        );
        self.history.push(snapshot);
    }

    pub fn processes(&self) -> &[ProcessRecord] {
        &self.processes
    }

    pub fn latest_snapshot(&self) -> Option<&ProcessHistorySnapshot> {
        self.history.latest()
    }

    pub fn publish(&self) -> ProcessTelemetry {
        ProcessTelemetry {
            processes: self.processes.clone(),
            history: self.history.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, cpu: f64) -> ProcessRecord {
        ProcessRecord {
            pid: 1,
            name: name.to_string(),
            owning_user: "u".to_string(),
            cpu_percent: cpu,
            bundle_id: None,
            icon_path: None,
        }
    }

    // -----------------------------------------------------------------------
    // ps parsing
    // -----------------------------------------------------------------------

    #[test]
    fn parses_three_field_lines() {
        let out = "  1 root   0.0\n 501 alice 12.5\n";
        let map = parse_ps_output(out);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&501].user, "alice");
        assert!((map[&501].cpu_percent - 12.5).abs() < 1e-9);
    }

    #[test]
    fn skips_malformed_lines() {
        let out = "\n 12 bob\n 13 carol 1.0 extra\n abc dave 2.0\n 14 erin x\n 15 frank 3.0\n";
        let map = parse_ps_output(out);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&15));
    }

    // -----------------------------------------------------------------------
    // join
    // -----------------------------------------------------------------------

    #[test]
    fn join_sorts_by_name_and_fills_missing() {
        let apps = vec![
            AppEntry {
                pid: 2,
                name: "Safari".into(),
                bundle_id: Some("com.apple.Safari".into()),
                icon_path: None,
            },
            AppEntry {
                pid: 3,
                name: "Finder".into(),
                bundle_id: None,
                icon_path: None,
            },
        ];
        let mut usage = HashMap::new();
        usage.insert(
            2,
            ProcessUsage {
                user: "alice".into(),
                cpu_percent: 7.0,
            },
        );
        let records = join_usage(apps, &usage);
        assert_eq!(records[0].name, "Finder");
        assert_eq!(records[0].cpu_percent, 0.0);
        assert_eq!(records[1].owning_user, "alice");
        assert_eq!(records[1].bundle_id.as_deref(), Some("com.apple.Safari"));
    }

    // -----------------------------------------------------------------------
    // Top-N
    // -----------------------------------------------------------------------

    #[test]
    fn top_five_plus_others() {
        let records: Vec<ProcessRecord> = [40.0, 25.0, 15.0, 10.0, 5.0, 3.0, 2.0]
            .iter()
            .enumerate()
            .map(|(i, &c)| record(&format!("app{i}"), c))
            .collect();
        let top = top_usage(&records, 5, 0.1);
        assert_eq!(top.len(), 6);
        let values: Vec<f64> = top.iter().map(|a| a.cpu_percent).collect();
        assert_eq!(values, vec![40.0, 25.0, 15.0, 10.0, 5.0, 5.0]);
        assert_eq!(top[5].name, OTHERS_LABEL);
    }

    #[test]
    fn others_omitted_below_threshold() {
        let records: Vec<ProcessRecord> = [9.0, 8.0, 7.0, 6.0, 5.0, 0.05]
            .iter()
            .enumerate()
            .map(|(i, &c)| record(&format!("app{i}"), c))
            .collect();
        let top = top_usage(&records, 5, 0.1);
        assert_eq!(top.len(), 5);
        assert!(top.iter().all(|a| a.name != OTHERS_LABEL));
    }

    #[test]
    fn fewer_than_n_records() {
        let records = vec![record("a", 1.0), record("b", 3.0)];
        let top = top_usage(&records, 5, 0.1);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "b");
    }

    // -----------------------------------------------------------------------
    // colors
    // -----------------------------------------------------------------------

    #[test]
    fn color_is_stable() {
        assert_eq!(stable_color("Safari"), stable_color("Safari"));
        assert_ne!(stable_color("Safari"), stable_color("Mail"));
    }

    #[test]
    fn others_is_gray() {
        let c = stable_color(OTHERS_LABEL);
        assert_eq!((c.r, c.g, c.b), (128, 128, 128));
        assert_eq!(c.to_string(), "#808080");
    }

    #[test]
    fn hsb_primary_hues() {
        assert_eq!(hsb_to_rgb(0.0, 1.0, 1.0), Rgb { r: 255, g: 0, b: 0 });
        assert_eq!(hsb_to_rgb(0.5, 1.0, 1.0), Rgb { r: 0, g: 255, b: 255 });
    }

    // -----------------------------------------------------------------------
    // aggregator
    // -----------------------------------------------------------------------

    struct FixedApps;

    impl HostPlatform for FixedApps {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn running_apps(&self) -> Vec<AppEntry> {
            vec![AppEntry {
                pid: 42,
                name: "Editor".into(),
                bundle_id: None,
                icon_path: None,
            }]
        }
        fn process_usage(&self) -> HashMap<u32, ProcessUsage> {
            let mut m = HashMap::new();
            m.insert(
                42,
                ProcessUsage {
                    user: "dev".into(),
                    cpu_percent: 3.5,
                },
            );
            m
        }
    }

    #[test]
    fn history_is_bounded() {
        let config = MonitorConfig::default();
        let mut agg = ProcessAggregator::new(Arc::new(FixedApps), &config);
        for _ in 0..25 {
            agg.refresh();
        }
        let published = agg.publish();
        assert_eq!(published.history.len(), config.process_history_capacity);
        assert_eq!(published.processes.len(), 1);
        assert_eq!(published.processes[0].owning_user, "dev");
        let ids: std::collections::HashSet<_> = published.history.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), published.history.len());
    }
}
