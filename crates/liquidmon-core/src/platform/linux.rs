//! Linux host platform backed by procfs and sysfs.
//!
//! Mapping onto the Darwin-shaped counters:
//! - `system` ticks include irq + softirq, `idle` includes iowait.
//! - "wired" memory is `Unevictable`.
//! - Performance levels are the hybrid `cpu_core` / `cpu_atom` PMU cpu lists.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use super::helpers::load_average;
use super::{BatteryStatus, HostPlatform, LoadAverage, MemoryPages};
use crate::counters::TickSnapshot;
use crate::processes::{AppEntry, ProcessUsage, query_ps};
use crate::topology::CpuIdentity;

// ---------------------------------------------------------------------------
// Pure parsers
// ---------------------------------------------------------------------------

fn ticks_from_fields(fields: &[u64]) -> Option<TickSnapshot> {
    let get = |i: usize| fields.get(i).copied().unwrap_or(0);
    if fields.len() < 4 {
        return None;
    }
    // user nice system idle iowait irq softirq
    Some(TickSnapshot::new(
        get(0),
        get(2) + get(5) + get(6),
        get(3) + get(4),
        get(1),
    ))
}

/// Parse `/proc/stat` into the aggregate line and the `cpuN` lines in order.
pub(crate) fn parse_proc_stat(text: &str) -> (Option<TickSnapshot>, Vec<TickSnapshot>) {
    let mut host = None;
    let mut cores = Vec::new();
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        let Some(label) = parts.next() else { continue };
        if !label.starts_with("cpu") {
            continue;
        }
        let fields: Vec<u64> = parts.filter_map(|p| p.parse().ok()).collect();
        let Some(snapshot) = ticks_from_fields(&fields) else {
            continue;
        };
        if label == "cpu" {
            host = Some(snapshot);
        } else {
            cores.push(snapshot);
        }
    }
    (host, cores)
}

/// `/proc/meminfo` values in kB, keyed without the trailing colon.
pub(crate) fn parse_meminfo(text: &str) -> HashMap<String, u64> {
    text.lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let value = rest.split_whitespace().next()?.parse().ok()?;
            Some((key.trim().to_string(), value))
        })
        .collect()
}

/// voluntary + nonvoluntary context switches from `/proc/<pid>/status`.
pub(crate) fn parse_status_switches(text: &str) -> Option<u64> {
    let mut total = None;
    for line in text.lines() {
        if let Some(rest) = line
            .strip_prefix("voluntary_ctxt_switches:")
            .or_else(|| line.strip_prefix("nonvoluntary_ctxt_switches:"))
            && let Ok(v) = rest.trim().parse::<u64>()
        {
            total = Some(total.unwrap_or(0) + v);
        }
    }
    total
}

fn parse_status_uid(text: &str) -> Option<u32> {
    text.lines()
        .find_map(|l| l.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}

/// Count CPUs in a sysfs cpu list such as `0-7,16,18-19`.
pub(crate) fn count_cpu_list(list: &str) -> usize {
    list.trim()
        .split(',')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('-') {
            Some((a, b)) => match (a.parse::<usize>(), b.parse::<usize>()) {
                (Ok(a), Ok(b)) if b >= a => b - a + 1,
                _ => 0,
            },
            None => usize::from(part.parse::<usize>().is_ok()),
        })
        .sum()
}

/// Cache size strings like `48K` or `2048K` or `1M`.
pub(crate) fn parse_cache_size(text: &str) -> Option<u64> {
    let t = text.trim();
    let (digits, mult) = match t.chars().last()? {
        'K' | 'k' => (&t[..t.len() - 1], 1024),
        'M' | 'm' => (&t[..t.len() - 1], 1024 * 1024),
        _ => (t, 1),
    };
    digits.parse::<u64>().ok().map(|v| v * mult)
}

/// Battery state from a `power_supply` uevent-style key map (lowercase keys).
pub(crate) fn battery_from_fields(fields: &HashMap<String, String>) -> Option<BatteryStatus> {
    let num = |k: &str| fields.get(k).and_then(|v| v.trim().parse::<f64>().ok());
    let capacity = num("capacity")?;
    let status = fields.get("status").map(|s| s.trim().to_ascii_lowercase()).unwrap_or_default();
    let charging = status == "charging";

    let minutes_remaining = if status == "discharging" {
        let by_energy = num("energy_now").zip(num("power_now"));
        let by_charge = num("charge_now").zip(num("current_now"));
        by_energy
            .or(by_charge)
            .filter(|(_, rate)| *rate > 0.0)
            .map(|(amount, rate)| (amount / rate * 60.0).round() as i64)
            .unwrap_or(-1)
    } else {
        -1
    };

    Some(BatteryStatus {
        level: (capacity / 100.0).clamp(0.0, 1.0),
        charging,
        minutes_remaining,
    })
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

const POWER_SUPPLY: &str = "/sys/class/power_supply";

fn read(path: impl AsRef<Path>) -> Option<String> {
    fs::read_to_string(path).ok()
}

fn pid_dirs() -> Vec<u32> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().to_str()?.parse::<u32>().ok())
        .collect()
}

fn battery_dir() -> Option<std::path::PathBuf> {
    fs::read_dir(POWER_SUPPLY)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("BAT"))
        })
}

fn battery_fields(dir: &Path) -> HashMap<String, String> {
    ["capacity", "status", "current_now", "charge_now", "energy_now", "power_now"]
        .iter()
        .filter_map(|name| Some((name.to_string(), read(dir.join(name))?)))
        .collect()
}

/// Host platform backed by `/proc` and `/sys`.
pub struct LinuxPlatform {
    timeout: Duration,
}

impl LinuxPlatform {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn meminfo(&self) -> Option<HashMap<String, u64>> {
        read("/proc/meminfo").map(|t| parse_meminfo(&t))
    }
}

impl HostPlatform for LinuxPlatform {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn host_ticks(&self) -> Option<TickSnapshot> {
        parse_proc_stat(&read("/proc/stat")?).0
    }

    fn per_core_ticks(&self) -> Option<Vec<TickSnapshot>> {
        let (_, cores) = parse_proc_stat(&read("/proc/stat")?);
        (!cores.is_empty()).then_some(cores)
    }

    fn perf_level_cpu_count(&self, level: u32) -> Option<usize> {
        let pmu = match level {
            0 => "cpu_core",
            1 => "cpu_atom",
            _ => return None,
        };
        read(format!("/sys/devices/{pmu}/cpus")).map(|list| count_cpu_list(&list))
    }

    fn cpu_identity(&self) -> CpuIdentity {
        let cpuinfo = read("/proc/cpuinfo").unwrap_or_default();
        let mut brand = String::new();
        let mut features = Vec::new();
        let mut cores: HashSet<(String, String)> = HashSet::new();
        let mut physical_id = String::new();

        for line in cpuinfo.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "model name" | "Model" if brand.is_empty() => brand = value.to_string(),
                "flags" | "Features" if features.is_empty() => {
                    features = value.split_whitespace().map(str::to_string).collect();
                }
                "physical id" => physical_id = value.to_string(),
                "core id" => {
                    cores.insert((physical_id.clone(), value.to_string()));
                }
                _ => {}
            }
        }

        let logical_cpus = self.logical_cpu_count();
        let mut identity = CpuIdentity {
            brand,
            logical_cpus,
            physical_cpus: if cores.is_empty() { logical_cpus } else { cores.len() },
            features,
            ..CpuIdentity::default()
        };

        let cache_root = Path::new("/sys/devices/system/cpu/cpu0/cache");
        if let Ok(entries) = fs::read_dir(cache_root) {
            for entry in entries.filter_map(Result::ok) {
                let dir = entry.path();
                let level = read(dir.join("level")).unwrap_or_default();
                let kind = read(dir.join("type")).unwrap_or_default();
                let Some(size) = read(dir.join("size")).and_then(|s| parse_cache_size(&s)) else {
                    continue;
                };
                match (level.trim(), kind.trim()) {
                    ("1", "Data") => identity.l1d_cache_bytes = size,
                    ("2", _) => identity.l2_cache_bytes = size,
                    _ => {}
                }
            }
        }
        identity
    }

    fn total_memory_bytes(&self) -> Option<u64> {
        self.meminfo()?.get("MemTotal").map(|kb| kb * 1024)
    }

    fn memory_pages(&self) -> Option<MemoryPages> {
        let info = self.meminfo()?;
        // SAFETY: sysconf has no preconditions.
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size <= 0 {
            return None;
        }
        let page_size = page_size as u64;
        let pages = |key: &str| info.get(key).map(|kb| kb * 1024 / page_size).unwrap_or(0);
        Some(MemoryPages {
            active: pages("Active"),
            wired: pages("Unevictable"),
            page_size,
        })
    }

    fn load_average(&self) -> Option<LoadAverage> {
        load_average()
    }

    fn uptime(&self) -> Option<Duration> {
        let text = read("/proc/uptime")?;
        let secs: f64 = text.split_whitespace().next()?.parse().ok()?;
        Duration::try_from_secs_f64(secs).ok()
    }

    fn process_count(&self) -> Option<usize> {
        let pids = pid_dirs();
        (!pids.is_empty()).then_some(pids.len())
    }

    fn context_switch_total(&self) -> Option<u64> {
        let pids = pid_dirs();
        if pids.is_empty() {
            return None;
        }
        Some(
            pids.into_iter()
                .filter_map(|pid| read(format!("/proc/{pid}/status")))
                .filter_map(|status| parse_status_switches(&status))
                .sum(),
        )
    }

    fn gpu_utilization(&self) -> Option<f64> {
        read("/sys/class/drm/card0/device/gpu_busy_percent")?
            .trim()
            .parse()
            .ok()
    }

    fn battery_amperage_ma(&self) -> Option<i64> {
        let fields = battery_fields(&battery_dir()?);
        let micro_amps: i64 = fields.get("current_now")?.trim().parse().ok()?;
        let discharging = fields
            .get("status")
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("discharging"));
        let ma = micro_amps.abs() / 1000;
        Some(if discharging { -ma } else { ma })
    }

    fn battery_status(&self) -> Option<BatteryStatus> {
        battery_from_fields(&battery_fields(&battery_dir()?))
    }

    fn running_apps(&self) -> Vec<AppEntry> {
        // SAFETY: getuid has no preconditions.
        let uid = unsafe { libc::getuid() };
        pid_dirs()
            .into_iter()
            .filter_map(|pid| {
                let status = read(format!("/proc/{pid}/status"))?;
                if parse_status_uid(&status)? != uid {
                    return None;
                }
                let cmdline = fs::read(format!("/proc/{pid}/cmdline")).ok()?;
                if cmdline.is_empty() {
                    return None;
                }
                let name = read(format!("/proc/{pid}/comm"))?.trim().to_string();
                let exe = fs::read_link(format!("/proc/{pid}/exe"))
                    .ok()
                    .map(|p| p.to_string_lossy().into_owned());
                Some(AppEntry {
                    pid,
                    name,
                    bundle_id: None,
                    icon_path: exe,
                })
            })
            .collect()
    }

    fn process_usage(&self) -> HashMap<u32, ProcessUsage> {
        query_ps(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "\
cpu  100 5 50 800 20 3 2 0 0 0
cpu0 60 5 30 400 10 2 1 0 0 0
cpu1 40 0 20 400 10 1 1 0 0 0
intr 12345 0 0
ctxt 987654
";

    #[test]
    fn proc_stat_folds_irq_and_iowait() {
        let (host, cores) = parse_proc_stat(STAT);
        let host = host.unwrap();
        assert_eq!(host, TickSnapshot::new(100, 55, 820, 5));
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[1], TickSnapshot::new(40, 22, 410, 0));
    }

    #[test]
    fn meminfo_values_in_kb() {
        let info = parse_meminfo("MemTotal:       16384000 kB\nActive:          4096 kB\n");
        assert_eq!(info["MemTotal"], 16_384_000);
        assert_eq!(info["Active"], 4096);
    }

    #[test]
    fn status_switches_summed() {
        let status = "Name:\tbash\nvoluntary_ctxt_switches:\t120\nnonvoluntary_ctxt_switches:\t7\n";
        assert_eq!(parse_status_switches(status), Some(127));
        assert_eq!(parse_status_switches("Name:\tkthreadd\n"), None);
    }

    #[test]
    fn status_uid() {
        assert_eq!(parse_status_uid("Uid:\t1000\t1000\t1000\t1000\n"), Some(1000));
    }

    #[test]
    fn cpu_lists() {
        assert_eq!(count_cpu_list("0-15\n"), 16);
        assert_eq!(count_cpu_list("16-23"), 8);
        assert_eq!(count_cpu_list("0,2,4-5"), 4);
        assert_eq!(count_cpu_list(""), 0);
    }

    #[test]
    fn cache_sizes() {
        assert_eq!(parse_cache_size("48K\n"), Some(48 * 1024));
        assert_eq!(parse_cache_size("2M"), Some(2 * 1024 * 1024));
        assert_eq!(parse_cache_size("junk"), None);
    }

    #[test]
    fn battery_discharging_estimate() {
        let mut fields = HashMap::new();
        fields.insert("capacity".to_string(), "50\n".to_string());
        fields.insert("status".to_string(), "Discharging\n".to_string());
        fields.insert("energy_now".to_string(), "30000000".to_string());
        fields.insert("power_now".to_string(), "15000000".to_string());
        let b = battery_from_fields(&fields).unwrap();
        assert!((b.level - 0.5).abs() < 1e-9);
        assert!(!b.charging);
        assert_eq!(b.minutes_remaining, 120);
    }

    #[test]
    fn battery_charging_has_no_estimate() {
        let mut fields = HashMap::new();
        fields.insert("capacity".to_string(), "80".to_string());
        fields.insert("status".to_string(), "Charging".to_string());
        let b = battery_from_fields(&fields).unwrap();
        assert!(b.charging);
        assert_eq!(b.minutes_remaining, -1);
    }

    #[test]
    #[ignore] // Reads the live procfs
    fn live_proc_stat() {
        let p = LinuxPlatform::new(Duration::from_secs(2));
        assert!(p.host_ticks().is_some());
        assert!(p.process_count().unwrap() > 0);
        assert!(p.total_memory_bytes().unwrap() > 0);
    }
}
