//! Darwin host platform: mach host statistics, libproc, the thermal
//! notification channel, `sysctlbyname`, and the IO registry via `ioreg`.
//!
//! Running applications are processes whose executable sits directly in an
//! `.app` bundle, minus bundles whose `Info.plist` marks them as agents or
//! background-only.

use std::collections::HashMap;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::helpers::{first_key, ioreg_entries, parse_pmset_battery, run_command};
use super::{BatteryStatus, HostPlatform, LoadAverage, MemoryPages, ThermalState};
use crate::counters::TickSnapshot;
use crate::power::plist::{self, PlistValue};
use crate::processes::{AppEntry, ProcessUsage, query_ps};
use crate::topology::CpuIdentity;

/// Mach and libproc FFI. Everything here lives in libSystem.
mod ffi {
    use std::ffi::{c_char, c_int, c_void};

    #[allow(non_camel_case_types)]
    pub type kern_return_t = c_int;
    #[allow(non_camel_case_types)]
    pub type mach_port_t = u32;
    #[allow(non_camel_case_types)]
    pub type natural_t = u32;
    #[allow(non_camel_case_types)]
    pub type integer_t = i32;
    #[allow(non_camel_case_types)]
    pub type mach_msg_type_number_t = u32;

    pub const KERN_SUCCESS: kern_return_t = 0;

    pub const HOST_CPU_LOAD_INFO: c_int = 3;
    pub const HOST_CPU_LOAD_INFO_COUNT: mach_msg_type_number_t = 4;
    pub const HOST_VM_INFO64: c_int = 4;
    pub const PROCESSOR_CPU_LOAD_INFO: c_int = 2;
    /// user, system, idle, nice
    pub const CPU_STATE_MAX: usize = 4;

    pub const PROC_ALL_PIDS: u32 = 1;
    pub const PROC_PIDTASKINFO: c_int = 4;
    pub const PROC_PIDPATHINFO_MAXSIZE: usize = 4096;

    pub const NOTIFY_STATUS_OK: u32 = 0;

    /// `struct vm_statistics64` (152 bytes, 38 `integer_t`).
    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    pub struct vm_statistics64 {
        pub free_count: natural_t,
        pub active_count: natural_t,
        pub inactive_count: natural_t,
        pub wire_count: natural_t,
        pub zero_fill_count: u64,
        pub reactivations: u64,
        pub pageins: u64,
        pub pageouts: u64,
        pub faults: u64,
        pub cow_faults: u64,
        pub lookups: u64,
        pub hits: u64,
        pub purges: u64,
        pub purgeable_count: natural_t,
        pub speculative_count: natural_t,
        pub decompressions: u64,
        pub compressions: u64,
        pub swapins: u64,
        pub swapouts: u64,
        pub compressor_page_count: natural_t,
        pub throttled_count: natural_t,
        pub external_page_count: natural_t,
        pub internal_page_count: natural_t,
        pub total_uncompressed_pages_in_compressor: u64,
    }

    pub const HOST_VM_INFO64_COUNT: mach_msg_type_number_t =
        (std::mem::size_of::<vm_statistics64>() / std::mem::size_of::<integer_t>()) as u32;

    /// `struct proc_taskinfo`.
    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    pub struct proc_taskinfo {
        pub pti_virtual_size: u64,
        pub pti_resident_size: u64,
        pub pti_total_user: u64,
        pub pti_total_system: u64,
        pub pti_threads_user: u64,
        pub pti_threads_system: u64,
        pub pti_policy: i32,
        pub pti_faults: i32,
        pub pti_pageins: i32,
        pub pti_cow_faults: i32,
        pub pti_messages_sent: i32,
        pub pti_messages_received: i32,
        pub pti_syscalls_mach: i32,
        pub pti_syscalls_unix: i32,
        pub pti_csw: i32,
        pub pti_threadnum: i32,
        pub pti_numrunning: i32,
        pub pti_priority: i32,
    }

    unsafe extern "C" {
        pub static mach_task_self_: mach_port_t;

        pub fn mach_host_self() -> mach_port_t;
        pub fn host_statistics(
            host: mach_port_t,
            flavor: c_int,
            info: *mut integer_t,
            count: *mut mach_msg_type_number_t,
        ) -> kern_return_t;
        pub fn host_statistics64(
            host: mach_port_t,
            flavor: c_int,
            info: *mut integer_t,
            count: *mut mach_msg_type_number_t,
        ) -> kern_return_t;
        pub fn host_processor_info(
            host: mach_port_t,
            flavor: c_int,
            out_processor_count: *mut natural_t,
            out_processor_info: *mut *mut integer_t,
            out_processor_info_count: *mut mach_msg_type_number_t,
        ) -> kern_return_t;
        pub fn vm_deallocate(target: mach_port_t, address: usize, size: usize) -> kern_return_t;

        pub fn proc_listpids(kind: u32, typeinfo: u32, buffer: *mut c_void, buffersize: c_int) -> c_int;
        pub fn proc_pidinfo(
            pid: c_int,
            flavor: c_int,
            arg: u64,
            buffer: *mut c_void,
            buffersize: c_int,
        ) -> c_int;
        pub fn proc_pidpath(pid: c_int, buffer: *mut c_void, buffersize: u32) -> c_int;

        pub fn notify_register_check(name: *const c_char, out_token: *mut c_int) -> u32;
        pub fn notify_get_state(token: c_int, state: *mut u64) -> u32;
        pub fn notify_cancel(token: c_int) -> u32;
    }
}

const THERMAL_NOTIFICATION: &str = "com.apple.system.thermalpressurelevel";

/// `ioreg` property names for accelerator utilization, in preference order.
const GPU_UTILIZATION_KEYS: &[&str] = &["Device Utilization %", "GPU Activity(%)"];
const BATTERY_CURRENT_KEYS: &[&str] = &["InstantAmperage", "Amperage"];
/// Registry classes for the neural engine, newest first.
const NEURAL_ENGINE_CLASSES: &[&str] = &["H11ANEIn", "AppleH11ANEInterface"];

/// `hw.optional.*` flags reported as CPU features.
const FEATURE_SYSCTLS: &[(&str, &str)] = &[
    ("hw.optional.neon", "NEON"),
    ("hw.optional.AdvSIMD", "AdvSIMD"),
    ("hw.optional.arm.FEAT_AES", "AES"),
    ("hw.optional.arm.FEAT_SHA256", "SHA256"),
    ("hw.optional.arm.FEAT_SHA512", "SHA512"),
    ("hw.optional.armv8_crc32", "CRC32"),
    ("hw.optional.arm.FEAT_LSE", "LSE"),
    ("hw.optional.arm.FEAT_FP16", "FP16"),
    ("hw.optional.arm.FEAT_DotProd", "DotProd"),
    ("hw.optional.arm.FEAT_BF16", "BF16"),
    ("hw.optional.arm.FEAT_I8MM", "I8MM"),
    ("hw.optional.arm.FEAT_SME", "SME"),
];

// ---------------------------------------------------------------------------
// sysctl
// ---------------------------------------------------------------------------

fn sysctl_raw(name: &str) -> Option<Vec<u8>> {
    let c_name = CString::new(name).ok()?;
    let mut len: libc::size_t = 0;
    // SAFETY: a null old pointer asks only for the value length.
    let rc = unsafe {
        libc::sysctlbyname(c_name.as_ptr(), std::ptr::null_mut(), &mut len, std::ptr::null_mut(), 0)
    };
    if rc != 0 || len == 0 {
        return None;
    }
    let mut buf = vec![0u8; len];
    // SAFETY: `buf` holds `len` writable bytes and `len` is updated in place.
    let rc = unsafe {
        libc::sysctlbyname(
            c_name.as_ptr(),
            buf.as_mut_ptr() as *mut c_void,
            &mut len,
            std::ptr::null_mut(),
            0,
        )
    };
    if rc != 0 {
        return None;
    }
    buf.truncate(len);
    Some(buf)
}

/// Integer sysctl; accepts both 32- and 64-bit values.
fn sysctl_u64(name: &str) -> Option<u64> {
    let raw = sysctl_raw(name)?;
    match raw.len() {
        4 => Some(u64::from(u32::from_ne_bytes(raw[..4].try_into().ok()?))),
        8 => Some(u64::from_ne_bytes(raw[..8].try_into().ok()?)),
        _ => None,
    }
}

fn sysctl_string(name: &str) -> Option<String> {
    let raw = sysctl_raw(name)?;
    let text = CStr::from_bytes_until_nul(&raw)
        .map(|c| c.to_string_lossy().into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(&raw).into_owned());
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn boot_time() -> Option<SystemTime> {
    let raw = sysctl_raw("kern.boottime")?;
    if raw.len() < std::mem::size_of::<libc::timeval>() {
        return None;
    }
    // SAFETY: the buffer is at least one `timeval` long; read_unaligned
    // tolerates the Vec's byte alignment.
    let tv: libc::timeval = unsafe { std::ptr::read_unaligned(raw.as_ptr() as *const libc::timeval) };
    let secs = u64::try_from(tv.tv_sec).ok()?;
    let micros = u64::try_from(tv.tv_usec).ok()?;
    Some(UNIX_EPOCH + Duration::from_secs(secs) + Duration::from_micros(micros))
}

// ---------------------------------------------------------------------------
// libproc
// ---------------------------------------------------------------------------

fn list_pids() -> Vec<c_int> {
    // SAFETY: null buffer returns the byte size needed.
    let needed = unsafe { ffi::proc_listpids(ffi::PROC_ALL_PIDS, 0, std::ptr::null_mut(), 0) };
    if needed <= 0 {
        return Vec::new();
    }
    // Headroom for processes spawned between the two calls.
    let slots = needed as usize / std::mem::size_of::<c_int>() + 64;
    let mut pids = vec![0 as c_int; slots];
    let bytes = (slots * std::mem::size_of::<c_int>()) as c_int;
    // SAFETY: `pids` provides `bytes` writable bytes.
    let written = unsafe {
        ffi::proc_listpids(ffi::PROC_ALL_PIDS, 0, pids.as_mut_ptr() as *mut c_void, bytes)
    };
    if written <= 0 {
        return Vec::new();
    }
    pids.truncate(written as usize / std::mem::size_of::<c_int>());
    pids.retain(|&p| p > 0);
    pids
}

fn task_info(pid: c_int) -> Option<ffi::proc_taskinfo> {
    let mut info = ffi::proc_taskinfo::default();
    let size = std::mem::size_of::<ffi::proc_taskinfo>() as c_int;
    // SAFETY: `info` is a correctly sized, writable proc_taskinfo.
    let n = unsafe {
        ffi::proc_pidinfo(
            pid,
            ffi::PROC_PIDTASKINFO,
            0,
            &mut info as *mut _ as *mut c_void,
            size,
        )
    };
    (n == size).then_some(info)
}

fn pid_path(pid: c_int) -> Option<String> {
    let mut buf = vec![0u8; ffi::PROC_PIDPATHINFO_MAXSIZE];
    // SAFETY: `buf` holds PROC_PIDPATHINFO_MAXSIZE writable bytes.
    let n = unsafe {
        ffi::proc_pidpath(pid, buf.as_mut_ptr() as *mut c_void, buf.len() as u32)
    };
    if n <= 0 {
        return None;
    }
    buf.truncate(n as usize);
    String::from_utf8(buf).ok()
}

/// `/Applications/Foo.app/Contents/MacOS/Foo` → `/Applications/Foo.app`.
///
/// Helpers nested inside another bundle (`Foo.app/.../Bar.app/...`) are not
/// regular applications and yield `None`.
pub(crate) fn app_bundle_of(executable: &str) -> Option<&str> {
    const MARKER: &str = ".app/Contents/MacOS/";
    let idx = executable.find(MARKER)?;
    let bundle = &executable[..idx + ".app".len()];
    (!bundle.contains(".app/")).then_some(bundle)
}

fn bundle_display_name(bundle: &str) -> String {
    Path::new(bundle)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| bundle.to_string())
}

/// What `Info.plist` says about a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BundleInfo {
    id: Option<String>,
    /// Agents (`LSUIElement`) and daemons (`LSBackgroundOnly`) have no Dock
    /// presence and are not listed as applications.
    background: bool,
}

/// Info.plist booleans appear as `<true/>` or as strings like `"1"`/`"YES"`.
fn plist_flag(root: &PlistValue, key: &str) -> bool {
    match root.get(key) {
        Some(PlistValue::Bool(b)) => *b,
        Some(PlistValue::Integer(v)) => *v != 0,
        Some(PlistValue::String(s)) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "yes" | "true")
        }
        _ => false,
    }
}

fn bundle_info_from_plist(root: &PlistValue) -> BundleInfo {
    BundleInfo {
        id: root
            .get("CFBundleIdentifier")
            .and_then(PlistValue::as_str)
            .map(str::to_string),
        background: plist_flag(root, "LSUIElement") || plist_flag(root, "LSBackgroundOnly"),
    }
}

/// Read an XML `Info.plist`. Binary plists are not decoded; such bundles are
/// listed without an id.
fn read_bundle_info(bundle: &str) -> BundleInfo {
    let path = Path::new(bundle).join("Contents").join("Info.plist");
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| plist::parse(&text).ok())
        .map(|root| bundle_info_from_plist(&root))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// Host platform backed by mach, libproc and the IO registry.
pub struct DarwinPlatform {
    timeout: Duration,
    /// bundle path → Info.plist summary; bundles do not change while running.
    bundles: Mutex<HashMap<String, BundleInfo>>,
}

impl DarwinPlatform {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            bundles: Mutex::new(HashMap::new()),
        }
    }

    fn ioreg(&self, args: &[&str]) -> Vec<HashMap<String, i64>> {
        run_command("/usr/sbin/ioreg", args, self.timeout)
            .map(|out| ioreg_entries(&out))
            .unwrap_or_default()
    }

    fn bundle_info(&self, bundle: &str) -> BundleInfo {
        let mut cache = self
            .bundles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache
            .entry(bundle.to_string())
            .or_insert_with(|| read_bundle_info(bundle))
            .clone()
    }
}

impl HostPlatform for DarwinPlatform {
    fn name(&self) -> &'static str {
        "darwin"
    }

    fn host_ticks(&self) -> Option<TickSnapshot> {
        let mut ticks = [0 as ffi::integer_t; ffi::CPU_STATE_MAX];
        let mut count = ffi::HOST_CPU_LOAD_INFO_COUNT;
        // SAFETY: `ticks` has room for HOST_CPU_LOAD_INFO_COUNT integers.
        let kr = unsafe {
            ffi::host_statistics(
                ffi::mach_host_self(),
                ffi::HOST_CPU_LOAD_INFO,
                ticks.as_mut_ptr(),
                &mut count,
            )
        };
        if kr != ffi::KERN_SUCCESS {
            return None;
        }
        // natural_t counters; reinterpret the signed storage as unsigned.
        Some(TickSnapshot::new(
            u64::from(ticks[0] as u32),
            u64::from(ticks[1] as u32),
            u64::from(ticks[2] as u32),
            u64::from(ticks[3] as u32),
        ))
    }

    fn per_core_ticks(&self) -> Option<Vec<TickSnapshot>> {
        let mut cpu_count: ffi::natural_t = 0;
        let mut info: *mut ffi::integer_t = std::ptr::null_mut();
        let mut info_count: ffi::mach_msg_type_number_t = 0;
        // SAFETY: out-pointers are valid; on success the kernel hands us a
        // vm allocation we release below.
        let kr = unsafe {
            ffi::host_processor_info(
                ffi::mach_host_self(),
                ffi::PROCESSOR_CPU_LOAD_INFO,
                &mut cpu_count,
                &mut info,
                &mut info_count,
            )
        };
        if kr != ffi::KERN_SUCCESS || info.is_null() {
            return None;
        }

        let len = info_count as usize;
        let cores = (cpu_count as usize).min(len / ffi::CPU_STATE_MAX);
        // SAFETY: the kernel returned `info_count` integers at `info`.
        let slice = unsafe { std::slice::from_raw_parts(info, len) };
        let snapshots = (0..cores)
            .map(|i| {
                let base = i * ffi::CPU_STATE_MAX;
                TickSnapshot::new(
                    u64::from(slice[base] as u32),
                    u64::from(slice[base + 1] as u32),
                    u64::from(slice[base + 2] as u32),
                    u64::from(slice[base + 3] as u32),
                )
            })
            .collect();

        // SAFETY: releases the allocation returned by host_processor_info.
        unsafe {
            ffi::vm_deallocate(
                ffi::mach_task_self_,
                info as usize,
                len * std::mem::size_of::<ffi::integer_t>(),
            );
        }
        Some(snapshots)
    }

    fn logical_cpu_count(&self) -> usize {
        sysctl_u64("hw.logicalcpu")
            .map(|n| n as usize)
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(std::num::NonZero::get)
                    .unwrap_or(1)
            })
    }

    fn perf_level_cpu_count(&self, level: u32) -> Option<usize> {
        sysctl_u64(&format!("hw.perflevel{level}.logicalcpu")).map(|n| n as usize)
    }

    fn cpu_identity(&self) -> CpuIdentity {
        let mut features: Vec<String> = FEATURE_SYSCTLS
            .iter()
            .filter(|(key, _)| sysctl_u64(key).unwrap_or(0) != 0)
            .map(|(_, label)| (*label).to_string())
            .collect();
        // Intel hosts publish a space-separated list instead.
        if let Some(list) = sysctl_string("machdep.cpu.features") {
            features.extend(list.split_whitespace().map(str::to_string));
        }

        CpuIdentity {
            brand: sysctl_string("machdep.cpu.brand_string").unwrap_or_default(),
            logical_cpus: self.logical_cpu_count(),
            physical_cpus: sysctl_u64("hw.physicalcpu").unwrap_or(0) as usize,
            l1d_cache_bytes: sysctl_u64("hw.l1dcachesize").unwrap_or(0),
            l2_cache_bytes: sysctl_u64("hw.l2cachesize").unwrap_or(0),
            features,
        }
    }

    fn total_memory_bytes(&self) -> Option<u64> {
        sysctl_u64("hw.memsize")
    }

    fn memory_pages(&self) -> Option<MemoryPages> {
        let mut stats = ffi::vm_statistics64::default();
        let mut count = ffi::HOST_VM_INFO64_COUNT;
        // SAFETY: `stats` is a repr(C) vm_statistics64 of HOST_VM_INFO64_COUNT integers.
        let kr = unsafe {
            ffi::host_statistics64(
                ffi::mach_host_self(),
                ffi::HOST_VM_INFO64,
                &mut stats as *mut _ as *mut ffi::integer_t,
                &mut count,
            )
        };
        if kr != ffi::KERN_SUCCESS {
            return None;
        }
        // SAFETY: sysconf has no preconditions.
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size <= 0 {
            return None;
        }
        Some(MemoryPages {
            active: u64::from(stats.active_count),
            wired: u64::from(stats.wire_count),
            page_size: page_size as u64,
        })
    }

    fn load_average(&self) -> Option<LoadAverage> {
        super::helpers::load_average()
    }

    fn uptime(&self) -> Option<Duration> {
        SystemTime::now().duration_since(boot_time()?).ok()
    }

    fn thermal_state(&self) -> Option<ThermalState> {
        let name = CString::new(THERMAL_NOTIFICATION).ok()?;
        let mut token: c_int = 0;
        // SAFETY: valid C string and out-pointer.
        let status = unsafe { ffi::notify_register_check(name.as_ptr() as *const c_char, &mut token) };
        if status != ffi::NOTIFY_STATUS_OK {
            return None;
        }
        let mut level: u64 = 0;
        // SAFETY: token was just registered; `level` is writable.
        let status = unsafe { ffi::notify_get_state(token, &mut level) };
        // SAFETY: token is valid and not used after this call.
        unsafe { ffi::notify_cancel(token) };
        (status == ffi::NOTIFY_STATUS_OK).then(|| ThermalState::from_level(level))
    }

    fn process_count(&self) -> Option<usize> {
        let pids = list_pids();
        (!pids.is_empty()).then_some(pids.len())
    }

    fn context_switch_total(&self) -> Option<u64> {
        let pids = list_pids();
        if pids.is_empty() {
            return None;
        }
        // Processes we may not inspect (other users, unless elevated) are skipped.
        let total = pids
            .into_iter()
            .filter_map(task_info)
            .map(|info| u64::try_from(info.pti_csw).unwrap_or(0))
            .sum();
        Some(total)
    }

    fn gpu_utilization(&self) -> Option<f64> {
        let entries = self.ioreg(&["-r", "-d", "1", "-w", "0", "-c", "IOAccelerator"]);
        let first = entries.first()?;
        first_key(first, GPU_UTILIZATION_KEYS).map(|v| v as f64)
    }

    fn battery_amperage_ma(&self) -> Option<i64> {
        let entries = self.ioreg(&["-r", "-w", "0", "-n", "AppleSmartBattery"]);
        entries
            .iter()
            .find_map(|entry| first_key(entry, BATTERY_CURRENT_KEYS))
    }

    fn neural_engine_active(&self) -> Option<bool> {
        NEURAL_ENGINE_CLASSES.iter().find_map(|class| {
            let entries = self.ioreg(&["-r", "-d", "1", "-w", "0", "-c", class]);
            entries
                .iter()
                .find_map(|entry| entry.get("CurrentPowerState").copied())
                .map(|state| state > 0)
        })
    }

    fn battery_status(&self) -> Option<BatteryStatus> {
        let out = run_command("/usr/bin/pmset", &["-g", "batt"], self.timeout)?;
        parse_pmset_battery(&out)
    }

    fn running_apps(&self) -> Vec<AppEntry> {
        list_pids()
            .into_iter()
            .filter_map(|pid| {
                let path = pid_path(pid)?;
                let bundle = app_bundle_of(&path)?.to_string();
                let info = self.bundle_info(&bundle);
                if info.background {
                    return None;
                }
                Some(AppEntry {
                    pid: pid as u32,
                    name: bundle_display_name(&bundle),
                    bundle_id: info.id,
                    icon_path: Some(bundle),
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

    #[test]
    fn vm_statistics64_layout() {
        assert_eq!(std::mem::size_of::<ffi::vm_statistics64>(), 152);
        assert_eq!(ffi::HOST_VM_INFO64_COUNT, 38);
    }

    #[test]
    fn proc_taskinfo_layout() {
        assert_eq!(std::mem::size_of::<ffi::proc_taskinfo>(), 96);
    }

    #[test]
    fn bundle_of_regular_app() {
        assert_eq!(
            app_bundle_of("/Applications/Safari.app/Contents/MacOS/Safari"),
            Some("/Applications/Safari.app")
        );
        assert_eq!(bundle_display_name("/Applications/Safari.app"), "Safari");
    }

    #[test]
    fn nested_helpers_are_not_apps() {
        assert_eq!(
            app_bundle_of(
                "/Applications/Xcode.app/Contents/Developer/Applications/Simulator.app/Contents/MacOS/Simulator"
            ),
            None
        );
        assert_eq!(app_bundle_of("/usr/libexec/trustd"), None);
    }

    #[test]
    fn agent_bundles_are_background() {
        let agent = plist::parse(
            "<plist version=\"1.0\"><dict>\
             <key>CFBundleIdentifier</key><string>com.example.menubar</string>\
             <key>LSUIElement</key><true/>\
             </dict></plist>",
        )
        .unwrap();
        let info = bundle_info_from_plist(&agent);
        assert_eq!(info.id.as_deref(), Some("com.example.menubar"));
        assert!(info.background);

        let daemon = plist::parse(
            "<plist version=\"1.0\"><dict><key>LSBackgroundOnly</key><string>1</string></dict></plist>",
        )
        .unwrap();
        assert!(bundle_info_from_plist(&daemon).background);
    }

    #[test]
    fn regular_bundle_is_listed() {
        let app = plist::parse(
            "<plist version=\"1.0\"><dict>\
             <key>CFBundleIdentifier</key><string>com.apple.Safari</string>\
             <key>LSUIElement</key><false/>\
             </dict></plist>",
        )
        .unwrap();
        let info = bundle_info_from_plist(&app);
        assert_eq!(info.id.as_deref(), Some("com.apple.Safari"));
        assert!(!info.background);
        assert_eq!(read_bundle_info("/nonexistent/Foo.app"), BundleInfo::default());
    }

    #[test]
    #[ignore] // Requires a live Darwin host
    fn live_host_ticks_and_topology() {
        let p = DarwinPlatform::new(Duration::from_secs(2));
        assert!(p.host_ticks().is_some());
        let cores = p.per_core_ticks().unwrap();
        assert_eq!(cores.len(), p.logical_cpu_count());
        assert!(p.total_memory_bytes().unwrap() > 0);
        assert!(p.memory_pages().unwrap().used_bytes() > 0);
    }
}
