//! `liquidmon watch`: run the monitor and stream one line per host cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use liquidmon_core::{Monitor, MonitorConfig, TelemetrySnapshot};

use super::{format_bytes, format_hz};

pub struct WatchOptions {
    pub duration: Option<f64>,
    pub json: bool,
    pub power: bool,
    pub interval_ms: Option<u64>,
}

pub fn run(mut config: MonitorConfig, opts: WatchOptions) {
    if let Some(ms) = opts.interval_ms {
        config.host_interval_ms = ms;
    }
    let interval = config.host_interval();
    let max_duration = opts
        .duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(Duration::from_secs_f64);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Error setting Ctrl+C handler: {e}");
        std::process::exit(1);
    }

    let mut monitor = Monitor::new(config);

    if opts.power {
        eprintln!("Requesting elevation for the power sampler...");
        match monitor.enable_power() {
            Ok(pid) => eprintln!("Power sampler running (pid {pid})"),
            Err(e) => eprintln!("Power sampler unavailable: {e}"),
        }
    }

    if let Err(e) = monitor.start() {
        eprintln!("Error starting monitor: {e}");
        std::process::exit(1);
    }

    let start = Instant::now();
    let mut last_cycle = 0u64;
    while running.load(Ordering::SeqCst) {
        if let Some(max) = max_duration
            && start.elapsed() >= max
        {
            break;
        }
        std::thread::sleep(interval.min(Duration::from_millis(250)));

        let snap = monitor.snapshot();
        if snap.host.stats.cycle == last_cycle {
            continue;
        }
        last_cycle = snap.host.stats.cycle;

        if opts.json {
            match serde_json::to_string(&snap) {
                Ok(line) => println!("{line}"),
                Err(e) => log::warn!("snapshot serialization failed: {e}"),
            }
        } else {
            println!("{}", status_line(&snap));
        }
    }

    monitor.stop();
    let session = monitor.power().session();
    if opts.power {
        eprintln!(
            "Power sampler stopped: {} decoded, {} failed",
            session.decoded_count, session.decode_failures
        );
    }
}

fn status_line(snap: &TelemetrySnapshot) -> String {
    let s = &snap.host.stats;
    let mut line = format!(
        "#{:<5} cpu {:>5.1}%  mem {}/{}  load {:.2}  gpu {:>5.1}%  {}",
        s.cycle,
        s.cpu_usage,
        format_bytes(s.ram_used_bytes as f64),
        format_bytes(s.ram_total_bytes as f64),
        s.load.one,
        s.gpu_utilization,
        s.thermal
    );
    if let Some(b) = snap.battery {
        line.push_str(&format!(
            "  bat {:.0}%{}",
            b.level * 100.0,
            if b.charging { "+" } else { "" }
        ));
    }
    if let Some(p) = &snap.power {
        line.push_str(&format!(
            "  pkg {:.2}W  P {}  E {}",
            p.package_watts,
            format_hz(p.performance_frequency_hz),
            format_hz(p.efficiency_frequency_hz)
        ));
    }
    if let Some(top) = snap.processes.history.last().and_then(|h| h.apps.first()) {
        line.push_str(&format!("  top {} {:.1}%", top.name, top.cpu_percent));
    }
    line
}
