pub mod decode;
pub mod processes;
pub mod snapshot;
pub mod topology;
pub mod watch;

use std::path::Path;

use liquidmon_core::MonitorConfig;
use serde::Serialize;

/// Config from `path` (plus env overrides), or defaults plus env overrides.
/// An unreadable or invalid file exits the process.
pub fn load_config(path: Option<&Path>) -> MonitorConfig {
    match path {
        Some(p) => match MonitorConfig::load(p) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error reading config {}: {e}", p.display());
                std::process::exit(1);
            }
        },
        None => MonitorConfig::from_env(),
    }
}

/// Pretty-print `value` as JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            eprintln!("Error serializing output: {e}");
            std::process::exit(1);
        }
    }
}

pub fn format_bytes(value: f64) -> String {
    let sign = if value.is_sign_negative() { "-" } else { "" };
    let mut v = value.abs();
    let units = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut idx = 0usize;
    while v >= 1024.0 && idx < units.len() - 1 {
        v /= 1024.0;
        idx += 1;
    }
    format!("{sign}{v:.2}{}", units[idx])
}

pub fn format_scaled(value: f64, base: f64, units: &[&str]) -> String {
    let sign = if value.is_sign_negative() { "-" } else { "" };
    let mut v = value.abs();
    let mut idx = 0usize;
    while v >= base && idx < units.len() - 1 {
        v /= base;
        idx += 1;
    }
    format!("{sign}{v:.2}{}", units[idx])
}

pub fn format_hz(value: f64) -> String {
    format_scaled(value, 1000.0, &["Hz", "kHz", "MHz", "GHz"])
}

pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else {
        format!("{hours}h {minutes}m")
    }
}
