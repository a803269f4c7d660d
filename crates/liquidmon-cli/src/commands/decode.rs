//! `liquidmon decode`: decode the newest complete sample in a sampler file.

use std::path::Path;

use liquidmon_core::power::decoder;
use liquidmon_core::{MonitorConfig, PowerSample};

use super::{format_hz, print_json};

pub fn run(config: &MonitorConfig, path: Option<&Path>, json: bool) {
    let path = path.unwrap_or(config.sampler.output_path.as_path());
    let sample = match decoder::decode_file(path) {
        Ok(Some(sample)) => sample,
        Ok(None) => {
            eprintln!("{} is missing or empty; no sample yet", path.display());
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("Error decoding {}: {e}", path.display());
            std::process::exit(1);
        }
    };

    if json {
        print_json(&sample);
    } else {
        print_sample(&sample);
    }
}

pub fn print_sample(sample: &PowerSample) {
    println!("Power sample");
    println!("{:-<48}", "");
    for c in &sample.clusters {
        println!(
            "  {:<10} {:?}  {:>10}  {} cpus",
            c.name,
            c.kind,
            format_hz(c.frequency_hz),
            c.cpu_count
        );
    }
    println!(
        "  E-cluster  {}   P-cluster {}",
        format_hz(sample.efficiency_frequency_hz),
        format_hz(sample.performance_frequency_hz)
    );
    println!("  package    {:.2} W", sample.package_watts);
    println!(
        "  gpu        {:.2} W @ {}",
        sample.gpu_watts,
        format_hz(sample.gpu_frequency_hz)
    );
    if let Some(w) = sample.ane_watts {
        println!("  ane        {w:.2} W");
    }
    if let Some(w) = sample.combined_watts {
        println!("  combined   {w:.2} W");
    }
    if let Some(t) = sample.thermal_pressure {
        println!("  thermal    {t}");
    }
}
