use liquidmon_core::{CoreTopology, CpuIdentity, MonitorConfig, platform};
use serde::Serialize;

use super::{format_bytes, print_json};

#[derive(Serialize)]
struct TopologyReport {
    platform: &'static str,
    topology: CoreTopology,
    cpu: CpuIdentity,
}

pub fn run(config: &MonitorConfig, json: bool) {
    let platform = platform::native(config.command_timeout());
    let report = TopologyReport {
        platform: platform.name(),
        topology: CoreTopology::detect(platform.as_ref()),
        cpu: platform.cpu_identity(),
    };

    if json {
        print_json(&report);
        return;
    }

    let cpu = &report.cpu;
    println!("Platform:    {}", report.platform);
    println!(
        "CPU:         {}",
        if cpu.brand.is_empty() { "unknown" } else { &cpu.brand }
    );
    println!(
        "Cores:       {} total ({} performance, {} efficiency){}",
        report.topology.total_cores(),
        report.topology.performance_cores,
        report.topology.efficiency_cores,
        if report.topology.is_heterogeneous() { "" } else { "  [uniform]" }
    );
    println!(
        "Logical:     {}   physical: {}",
        cpu.logical_cpus, cpu.physical_cpus
    );
    println!(
        "Cache:       L1d {}  L2 {}",
        format_bytes(cpu.l1d_cache_bytes as f64),
        format_bytes(cpu.l2_cache_bytes as f64)
    );
    if !cpu.features.is_empty() {
        println!("Features:    {}", cpu.features.join(" "));
    }
}
