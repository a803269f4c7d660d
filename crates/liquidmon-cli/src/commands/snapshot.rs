//! `liquidmon snapshot`: one settled host reading.

use std::sync::Arc;

use liquidmon_core::{HostSampler, HostTelemetry, MonitorConfig, platform};

use super::{format_bytes, format_uptime, print_json};

pub fn run(config: &MonitorConfig, json: bool) {
    let platform = platform::native(config.command_timeout());
    let mut sampler = HostSampler::new(Arc::clone(&platform), config.history_capacity);

    // The first refresh only establishes the tick baseline.
    sampler.refresh();
    std::thread::sleep(config.host_interval());
    sampler.refresh();

    let telemetry = sampler.publish();
    if json {
        print_json(&telemetry);
        return;
    }

    println!("Host snapshot ({})", platform.name());
    print_host(&telemetry);
    if let Some(battery) = platform.battery_status() {
        let remaining = if battery.minutes_remaining < 0 {
            "unknown".to_string()
        } else {
            format!("{}m", battery.minutes_remaining)
        };
        println!(
            "  battery:  {:.0}% {}  remaining {remaining}",
            battery.level * 100.0,
            if battery.charging { "charging" } else { "on battery" },
        );
    }
}

pub fn print_host(t: &HostTelemetry) {
    let s = &t.stats;
    println!("{:=<68}", "");
    println!("  cpu:      {:.1}%", s.cpu_usage);
    if !s.core_usage.is_empty() {
        let cores: Vec<String> = s.core_usage.iter().map(|u| format!("{u:.0}")).collect();
        println!("  cores:    [{}]", cores.join(" "));
    }
    if let Some(topo) = t.topology {
        println!(
            "  topology: {}P + {}E",
            topo.performance_cores, topo.efficiency_cores
        );
    }
    println!(
        "  memory:   {} / {}",
        format_bytes(s.ram_used_bytes as f64),
        format_bytes(s.ram_total_bytes as f64)
    );
    println!(
        "  loadavg:  1m {:.2}  5m {:.2}  15m {:.2}",
        s.load.one, s.load.five, s.load.fifteen
    );
    println!("  uptime:   {}", format_uptime(s.uptime_secs));
    println!("  thermal:  {}", s.thermal);
    println!(
        "  procs:    {}  ctx switches/cycle {}",
        s.process_count, s.context_switch_rate
    );
    println!("  gpu:      {:.1}%", s.gpu_utilization);
    println!("  current:  {} mA", s.battery_amperage_ma);
    println!(
        "  ane:      {}",
        if s.neural_engine_active { "active" } else { "idle" }
    );
    println!("{:=<68}", "");
}
