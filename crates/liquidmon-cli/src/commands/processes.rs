use liquidmon_core::{MonitorConfig, ProcessAggregator, platform};

use super::print_json;

pub fn run(mut config: MonitorConfig, json: bool, top: Option<usize>) {
    if let Some(n) = top {
        config.top_n = n;
    }
    let platform = platform::native(config.command_timeout());
    let mut aggregator = ProcessAggregator::new(platform, &config);
    aggregator.refresh();
    let telemetry = aggregator.publish();

    if json {
        print_json(&telemetry);
        return;
    }

    println!("{:<8} {:<32} {:<12} {:>7}", "PID", "NAME", "USER", "CPU%");
    let mut rows = telemetry.processes.clone();
    rows.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
    for p in &rows {
        println!(
            "{:<8} {:<32} {:<12} {:>7.1}",
            p.pid,
            truncate(&p.name, 32),
            truncate(&p.owning_user, 12),
            p.cpu_percent
        );
    }

    if let Some(snapshot) = telemetry.history.last() {
        println!();
        println!("Top {} ({})", config.top_n, snapshot.id);
        for app in &snapshot.apps {
            println!("  {} {:<32} {:>6.1}%", app.color, app.name, app.cpu_percent);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
