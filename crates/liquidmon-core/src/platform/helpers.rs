//! Shared helpers for platform implementations.
//!
//! Subprocess execution with a hard deadline, `ioreg` output scanning,
//! `pmset` battery parsing, and load averages. The parsers are pure and
//! compiled on every target so they can be tested anywhere.

use std::collections::HashMap;
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{BatteryStatus, LoadAverage};

// ---------------------------------------------------------------------------
// Subprocess execution
// ---------------------------------------------------------------------------

/// Errors from running an external command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    #[error("waiting on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Poll interval while waiting for a child to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<Vec<u8>>> {
    let mut pipe = pipe?;
    Some(thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    }))
}

fn collect(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Run `program args...`, killing it if it runs past `timeout`.
///
/// stdout and stderr are drained on their own threads so a chatty child
/// cannot fill the pipe and stall.
pub fn run_command_output(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CommandError::TimedOut {
                        program: program.to_string(),
                        timeout,
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                let _ = child.kill();
                return Err(CommandError::Wait {
                    program: program.to_string(),
                    source,
                });
            }
        }
    };

    Ok(CommandOutput {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

/// Run a command and return its stdout when it exits successfully.
///
/// Returns `None` on spawn failure, timeout, or non-zero exit. This is the
/// shared helper for platform queries that shell out to system utilities
/// (sysctl, ioreg, pmset, ps).
pub fn run_command(program: &str, args: &[&str], timeout: Duration) -> Option<String> {
    match run_command_output(program, args, timeout) {
        Ok(out) if out.success() => Some(out.stdout),
        Ok(out) => {
            log::debug!("{program} exited with {}", out.status);
            None
        }
        Err(e) => {
            log::debug!("{e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// ioreg output scanning
// ---------------------------------------------------------------------------

/// Scan a string for all `"key"=number` or `"key" = number` patterns and
/// insert them into the map. Handles top-level ioreg properties and values
/// nested inside `{...}` dictionaries on the same line.
///
/// ioreg prints signed quantities (battery current) as their unsigned 64-bit
/// bit pattern; those are reinterpreted as `i64`.
pub fn extract_quoted_key_numbers(s: &str, map: &mut HashMap<String, i64>) {
    let bytes = s.as_bytes();
    let len = bytes.len();
    let mut i = 0;

    while i < len {
        if bytes[i] != b'"' {
            i += 1;
            continue;
        }

        let key_start = i + 1;
        let mut key_end = key_start;
        while key_end < len && bytes[key_end] != b'"' {
            key_end += 1;
        }
        if key_end >= len {
            break;
        }

        let key = &s[key_start..key_end];
        let mut j = key_end + 1;

        while j < len && bytes[j] == b' ' {
            j += 1;
        }
        if j >= len || bytes[j] != b'=' {
            i = key_end + 1;
            continue;
        }
        j += 1;

        while j < len && bytes[j] == b' ' {
            j += 1;
        }

        let num_start = j;
        if j < len && bytes[j] == b'-' {
            j += 1;
        }
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }

        if j > num_start && (j >= len || !bytes[j].is_ascii_alphanumeric()) {
            let raw = &s[num_start..j];
            let parsed = raw
                .parse::<i64>()
                .ok()
                .or_else(|| raw.parse::<u64>().ok().map(|v| v as i64));
            if let Some(v) = parsed {
                map.insert(key.to_string(), v);
            }
        }

        i = j.max(key_end + 1);
    }
}

/// Split `ioreg` output into one numeric property map per registry entry.
///
/// Entries start at lines containing `+-o `; properties before the first
/// entry header are attributed to an implicit first entry.
pub fn ioreg_entries(output: &str) -> Vec<HashMap<String, i64>> {
    let mut entries: Vec<HashMap<String, i64>> = Vec::new();
    let mut current: Option<HashMap<String, i64>> = None;

    for line in output.lines() {
        if line.contains("+-o ") {
            if let Some(done) = current.take() {
                entries.push(done);
            }
            current = Some(HashMap::new());
            continue;
        }
        let trimmed = line.trim().trim_start_matches('|').trim();
        let map = current.get_or_insert_with(HashMap::new);
        extract_quoted_key_numbers(trimmed, map);
    }
    if let Some(done) = current {
        entries.push(done);
    }
    entries.retain(|m| !m.is_empty());
    entries
}

/// First value found for any of `keys`, checked in order.
pub fn first_key(map: &HashMap<String, i64>, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| map.get(*k).copied())
}

// ---------------------------------------------------------------------------
// pmset battery parsing
// ---------------------------------------------------------------------------

/// Parse `pmset -g batt` output.
///
/// ```text
/// Now drawing from 'Battery Power'
///  -InternalBattery-0 (id=4653155)	85%; discharging; 3:21 remaining present: true
/// ```
pub fn parse_pmset_battery(output: &str) -> Option<BatteryStatus> {
    let line = output.lines().find(|l| l.contains("InternalBattery"))?;
    let after_id = line.split(')').nth(1).unwrap_or(line);
    let mut fields = after_id.split(';').map(str::trim);

    let level = fields
        .next()?
        .split_whitespace()
        .find_map(|t| t.strip_suffix('%'))
        .and_then(|p| p.parse::<f64>().ok())?
        / 100.0;

    let state = fields.next().unwrap_or("").to_ascii_lowercase();
    let charging = state == "charging" || state == "finishing charge";

    let minutes_remaining = fields
        .next()
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(parse_hours_minutes)
        .unwrap_or(-1);

    Some(BatteryStatus {
        level: level.clamp(0.0, 1.0),
        charging,
        minutes_remaining,
    })
}

fn parse_hours_minutes(token: &str) -> Option<i64> {
    let (h, m) = token.split_once(':')?;
    Some(h.parse::<i64>().ok()? * 60 + m.parse::<i64>().ok()?)
}

// ---------------------------------------------------------------------------
// Load average
// ---------------------------------------------------------------------------

/// 1/5/15 minute load averages via `getloadavg(3)`.
pub fn load_average() -> Option<LoadAverage> {
    #[cfg(unix)]
    {
        let mut values = [0.0_f64; 3];
        // SAFETY: `getloadavg` writes up to `n` doubles to a valid buffer.
        let n = unsafe { libc::getloadavg(values.as_mut_ptr(), 3) };
        if n < 3 {
            return None;
        }
        Some(LoadAverage {
            one: values[0],
            five: values[1],
            fifteen: values[2],
        })
    }
    #[cfg(not(unix))]
    {
        None
    }
}

/// Name of the user running this process.
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // extract_quoted_key_numbers
    // -----------------------------------------------------------------------

    #[test]
    fn extracts_top_level_property() {
        let mut map = HashMap::new();
        extract_quoted_key_numbers(r#""InstantAmperage" = 1234"#, &mut map);
        assert_eq!(map.get("InstantAmperage"), Some(&1234));
    }

    #[test]
    fn extracts_nested_dictionary_values() {
        let mut map = HashMap::new();
        extract_quoted_key_numbers(
            r#""PerformanceStatistics" = {"Device Utilization %"=37,"Renderer Utilization %"=12}"#,
            &mut map,
        );
        assert_eq!(map.get("Device Utilization %"), Some(&37));
        assert_eq!(map.get("Renderer Utilization %"), Some(&12));
        assert!(!map.contains_key("PerformanceStatistics"));
    }

    #[test]
    fn unsigned_bit_pattern_becomes_negative() {
        let mut map = HashMap::new();
        extract_quoted_key_numbers(r#""InstantAmperage" = 18446744073709550616"#, &mut map);
        assert_eq!(map.get("InstantAmperage"), Some(&-1000));
    }

    #[test]
    fn ignores_non_numeric_values() {
        let mut map = HashMap::new();
        extract_quoted_key_numbers(r#""Name" = "battery", "Serial"=0x1f"#, &mut map);
        assert!(map.is_empty());
    }

    #[test]
    fn ioreg_entries_split_per_device() {
        let out = "\
+-o AGXAcceleratorG13X  <class AGXAcceleratorG13X>
  {
    \"PerformanceStatistics\" = {\"Device Utilization %\"=42}
  }
+-o AGXAcceleratorG14X  <class AGXAcceleratorG14X>
  {
    \"PerformanceStatistics\" = {\"Device Utilization %\"=7}
  }
";
        let entries = ioreg_entries(out);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].get("Device Utilization %"), Some(&42));
        assert_eq!(entries[1].get("Device Utilization %"), Some(&7));
    }

    #[test]
    fn first_key_respects_order() {
        let mut map = HashMap::new();
        map.insert("GPU Activity(%)".to_string(), 5);
        map.insert("Device Utilization %".to_string(), 9);
        assert_eq!(first_key(&map, &["Device Utilization %", "GPU Activity(%)"]), Some(9));
        assert_eq!(first_key(&map, &["missing"]), None);
    }

    // -----------------------------------------------------------------------
    // pmset
    // -----------------------------------------------------------------------

    #[test]
    fn pmset_discharging() {
        let out = "Now drawing from 'Battery Power'\n -InternalBattery-0 (id=4653155)\t85%; discharging; 3:21 remaining present: true\n";
        let b = parse_pmset_battery(out).unwrap();
        assert!((b.level - 0.85).abs() < 1e-9);
        assert!(!b.charging);
        assert_eq!(b.minutes_remaining, 201);
    }

    #[test]
    fn pmset_charging_without_estimate() {
        let out = "Now drawing from 'AC Power'\n -InternalBattery-0 (id=1)\t42%; charging; (no estimate) present: true\n";
        let b = parse_pmset_battery(out).unwrap();
        assert!(b.charging);
        assert_eq!(b.minutes_remaining, -1);
    }

    #[test]
    fn pmset_without_battery() {
        assert!(parse_pmset_battery("Now drawing from 'AC Power'\n").is_none());
    }

    // -----------------------------------------------------------------------
    // run_command
    // -----------------------------------------------------------------------

    #[test]
    fn run_command_echo() {
        let out = run_command("echo", &["hello"], Duration::from_secs(5));
        assert_eq!(out.as_deref().map(str::trim), Some("hello"));
    }

    #[test]
    fn run_command_nonexistent() {
        assert!(run_command("/nonexistent/binary", &[], Duration::from_secs(1)).is_none());
    }

    #[test]
    fn run_command_failing_status() {
        assert!(run_command("false", &[], Duration::from_secs(5)).is_none());
    }

    #[test]
    fn run_command_times_out() {
        let err = run_command_output("sleep", &["5"], Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }));
    }

    #[test]
    fn run_command_output_captures_stderr() {
        let out = run_command_output("sh", &["-c", "echo oops >&2; exit 3"], Duration::from_secs(5))
            .unwrap();
        assert!(!out.success());
        assert_eq!(out.stderr.trim(), "oops");
    }
}
