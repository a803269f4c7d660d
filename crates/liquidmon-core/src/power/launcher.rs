//! Launching and killing the privileged sampler.
//!
//! [`SamplerCommand`] records program, arguments and redirection targets as
//! data. Shell and AppleScript text is produced from it in one place, with
//! every argument quoted, instead of being assembled ad hoc by callers.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::SamplerConfig;
use crate::platform::helpers::{CommandError, CommandOutput, run_command_output};

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to start elevation helper: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("privilege elevation denied: {0}")]
    Denied(String),
    #[error("elevation prompt timed out after {0:?}")]
    TimedOut(Duration),
    #[error("could not parse sampler pid from {0:?}")]
    InvalidPid(String),
    #[error("failed to stop sampler pid {pid}: {reason}")]
    Terminate { pid: u32, reason: String },
    #[error("a privileged session is already active")]
    AlreadyActive,
    #[error("session was stopped while elevation was pending")]
    Cancelled,
}

impl From<CommandError> for LaunchError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Spawn { source, .. } => Self::Spawn(source),
            CommandError::TimedOut { timeout, .. } => Self::TimedOut(timeout),
            CommandError::Wait { source, .. } => Self::Spawn(source),
        }
    }
}

/// The long-running sampler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

/// POSIX single-quote a word.
pub fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

fn applescript_quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', r"\\").replace('"', "\\\""))
}

impl SamplerCommand {
    /// `powermetrics -i <ms> --format plist -n 0 --buffer-size 0
    /// --show-initial-usage -s <samplers>`
    pub fn from_config(config: &SamplerConfig) -> Self {
        let args = [
            "-i".to_string(),
            config.interval_ms.to_string(),
            "--format".to_string(),
            "plist".to_string(),
            "-n".to_string(),
            "0".to_string(),
            "--buffer-size".to_string(),
            "0".to_string(),
            "--show-initial-usage".to_string(),
            "-s".to_string(),
            config.samplers.join(","),
        ];
        Self {
            program: config.program.clone(),
            args: Vec::from(args),
            stdout_path: config.output_path.clone(),
            stderr_path: config.error_log_path.clone(),
        }
    }

    /// Detached shell invocation that prints the background pid.
    pub fn shell_line(&self) -> String {
        let mut words = vec![shell_quote(&self.program)];
        words.extend(self.args.iter().map(|a| shell_quote(a)));
        format!(
            "nohup {} < /dev/null > {} 2> {} & echo $!",
            words.join(" "),
            shell_quote(&self.stdout_path.to_string_lossy()),
            shell_quote(&self.stderr_path.to_string_lossy()),
        )
    }

    /// `do shell script "<shell line>" with administrator privileges`.
    pub fn applescript_source(&self) -> String {
        elevated_script(&self.shell_line())
    }
}

fn elevated_script(shell: &str) -> String {
    format!("do shell script {} with administrator privileges", applescript_quote(shell))
}

/// Parse the pid echoed by `echo $!` (last non-empty line).
pub fn parse_pid(stdout: &str) -> Result<u32, LaunchError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    line.parse::<u32>()
        .ok()
        .filter(|&pid| pid > 0)
        .ok_or_else(|| LaunchError::InvalidPid(stdout.trim().to_string()))
}

fn check_output(out: CommandOutput) -> Result<String, LaunchError> {
    if out.success() {
        Ok(out.stdout)
    } else {
        let reason = out.stderr.trim();
        Err(LaunchError::Denied(if reason.is_empty() {
            format!("exit status {}", out.status)
        } else {
            reason.to_string()
        }))
    }
}

/// Starts and stops the sampler with elevated rights.
pub trait PrivilegedLauncher: Send + Sync {
    /// Start the sampler detached; returns its pid.
    fn launch(&self, command: &SamplerCommand) -> Result<u32, LaunchError>;

    /// Kill a previously launched sampler.
    fn terminate(&self, pid: u32) -> Result<(), LaunchError>;
}

/// Elevation through the system authentication dialog (`osascript`).
#[derive(Debug, Clone)]
pub struct OsascriptLauncher {
    timeout: Duration,
}

impl OsascriptLauncher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl PrivilegedLauncher for OsascriptLauncher {
    fn launch(&self, command: &SamplerCommand) -> Result<u32, LaunchError> {
        let script = command.applescript_source();
        log::info!("requesting elevation to start {}", command.program);
        let out = run_command_output("/usr/bin/osascript", &["-e", &script], self.timeout)?;
        parse_pid(&check_output(out)?)
    }

    fn terminate(&self, pid: u32) -> Result<(), LaunchError> {
        let script = elevated_script(&format!("kill {pid}"));
        let out = run_command_output("/usr/bin/osascript", &["-e", &script], self.timeout)?;
        check_output(out).map(|_| ()).map_err(|e| LaunchError::Terminate {
            pid,
            reason: e.to_string(),
        })
    }
}

/// Non-interactive `sudo -n`, for hosts with a matching sudoers rule.
#[derive(Debug, Clone)]
pub struct SudoLauncher {
    timeout: Duration,
}

impl SudoLauncher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl PrivilegedLauncher for SudoLauncher {
    fn launch(&self, command: &SamplerCommand) -> Result<u32, LaunchError> {
        let line = command.shell_line();
        let out = run_command_output("sudo", &["-n", "sh", "-c", &line], self.timeout)?;
        parse_pid(&check_output(out)?)
    }

    fn terminate(&self, pid: u32) -> Result<(), LaunchError> {
        let pid_arg = pid.to_string();
        let out = run_command_output("sudo", &["-n", "kill", &pid_arg], self.timeout)?;
        check_output(out).map(|_| ()).map_err(|e| LaunchError::Terminate {
            pid,
            reason: e.to_string(),
        })
    }
}

/// The launcher for the compile target.
pub fn default_launcher(timeout: Duration) -> Box<dyn PrivilegedLauncher> {
    if cfg!(target_os = "macos") {
        Box::new(OsascriptLauncher::new(timeout))
    } else {
        Box::new(SudoLauncher::new(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> SamplerCommand {
        SamplerCommand::from_config(&SamplerConfig::default())
    }

    #[test]
    fn args_from_default_config() {
        let c = command();
        assert_eq!(c.program, "/usr/bin/powermetrics");
        assert_eq!(c.args[..2], ["-i".to_string(), "1000".to_string()]);
        assert_eq!(
            c.args.last().map(String::as_str),
            Some("cpu_power,gpu_power,thermal,battery,ane_power,sfi")
        );
    }

    #[test]
    fn shell_line_is_detached_and_quoted() {
        let line = command().shell_line();
        assert!(line.starts_with("nohup '/usr/bin/powermetrics' '-i' '1000'"));
        assert!(line.contains("< /dev/null > '/tmp/liquidmonitor_metrics.plist' 2> '/tmp/liquidmonitor_error.log'"));
        assert!(line.ends_with("& echo $!"));
    }

    #[test]
    fn quoting_neutralises_metacharacters() {
        assert_eq!(shell_quote("a'b"), r"'a'\''b'");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }

    #[test]
    fn applescript_escapes_quotes() {
        let script = elevated_script(r#"echo "hi" \ there"#);
        assert_eq!(
            script,
            r#"do shell script "echo \"hi\" \\ there" with administrator privileges"#
        );
    }

    #[test]
    fn pid_parsing() {
        assert_eq!(parse_pid("4242\n").unwrap(), 4242);
        assert_eq!(parse_pid("nohup: ignoring input\n  777  \n\n").unwrap(), 777);
        assert!(matches!(parse_pid("not a pid"), Err(LaunchError::InvalidPid(_))));
        assert!(matches!(parse_pid(""), Err(LaunchError::InvalidPid(_))));
        assert!(matches!(parse_pid("0"), Err(LaunchError::InvalidPid(_))));
    }

    #[test]
    fn command_errors_map_to_launch_errors() {
        let err: LaunchError = CommandError::TimedOut {
            program: "osascript".into(),
            timeout: Duration::from_secs(1),
        }
        .into();
        assert!(matches!(err, LaunchError::TimedOut(_)));
    }
}
