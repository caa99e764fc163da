use crate::error::{Result, SupervisorError};
use crate::process::ProcessMarkerSet;
use chrono::NaiveTime;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// File names tried, in order, when no explicit config path is given.
/// `$HOME/.config/poswatch/poswatch.conf` is inserted after the first entry.
const LOCAL_CONFIG: &str = "poswatch.conf";
const SYSTEM_CONFIGS: [&str; 2] = ["/etc/poswatch/poswatch.conf", "/etc/poswatch.conf"];

/// Longest accepted poll interval (one day)
pub const MAX_POLL_INTERVAL_SECS: u64 = 86_400;

/// Supervisor configuration, loaded once at startup and never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisorConfig {
    /// Seconds between ticks; 0 runs a single pass
    pub poll_interval_secs: u64,

    /// Loop forever when true, otherwise run a single pass
    pub daemon: bool,

    /// Daily scheduled restart time (24h, local time)
    pub restart_at: NaiveTime,

    /// Existence of this file blocks every start
    pub no_start_marker: PathBuf,

    /// Existence of this file forces one restart and is then removed
    pub restart_trigger: PathBuf,

    /// Debounce lock held while inside the restart window after a restart
    pub restart_lock: PathBuf,

    /// Single-instance guard
    pub pid_file: PathBuf,

    /// Executable (plus optional whitespace-separated arguments) launched on start
    pub start_command: String,

    /// Shell command run synchronously on stop
    pub stop_command: String,

    /// Upper bound on how long the stop command may block a tick
    pub stop_timeout_secs: u64,

    /// Processes that must be present for the application to count as running
    pub markers: ProcessMarkerSet,

    /// Emit timestamped progress lines on stdout
    pub verbose: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            daemon: true,
            restart_at: NaiveTime::MIN,
            no_start_marker: PathBuf::from("/tmp/poswatch.nostart"),
            restart_trigger: PathBuf::from("/tmp/poswatch.restart"),
            restart_lock: PathBuf::from("/tmp/poswatch.lock"),
            pid_file: PathBuf::from("/tmp/poswatch.pid"),
            start_command: "/opt/pos/bin/pos-start".to_string(),
            stop_command: "pkill -f pos-".to_string(),
            stop_timeout_secs: 30,
            markers: ProcessMarkerSet::new("pos-main", "pos-terminal"),
            verbose: false,
        }
    }
}

impl SupervisorConfig {
    /// Default candidate list, highest priority first
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(home) = std::env::var_os("HOME") {
            paths.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("poswatch")
                    .join(LOCAL_CONFIG),
            );
        }
        paths.extend(SYSTEM_CONFIGS.iter().map(PathBuf::from));
        paths
    }

    /// Load the first readable file among `candidates` over the defaults.
    ///
    /// Candidates that are missing or cannot be read are skipped. Returns the
    /// config together with the path it came from, or `None` when only
    /// defaults apply. A readable file with invalid values is still an error.
    pub fn load(candidates: &[PathBuf]) -> Result<(Self, Option<PathBuf>)> {
        for path in candidates.iter().filter(|p| p.is_file()) {
            match std::fs::read_to_string(path) {
                Ok(contents) => {
                    let config = Self::from_contents(&contents)?;
                    return Ok((config, Some(path.clone())));
                }
                Err(e) => warn!("Skipping unreadable config file {}: {}", path.display(), e),
            }
        }

        let config = Self::default();
        config.validate()?;
        Ok((config, None))
    }

    /// Load an explicitly requested file; unlike [`load`](Self::load) the file must exist
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SupervisorError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_contents(&contents)
    }

    /// Parse and validate file contents
    fn from_contents(contents: &str) -> Result<Self> {
        let config = Self::parse(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `key: value` lines onto the defaults
    pub fn parse(contents: &str) -> Result<Self> {
        let mut config = Self::default();

        for (index, raw) in contents.lines().enumerate() {
            let line_no = index + 1;
            let Some((key, value)) = split_line(raw) else {
                continue;
            };

            config.apply(&normalize_key(key), value, line_no)?;
        }

        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str, line_no: usize) -> Result<()> {
        match key {
            "pollinterval" | "interval" | "checkinterval" => {
                self.poll_interval_secs = parse_secs(key, value, line_no)?
            }
            "daemon" | "daemonmode" => self.daemon = parse_bool(key, value, line_no)?,
            "restarttime" | "restartat" => self.restart_at = parse_time(key, value, line_no)?,
            "nostart" | "donotstart" | "nostartfile" => self.no_start_marker = PathBuf::from(value),
            "restarttrigger" | "manualrestart" | "restartfile" => {
                self.restart_trigger = PathBuf::from(value)
            }
            "restartlock" | "lockfile" => self.restart_lock = PathBuf::from(value),
            "pidfile" => self.pid_file = PathBuf::from(value),
            "startcommand" | "start" => self.start_command = value.to_string(),
            "stopcommand" | "stop" => self.stop_command = value.to_string(),
            "stoptimeout" => self.stop_timeout_secs = parse_secs(key, value, line_no)?,
            "mainprocess" => self.markers.main = value.to_string(),
            "terminalprocess" => self.markers.terminal = value.to_string(),
            "verbose" => self.verbose = parse_bool(key, value, line_no)?,
            _ => {}
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(SupervisorError::ConfigValidationError(format!(
                "poll interval must be at most {} seconds",
                MAX_POLL_INTERVAL_SECS
            )));
        }

        if self.start_command.split_whitespace().next().is_none() {
            return Err(SupervisorError::ConfigValidationError(
                "start command must not be empty".to_string(),
            ));
        }

        if self.stop_command.trim().is_empty() {
            return Err(SupervisorError::ConfigValidationError(
                "stop command must not be empty".to_string(),
            ));
        }

        if self.markers.iter().any(|m| m.trim().is_empty()) {
            return Err(SupervisorError::ConfigValidationError(
                "process markers must not be empty".to_string(),
            ));
        }

        let marker_paths = [
            &self.no_start_marker,
            &self.restart_trigger,
            &self.restart_lock,
            &self.pid_file,
        ];
        for (i, a) in marker_paths.iter().enumerate() {
            if a.as_os_str().is_empty() {
                return Err(SupervisorError::ConfigValidationError(
                    "marker paths must not be empty".to_string(),
                ));
            }
            if marker_paths[i + 1..].contains(a) {
                return Err(SupervisorError::ConfigValidationError(format!(
                    "marker path used twice: {}",
                    a.display()
                )));
            }
        }

        Ok(())
    }

    /// True when the loop should run exactly one tick
    pub fn single_pass(&self) -> bool {
        !self.daemon || self.poll_interval_secs == 0
    }

    /// Get poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Get stop timeout as Duration
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Strip comments and split `key: value`. `None` for blank or malformed lines.
fn split_line(raw: &str) -> Option<(&str, &str)> {
    let line = match raw.find('#') {
        Some(idx) => &raw[..idx],
        None => raw,
    };

    let (key, rest) = line.split_once(':')?;
    let key = key.trim();
    // Require whitespace after the colon
    if key.is_empty() || !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let value = rest.trim();
    if value.is_empty() {
        return None;
    }
    Some((key, value))
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' ' | '\t'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn invalid(key: &str, value: &str, line_no: usize, expected: &str) -> SupervisorError {
    SupervisorError::InvalidConfig(format!(
        "line {}: invalid value '{}' for '{}' (expected {})",
        line_no, value, key, expected
    ))
}

fn parse_bool(key: &str, value: &str, line_no: usize) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value, line_no, "a boolean")),
    }
}

fn parse_secs(key: &str, value: &str, line_no: usize) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| invalid(key, value, line_no, "whole seconds"))
}

fn parse_time(key: &str, value: &str, line_no: usize) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| invalid(key, value, line_no, "HH:MM"))
}
