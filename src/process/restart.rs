use crate::error::{Result, SupervisorError};
use chrono::{NaiveTime, Timelike};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const SECONDS_PER_DAY: i64 = 86_400;

/// Seconds since local midnight at minute granularity (`hour*3600 + minute*60`).
///
/// Seconds within the minute are dropped, so every tick inside the restart
/// minute lands on the same value.
pub fn seconds_of_day(time: NaiveTime) -> u32 {
    time.hour() * 3600 + time.minute() * 60
}

/// Daily restart window: `[target - half_width, target + half_width]`,
/// inclusive on both ends and wrapped around midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartWindow {
    target: u32,
    half_width: u64,
}

impl RestartWindow {
    /// Window centred on `restart_at`, widened by one poll interval each side
    pub fn new(restart_at: NaiveTime, poll_interval: Duration) -> Self {
        Self {
            target: seconds_of_day(restart_at),
            half_width: poll_interval.as_secs(),
        }
    }

    /// Check whether `seconds` (since midnight) falls inside the window
    pub fn contains_seconds(&self, seconds: u32) -> bool {
        // A window at least a day wide covers every time of day
        if self.half_width.saturating_mul(2).saturating_add(1) >= SECONDS_PER_DAY as u64 {
            return true;
        }

        let half = self.half_width as i64;
        let target = self.target as i64;
        let now = seconds as i64;
        let start = (target - half).rem_euclid(SECONDS_PER_DAY);
        let end = (target + half).rem_euclid(SECONDS_PER_DAY);

        if start <= end {
            start <= now && now <= end
        } else {
            // Straddles midnight
            now >= start || now <= end
        }
    }

    /// Check whether a time of day falls inside the window
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.contains_seconds(seconds_of_day(time))
    }
}

/// Outcome of one scheduler evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Restart(RestartReason),
    NoRestart,
}

impl RestartDecision {
    /// True for either restart reason
    pub fn is_restart(&self) -> bool {
        matches!(self, RestartDecision::Restart(_))
    }
}

/// Why a restart was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// Operator placed the manual trigger marker
    Manual,
    /// The daily restart window was entered
    Scheduled,
}

impl std::fmt::Display for RestartReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartReason::Manual => write!(f, "manual trigger"),
            RestartReason::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// Filesystem-backed debounce lock.
///
/// Lives on disk so a supervisor that is killed and restarted inside the
/// window does not fire a second scheduled restart.
#[derive(Debug, Clone)]
pub struct DebounceLock {
    path: PathBuf,
}

impl DebounceLock {
    /// Create a lock handle for `path`; nothing is touched on disk
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Check whether the lock file currently exists
    pub fn is_held(&self) -> bool {
        self.path.exists()
    }

    /// Create the lock file with exclusive-create semantics.
    ///
    /// Returns `Ok(false)` when the lock was already held.
    pub fn engage(&self) -> Result<bool> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(marker_error(&self.path, e)),
        }
    }

    /// Remove the lock file. A missing file is not an error.
    pub fn release(&self) -> Result<()> {
        remove_marker(&self.path)
    }

    /// Get the path to the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Decides, once per tick, whether the application must be restarted
#[derive(Debug, Clone)]
pub struct RestartScheduler {
    window: RestartWindow,
    trigger: PathBuf,
    lock: DebounceLock,
}

impl RestartScheduler {
    /// Create a scheduler over `window` using the given trigger and lock files
    pub fn new<P1, P2>(window: RestartWindow, trigger: P1, lock: P2) -> Self
    where
        P1: AsRef<Path>,
        P2: AsRef<Path>,
    {
        Self {
            window,
            trigger: trigger.as_ref().to_path_buf(),
            lock: DebounceLock::new(lock),
        }
    }

    /// Get the restart window
    pub fn window(&self) -> &RestartWindow {
        &self.window
    }

    /// Get the debounce lock
    pub fn lock(&self) -> &DebounceLock {
        &self.lock
    }

    /// Check whether an operator has placed the manual trigger file
    pub fn trigger_pending(&self) -> bool {
        self.trigger.exists()
    }

    /// Evaluate the trigger marker, the window and the debounce lock at `now`.
    ///
    /// Marker I/O failures are logged and never abort the decision.
    pub fn decide(&self, now: NaiveTime) -> RestartDecision {
        if self.trigger_pending() {
            info!("Manual restart trigger found at {}", self.trigger.display());
            if let Err(e) = remove_marker(&self.trigger) {
                warn!("{}", e);
            }
            self.engage_lock();
            return RestartDecision::Restart(RestartReason::Manual);
        }

        let in_window = self.window.contains(now);
        let held = self.lock.is_held();

        match (in_window, held) {
            (true, false) => {
                info!("Entered scheduled restart window at {}", now.format("%H:%M:%S"));
                self.engage_lock();
                RestartDecision::Restart(RestartReason::Scheduled)
            }
            (true, true) => {
                debug!("Inside restart window, restart already handled");
                RestartDecision::NoRestart
            }
            (false, true) => {
                debug!("Left restart window, releasing debounce lock");
                if let Err(e) = self.lock.release() {
                    warn!("{}", e);
                }
                RestartDecision::NoRestart
            }
            (false, false) => RestartDecision::NoRestart,
        }
    }

    fn engage_lock(&self) {
        if let Err(e) = self.lock.engage() {
            warn!("{}", e);
        }
    }
}

fn remove_marker(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(marker_error(path, e)),
    }
}

fn marker_error(path: &Path, e: std::io::Error) -> SupervisorError {
    SupervisorError::MarkerError(path.display().to_string(), e.to_string())
}
