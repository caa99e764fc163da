use serde::{Deserialize, Serialize};

/// Identifiers that must each appear in the live process table for the
/// point-of-sale application to count as running
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMarkerSet {
    /// Marker for the main application process
    pub main: String,
    /// Marker for the terminal worker process(es)
    pub terminal: String,
}

impl ProcessMarkerSet {
    /// Create a marker set from the main and terminal markers
    pub fn new(main: impl Into<String>, terminal: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            terminal: terminal.into(),
        }
    }

    /// Iterate over both markers, main first
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        [self.main.as_str(), self.terminal.as_str()].into_iter()
    }
}

/// One row of a process table snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    /// Arguments joined with single spaces
    pub command_line: String,
}

impl ProcessEntry {
    /// Create a process table row
    pub fn new(pid: u32, name: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            command_line: command_line.into(),
        }
    }

    /// True when `marker` is a substring of the name or the command line
    pub fn matches(&self, marker: &str) -> bool {
        !marker.is_empty() && (self.name.contains(marker) || self.command_line.contains(marker))
    }
}

/// Result of a [`ProcessController::start`](crate::process::ProcessController::start) call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Start command was launched in the background
    Launched { pid: u32 },
    /// The do-not-start marker exists
    Suppressed,
}

impl std::fmt::Display for StartOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartOutcome::Launched { pid } => write!(f, "launched (pid {})", pid),
            StartOutcome::Suppressed => write!(f, "suppressed"),
        }
    }
}
