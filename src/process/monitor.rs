use crate::process::types::{ProcessEntry, ProcessMarkerSet};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;

/// Source of process table snapshots
pub trait ProcessTable {
    /// Take a fresh snapshot. An unreadable table yields an empty list.
    fn snapshot(&mut self) -> Vec<ProcessEntry>;
}

/// Process table read through sysinfo
pub struct SystemProcessTable {
    system: System,
}

impl SystemProcessTable {
    /// Create a table backed by a fresh sysinfo `System`
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcessTable {
    fn snapshot(&mut self) -> Vec<ProcessEntry> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );

        self.system
            .processes()
            .iter()
            .map(|(pid, process)| {
                let command_line = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");

                ProcessEntry::new(
                    pid.as_u32(),
                    process.name().to_string_lossy(),
                    command_line,
                )
            })
            .collect()
    }
}

/// Reports whether every required process marker is present
pub struct LivenessChecker<T = SystemProcessTable> {
    table: T,
    /// PID excluded from matching so our own command line never counts
    own_pid: u32,
}

impl LivenessChecker<SystemProcessTable> {
    /// Create a checker over the live process table
    pub fn new() -> Self {
        Self::with_table(SystemProcessTable::new())
    }
}

impl Default for LivenessChecker<SystemProcessTable> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ProcessTable> LivenessChecker<T> {
    /// Create a checker over a custom process table
    pub fn with_table(table: T) -> Self {
        Self {
            table,
            own_pid: std::process::id(),
        }
    }

    /// True iff each marker matches at least one live process.
    ///
    /// An empty snapshot counts as "not running".
    pub fn is_alive(&mut self, markers: &ProcessMarkerSet) -> bool {
        let entries: Vec<ProcessEntry> = self
            .table
            .snapshot()
            .into_iter()
            .filter(|entry| entry.pid != self.own_pid)
            .collect();

        if entries.is_empty() {
            debug!("Process table is empty or unreadable");
            return false;
        }

        markers.iter().all(|marker| {
            let found = entries.iter().any(|entry| entry.matches(marker));
            if !found {
                debug!("No live process matches marker '{}'", marker);
            }
            found
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    /// Fixed table for tests
    struct StaticTable(Vec<ProcessEntry>);

    impl ProcessTable for StaticTable {
        fn snapshot(&mut self) -> Vec<ProcessEntry> {
            self.0.clone()
        }
    }

    fn markers() -> ProcessMarkerSet {
        ProcessMarkerSet::new("pos-main", "pos-terminal")
    }

    #[test]
    fn test_alive_when_all_markers_present() {
        let mut checker = LivenessChecker::with_table(StaticTable(vec![
            ProcessEntry::new(10, "pos-main", "/opt/pos/pos-main"),
            ProcessEntry::new(11, "pos-terminal", "/opt/pos/pos-terminal 1"),
            ProcessEntry::new(12, "pos-terminal", "/opt/pos/pos-terminal 2"),
        ]));

        assert!(checker.is_alive(&markers()));
    }

    #[test]
    fn test_not_alive_when_one_marker_missing() {
        let mut checker = LivenessChecker::with_table(StaticTable(vec![ProcessEntry::new(
            10,
            "pos-main",
            "/opt/pos/pos-main",
        )]));

        assert!(!checker.is_alive(&markers()));
    }

    #[test]
    fn test_empty_table_is_not_alive() {
        let mut checker = LivenessChecker::with_table(StaticTable(vec![]));
        assert!(!checker.is_alive(&markers()));
    }

    #[test]
    fn test_own_process_is_ignored() {
        let own = std::process::id();
        let mut checker = LivenessChecker::with_table(StaticTable(vec![ProcessEntry::new(
            own,
            "poswatch",
            "poswatch pos-main pos-terminal",
        )]));

        assert!(!checker.is_alive(&markers()));
    }

    #[tokio::test]
    async fn test_system_table_sees_real_process() {
        let mut child = Command::new("/bin/sleep")
            .arg("7331")
            .spawn()
            .expect("Failed to spawn process");

        let mut checker = LivenessChecker::new();
        let markers = ProcessMarkerSet::new("sleep", "7331");
        assert!(checker.is_alive(&markers));

        child.kill().await.expect("Failed to kill process");
        let _ = child.wait().await;
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        assert!(!checker.is_alive(&ProcessMarkerSet::new("sleep", "7331")));
    }
}
