use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};
use crate::process::types::StartOutcome;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Side-effecting start/stop of the supervised application
#[derive(Debug, Clone)]
pub struct ProcessController {
    program: String,
    args: Vec<String>,
    stop_command: String,
    stop_timeout: Duration,
    no_start_marker: PathBuf,
}

impl ProcessController {
    /// Create a controller from the start/stop settings in `config`
    pub fn new(config: &SupervisorConfig) -> Self {
        let mut parts = config.start_command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();

        Self {
            program,
            args: parts.collect(),
            stop_command: config.stop_command.clone(),
            stop_timeout: config.stop_timeout(),
            no_start_marker: config.no_start_marker.clone(),
        }
    }

    /// Get the path to the do-not-start marker
    pub fn no_start_marker(&self) -> &Path {
        &self.no_start_marker
    }

    /// Launch the start command in the background.
    ///
    /// Does nothing when the do-not-start marker exists. The child is handed
    /// to a detached task that reaps it, so this never waits on the
    /// application. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<StartOutcome> {
        if self.no_start_marker.exists() {
            info!("Start suppressed by {}", self.no_start_marker.display());
            return Ok(StartOutcome::Suppressed);
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = command
            .spawn()
            .map_err(|e| SupervisorError::SpawnError(format!("'{}': {}", self.program, e)))?;

        let pid = child.id().ok_or_else(|| {
            SupervisorError::SpawnError(format!("Failed to get PID for '{}'", self.program))
        })?;

        info!("Started '{}' (PID: {})", self.program, pid);

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!("Start command (PID: {}) exited with {}", pid, status),
                Err(e) => warn!("Failed to reap start command (PID: {}): {}", pid, e),
            }
        });

        Ok(StartOutcome::Launched { pid })
    }

    /// Run the stop command through `sh -c` and wait for it, bounded by the
    /// configured stop timeout
    pub async fn stop(&self) -> Result<ExitStatus> {
        info!("Running stop command: {}", self.stop_command);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.stop_command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::StopError(format!("Failed to run stop command: {}", e)))?;

        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                if status.success() {
                    debug!("Stop command finished with {}", status);
                } else {
                    // pkill also exits non-zero when nothing matched
                    warn!("Stop command exited with {}", status);
                }
                Ok(status)
            }
            Ok(Err(e)) => Err(SupervisorError::StopError(format!("Wait failed: {}", e))),
            Err(_) => {
                let _ = child.kill().await;
                Err(SupervisorError::StopError(format!(
                    "Stop command did not finish within {:?}",
                    self.stop_timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config(dir: &TempDir, start: String, stop: String) -> SupervisorConfig {
        SupervisorConfig {
            no_start_marker: dir.path().join("nostart"),
            restart_trigger: dir.path().join("restart"),
            restart_lock: dir.path().join("restart.lock"),
            pid_file: dir.path().join("poswatch.pid"),
            start_command: start,
            stop_command: stop,
            stop_timeout_secs: 5,
            ..SupervisorConfig::default()
        }
    }

    async fn wait_for(path: &Path) -> bool {
        for _ in 0..50 {
            if path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[test]
    fn test_start_command_split() {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(
            &dir,
            "/opt/pos/bin/pos-start --till 3".to_string(),
            "true".to_string(),
        );

        let controller = ProcessController::new(&config);
        assert_eq!(controller.program, "/opt/pos/bin/pos-start");
        assert_eq!(controller.args, vec!["--till", "3"]);
    }

    #[tokio::test]
    async fn test_start_launches_command() {
        let dir = TempDir::new().unwrap();
        let started = dir.path().join("started");
        let config = create_test_config(
            &dir,
            format!("touch {}", started.display()),
            "true".to_string(),
        );

        let outcome = ProcessController::new(&config).start().unwrap();

        assert!(matches!(outcome, StartOutcome::Launched { pid } if pid > 0));
        assert!(wait_for(&started).await);
    }

    #[tokio::test]
    async fn test_start_suppressed_by_marker() {
        let dir = TempDir::new().unwrap();
        let started = dir.path().join("started");
        let config = create_test_config(
            &dir,
            format!("touch {}", started.display()),
            "true".to_string(),
        );
        fs::write(&config.no_start_marker, "").unwrap();

        let outcome = ProcessController::new(&config).start().unwrap();

        assert_eq!(outcome, StartOutcome::Suppressed);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!started.exists());
    }

    #[tokio::test]
    async fn test_start_nonexistent_program() {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(
            &dir,
            "/nonexistent/pos-start".to_string(),
            "true".to_string(),
        );

        let result = ProcessController::new(&config).start();
        assert!(matches!(result, Err(SupervisorError::SpawnError(_))));
    }

    #[tokio::test]
    async fn test_start_does_not_wait_for_child() {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir, "/bin/sleep 5".to_string(), "true".to_string());

        let begin = std::time::Instant::now();
        let outcome = ProcessController::new(&config).start().unwrap();
        assert!(begin.elapsed() < Duration::from_secs(2));

        if let StartOutcome::Launched { pid } = outcome {
            let _ = Command::new("kill").arg(pid.to_string()).status().await;
        }
    }

    #[tokio::test]
    async fn test_stop_runs_synchronously() {
        let dir = TempDir::new().unwrap();
        let stopped = dir.path().join("stopped");
        let config = create_test_config(
            &dir,
            "true".to_string(),
            format!("touch {}", stopped.display()),
        );

        let status = ProcessController::new(&config).stop().await.unwrap();

        assert!(status.success());
        assert!(stopped.exists());
    }

    #[tokio::test]
    async fn test_stop_failure_reports_status() {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir, "true".to_string(), "exit 3".to_string());

        let status = ProcessController::new(&config).stop().await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_stop_timeout() {
        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir, "true".to_string(), "sleep 10".to_string());
        config.stop_timeout_secs = 1;

        let result = ProcessController::new(&config).stop().await;
        assert!(matches!(result, Err(SupervisorError::StopError(_))));
    }
}
