use crate::config::SupervisorConfig;
use crate::process::{
    LivenessChecker, ProcessController, ProcessMarkerSet, ProcessTable, RestartDecision,
    RestartReason, RestartScheduler, RestartWindow, StartOutcome, SystemProcessTable,
};
use chrono::{Local, NaiveTime};
use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Branch taken by a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Running and no restart due
    Healthy,
    /// Not running; start command launched
    Started,
    /// Not running, but the do-not-start marker blocked the start
    StartSuppressed,
    /// Not running and the start command failed to launch
    StartFailed,
    /// Stop then start was performed
    Restarted(RestartReason),
}

/// Polling loop tying liveness, scheduling and process control together
pub struct Supervisor<T: ProcessTable = SystemProcessTable> {
    config: SupervisorConfig,
    liveness: LivenessChecker<T>,
    scheduler: RestartScheduler,
    controller: ProcessController,
}

impl Supervisor<SystemProcessTable> {
    /// Create a supervisor that reads the live process table
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_liveness(config, LivenessChecker::new())
    }
}

impl<T: ProcessTable> Supervisor<T> {
    /// Create a supervisor with a custom liveness checker
    pub fn with_liveness(config: SupervisorConfig, liveness: LivenessChecker<T>) -> Self {
        let window = RestartWindow::new(config.restart_at, config.poll_interval());
        let scheduler =
            RestartScheduler::new(window, &config.restart_trigger, &config.restart_lock);
        let controller = ProcessController::new(&config);

        Self {
            config,
            liveness,
            scheduler,
            controller,
        }
    }

    /// Get the configuration this supervisor was built from
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Get the process markers checked each tick
    pub fn markers(&self) -> &ProcessMarkerSet {
        &self.config.markers
    }

    /// Run ticks until `shutdown` fires, or exactly once in single-pass mode
    pub async fn run(&mut self, mut shutdown: oneshot::Receiver<()>) {
        if self.config.single_pass() {
            info!("Running a single pass");
            self.tick().await;
            return;
        }

        let interval = self.config.poll_interval();
        info!(
            "Starting supervisor (poll interval: {}s, restart at {})",
            interval.as_secs(),
            self.config.restart_at.format("%H:%M")
        );

        loop {
            self.tick().await;

            tokio::select! {
                _ = sleep(interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested, leaving supervisor loop");
                    break;
                }
            }
        }
    }

    /// One tick at the current local time
    pub async fn tick(&mut self) -> TickOutcome {
        self.tick_at(Local::now().time()).await
    }

    /// One tick as if the local time were `now`
    pub async fn tick_at(&mut self, now: NaiveTime) -> TickOutcome {
        let alive = self.liveness.is_alive(&self.config.markers);
        let decision = self.scheduler.decide(now);
        debug!(
            "Tick at {}: alive={}, decision={:?}",
            now.format("%H:%M:%S"),
            alive,
            decision
        );

        match decision {
            RestartDecision::Restart(reason) => {
                info!("Restarting application ({})", reason);
                if let Err(e) = self.controller.stop().await {
                    warn!("{}", e);
                }
                self.start();
                TickOutcome::Restarted(reason)
            }
            RestartDecision::NoRestart if !alive => {
                info!("Application is not running");
                self.start()
            }
            RestartDecision::NoRestart => TickOutcome::Healthy,
        }
    }

    fn start(&self) -> TickOutcome {
        match self.controller.start() {
            Ok(StartOutcome::Launched { .. }) => TickOutcome::Started,
            Ok(StartOutcome::Suppressed) => TickOutcome::StartSuppressed,
            Err(e) => {
                error!("{}", e);
                TickOutcome::StartFailed
            }
        }
    }
}
