// CLI module - process entrypoint

use crate::config::SupervisorConfig;
use crate::daemon::PidFile;
use crate::error::{Result, SupervisorError};
use crate::logs;
use crate::supervisor::Supervisor;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::oneshot;
use tracing::{error, info};

/// poswatch - keeps a point-of-sale application running and restarts it daily
#[derive(Parser, Debug)]
#[command(name = "poswatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Read this config file instead of searching the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Run the CLI application
    pub fn run() -> Result<()> {
        let cli = Cli::parse();
        cli.execute()
    }

    /// Resolve the configuration this invocation would use
    pub fn load_config(&self) -> Result<(SupervisorConfig, Option<PathBuf>)> {
        match &self.config {
            Some(path) => Ok((SupervisorConfig::from_file(path)?, Some(path.clone()))),
            None => SupervisorConfig::load(&SupervisorConfig::candidate_paths()),
        }
    }

    fn execute(&self) -> Result<()> {
        let (config, source) = self.load_config()?;

        if self.print_config {
            let json = serde_json::to_string_pretty(&config)
                .map_err(|e| SupervisorError::SerializationError(e.to_string()))?;
            println!("{}", json);
            return Ok(());
        }

        logs::init(config.verbose);
        match &source {
            Some(path) => info!("Loaded configuration from {}", path.display()),
            None => info!("No configuration file found, using defaults"),
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        runtime.block_on(supervise(config))
    }
}

async fn supervise(config: SupervisorConfig) -> Result<()> {
    let pid_file = PidFile::with_path(&config.pid_file);
    pid_file.acquire()?;

    let shutdown = match setup_signal_handlers() {
        Ok(rx) => rx,
        Err(e) => {
            let _ = pid_file.release();
            return Err(e);
        }
    };

    let mut supervisor = Supervisor::new(config);
    supervisor.run(shutdown).await;

    if let Err(e) = pid_file.release() {
        error!("{}", e);
    }
    info!("Supervisor stopped");
    Ok(())
}

/// Resolve the returned receiver on SIGTERM or SIGINT
#[cfg(unix)]
fn setup_signal_handlers() -> Result<oneshot::Receiver<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let (tx, rx) = oneshot::channel();
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| SupervisorError::SignalError(format!("SIGTERM handler: {}", e)))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| SupervisorError::SignalError(format!("SIGINT handler: {}", e)))?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        let _ = tx.send(());
    });

    Ok(rx)
}

#[cfg(not(unix))]
fn setup_signal_handlers() -> Result<oneshot::Receiver<()>> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C");
        }
        let _ = tx.send(());
    });
    Ok(rx)
}
