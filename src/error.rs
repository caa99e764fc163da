use thiserror::Error;

/// Main error type for the poswatch supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // Process-related errors
    #[error("Failed to spawn start command: {0}")]
    SpawnError(String),

    #[error("Stop command failed: {0}")]
    StopError(String),

    // Filesystem marker errors
    #[error("Marker error for {0}: {1}")]
    MarkerError(String, String),

    // Single-instance guard
    #[error("Another supervisor is already running (PID {0})")]
    AlreadyRunning(u32),

    #[error("PID file error: {0}")]
    PidFileError(String),

    #[error("Signal error: {0}")]
    SignalError(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type alias for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;
