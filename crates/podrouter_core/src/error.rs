//! Engine Error Types

use thiserror::Error;

/// Errors that can occur in the routing engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to spawn control thread: {0}")]
    ThreadSpawnError(String),

    #[error("Engine already shut down")]
    ShutDown,

    #[error("Platform error: {0}")]
    PlatformError(#[from] podrouter_platform::PlatformError),

    #[error("Channel send error - receiver dropped")]
    ChannelSendError,
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors from reading or writing the settings file
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Could not determine config path")]
    NoConfigPath,

    #[error("Settings IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
