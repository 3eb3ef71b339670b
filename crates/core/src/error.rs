use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("trigger interval must be at least 1ms")]
    ZeroTriggerInterval,
    #[error("cycle interval must be at least 1ms")]
    ZeroCycleInterval,
    #[error("history capacity must be at least 1 entry")]
    ZeroHistoryCapacity,
    #[error("invalid profiler config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("profiler is already running")]
    AlreadyRunning,
    #[error("failed to spawn profiler thread: {0}")]
    Spawn(#[source] std::io::Error),
}
