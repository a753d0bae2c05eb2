use school_shared::ConfigError;

/// Errors raised while building a tank
#[derive(Debug, thiserror::Error)]
pub enum TankError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("invalid tank configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("{0} worker thread(s) panicked during the frame")]
    WorkerPanicked(usize),
}
