use thiserror::Error;

pub type BanditResult<T> = Result<T, BanditError>;

#[derive(Error, Debug)]
pub enum BanditError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Action {action} out of range for {num_actions} actions")]
    ActionOutOfRange { action: usize, num_actions: usize },

    #[error("Action {action} has no rows in the {partition} partition")]
    MissingAction {
        action: usize,
        partition: &'static str,
    },

    #[error("Benchmark error for action {action} is zero, improvement ratio undefined")]
    DegenerateBenchmark { action: usize },

    #[error("Capacity exceeded: memory holds {capacity} rows, {requested} requested")]
    CapacityExceeded { capacity: usize, requested: usize },

    #[error("Dataset is empty")]
    EmptyDataset,

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for BanditError {
    fn from(err: config::ConfigError) -> Self {
        BanditError::Config(err.to_string())
    }
}
