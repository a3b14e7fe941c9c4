pub mod config;
pub mod dataset;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use dataset::{Batch, ContextualDataset, RunningScaling, ScalingStats};
pub use error::{BanditError, BanditResult};
pub use types::Observation;
