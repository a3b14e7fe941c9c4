//! Neural reward models for the wide & deep bandit: layers with explicit
//! backward passes, RMSprop, and the dense linear algebra used by the
//! Bayesian head.

pub mod layers;
pub mod linalg;
pub mod model;
pub mod network;
pub mod optimizer;

pub use model::{DeepModel, WideDeepModel, WideModel};
pub use network::{RewardNetwork, StepStats};
pub use optimizer::{GroupRates, ParamGroup, RmsProp};
