//! Wide & deep contextual bandit with a Bayesian linear head, synthetic
//! bandit data, and convergence scoring against a naive per-action baseline.

pub mod convergence;
pub mod model;
pub mod pipeline;
pub mod posterior;
pub mod split;
pub mod synthetic;
pub mod wide_deep;

pub use convergence::{convergence_score, evaluate, ConvergenceReport, NaiveBenchmark};
pub use model::RewardModel;
pub use pipeline::{Experiment, ExperimentOutcome, ExperimentReport};
pub use posterior::BayesianLinearHead;
pub use split::{train_validation_split, DataSplit};
pub use synthetic::SyntheticGenerator;
pub use wide_deep::WideDeepBandit;
