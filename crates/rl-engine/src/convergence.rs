//! Convergence score of a reward model against the naive per-action mean.
//!
//! For every action `a`, `ε_b[a]` is the validation MSE of the train-set mean
//! reward of `a`, and `ε_m[a]` the validation MSE of the model's predicted
//! reward for `a`, both over the validation rows where `a` was played. The
//! score is `S = Σ_a (1 − ε_m[a] / ε_b[a])`; `S > 0` means the model beats
//! the context-free baseline.

use crate::model::RewardModel;
use bandit_core::error::{BanditError, BanditResult};
use bandit_core::types::Observation;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Context-free predictor: the mean train reward of each action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaiveBenchmark {
    means: Vec<f64>,
}

impl NaiveBenchmark {
    pub fn new(num_actions: usize) -> Self {
        Self {
            means: vec![0.0; num_actions],
        }
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }
}

impl RewardModel for NaiveBenchmark {
    fn name(&self) -> String {
        "naive_benchmark".to_string()
    }

    fn num_actions(&self) -> usize {
        self.means.len()
    }

    /// Fails with `MissingAction` when an action never appears in `observations`.
    fn fit(&mut self, observations: &[Observation]) -> BanditResult<()> {
        let num_actions = self.means.len();
        let mut sums = vec![0.0; num_actions];
        let mut counts = vec![0usize; num_actions];
        for obs in observations {
            if obs.action >= num_actions {
                return Err(BanditError::ActionOutOfRange {
                    action: obs.action,
                    num_actions,
                });
            }
            sums[obs.action] += obs.reward;
            counts[obs.action] += 1;
        }
        if let Some(action) = counts.iter().position(|&c| c == 0) {
            return Err(BanditError::MissingAction {
                action,
                partition: "train",
            });
        }
        self.means = sums
            .iter()
            .zip(&counts)
            .map(|(sum, &count)| sum / count as f64)
            .collect();
        Ok(())
    }

    fn expected_values(&self, _user_id: u64, _context: &[f64]) -> BanditResult<Vec<f64>> {
        Ok(self.means.clone())
    }
}

/// Per-action regression error of `model` on `validation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionErrors {
    pub mse: Vec<f64>,
    pub counts: Vec<usize>,
}

/// MSE of the model's prediction for the played action, per action. Every
/// action must appear in `validation`.
pub fn per_action_mse<M: RewardModel + ?Sized>(
    model: &M,
    validation: &[Observation],
    num_actions: usize,
) -> BanditResult<ActionErrors> {
    let mut sq_sums = vec![0.0; num_actions];
    let mut counts = vec![0usize; num_actions];
    for obs in validation {
        if obs.action >= num_actions {
            return Err(BanditError::ActionOutOfRange {
                action: obs.action,
                num_actions,
            });
        }
        let predicted = model.expected_values(obs.user_id, &obs.context)?;
        if predicted.len() != num_actions {
            return Err(BanditError::DimensionMismatch {
                expected: num_actions,
                got: predicted.len(),
            });
        }
        sq_sums[obs.action] += (predicted[obs.action] - obs.reward).powi(2);
        counts[obs.action] += 1;
    }
    if let Some(action) = counts.iter().position(|&c| c == 0) {
        return Err(BanditError::MissingAction {
            action,
            partition: "validation",
        });
    }

    Ok(ActionErrors {
        mse: sq_sums
            .iter()
            .zip(&counts)
            .map(|(sq, &count)| sq / count as f64)
            .collect(),
        counts,
    })
}

/// Improvement term `1 − ε_m[a] / ε_b[a]` of every action.
pub fn improvements(benchmark: &[f64], model: &[f64]) -> BanditResult<Vec<f64>> {
    if benchmark.len() != model.len() {
        return Err(BanditError::DimensionMismatch {
            expected: benchmark.len(),
            got: model.len(),
        });
    }
    benchmark
        .iter()
        .zip(model)
        .enumerate()
        .map(|(action, (&eb, &em))| {
            if eb == 0.0 {
                Err(BanditError::DegenerateBenchmark { action })
            } else {
                Ok(1.0 - em / eb)
            }
        })
        .collect()
}

/// `S = Σ_a (1 − ε_m[a] / ε_b[a])`.
pub fn convergence_score(benchmark: &[f64], model: &[f64]) -> BanditResult<f64> {
    Ok(improvements(benchmark, model)?.iter().sum())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub benchmark_means: Vec<f64>,
    pub benchmark_errors: Vec<f64>,
    pub model_errors: Vec<f64>,
    pub improvements: Vec<f64>,
    pub validation_counts: Vec<usize>,
    pub score: f64,
}

impl ConvergenceReport {
    pub fn beats_benchmark(&self) -> bool {
        self.score > 0.0
    }
}

/// Score a fitted `model` against the naive benchmark built from `train`.
pub fn evaluate<M: RewardModel + ?Sized>(
    model: &M,
    train: &[Observation],
    validation: &[Observation],
) -> BanditResult<ConvergenceReport> {
    let num_actions = model.num_actions();
    let mut benchmark = NaiveBenchmark::new(num_actions);
    benchmark.fit(train)?;

    let benchmark_errors = per_action_mse(&benchmark, validation, num_actions)?;
    let model_errors = per_action_mse(model, validation, num_actions)?;
    let improvements = improvements(&benchmark_errors.mse, &model_errors.mse)?;
    let score: f64 = improvements.iter().sum();

    for (action, term) in improvements.iter().enumerate() {
        debug!(
            action,
            benchmark_mse = benchmark_errors.mse[action],
            model_mse = model_errors.mse[action],
            improvement = term,
            "Per-action error"
        );
    }
    info!(model = %model.name(), score, "Convergence score computed");

    Ok(ConvergenceReport {
        benchmark_means: benchmark.means().to_vec(),
        benchmark_errors: benchmark_errors.mse,
        model_errors: model_errors.mse,
        improvements,
        validation_counts: model_errors.counts,
        score,
    })
}
