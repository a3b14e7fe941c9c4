//! End-to-end experiment: generate → split → fit → score.

use crate::convergence::{evaluate, ConvergenceReport};
use crate::model::RewardModel;
use crate::split::train_validation_split;
use crate::synthetic::SyntheticGenerator;
use crate::wide_deep::WideDeepBandit;
use bandit_core::config::AppConfig;
use bandit_core::error::BanditResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub model: String,
    pub num_actions: usize,
    pub context_dim: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub convergence: ConvergenceReport,
    pub elapsed_ms: u64,
}

/// A finished run and the model it fitted.
pub struct ExperimentOutcome<M> {
    pub report: ExperimentReport,
    pub model: M,
}

pub struct Experiment {
    config: AppConfig,
}

impl Experiment {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run the experiment with the configured wide & deep bandit.
    pub fn run(&self) -> BanditResult<ExperimentOutcome<WideDeepBandit>> {
        let model = WideDeepBandit::new(
            self.config.synthetic.num_actions,
            self.config.synthetic.context_dim,
            self.config.model.clone(),
        )?;
        self.run_with(model)
    }

    /// Run the experiment with any reward model.
    pub fn run_with<M: RewardModel>(&self, mut model: M) -> BanditResult<ExperimentOutcome<M>> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let synthetic = &self.config.synthetic;

        let mut generator = SyntheticGenerator::new(synthetic.clone())?;
        let rows = generator.generate();
        info!(
            %run_id,
            rows = rows.len(),
            num_actions = synthetic.num_actions,
            context_dim = synthetic.context_dim,
            num_users = synthetic.num_users,
            "Synthetic data generated"
        );

        let split = train_validation_split(rows, &self.config.split)?;
        info!(
            %run_id,
            train_rows = split.train.len(),
            validation_rows = split.validation.len(),
            "Data split"
        );

        let fit_start = Instant::now();
        model.fit(&split.train)?;
        info!(
            %run_id,
            model = %model.name(),
            fit_ms = fit_start.elapsed().as_millis() as u64,
            "Model fitted"
        );

        let convergence = evaluate(&model, &split.train, &split.validation)?;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            %run_id,
            score = convergence.score,
            beats_benchmark = convergence.beats_benchmark(),
            elapsed_ms,
            "Experiment finished"
        );

        let report = ExperimentReport {
            run_id,
            generated_at: Utc::now(),
            model: model.name(),
            num_actions: synthetic.num_actions,
            context_dim: synthetic.context_dim,
            train_rows: split.train.len(),
            validation_rows: split.validation.len(),
            convergence,
            elapsed_ms,
        };
        Ok(ExperimentOutcome { report, model })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::convergence::NaiveBenchmark;
    use bandit_core::config::{SplitConfig, SyntheticConfig};

    fn config() -> AppConfig {
        AppConfig {
            synthetic: SyntheticConfig {
                num_rows: 200,
                num_actions: 2,
                context_dim: 3,
                num_users: 5,
                ..Default::default()
            },
            split: SplitConfig {
                validation_fraction: 0.25,
                seed: 1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_naive_model_scores_zero() {
        let outcome = Experiment::new(config())
            .run_with(NaiveBenchmark::new(2))
            .unwrap();
        let report = outcome.report;
        assert_eq!(report.train_rows, 150);
        assert_eq!(report.validation_rows, 50);
        assert_eq!(report.convergence.score, 0.0);
        assert_eq!(report.model, "naive_benchmark");
        assert_eq!(outcome.model.means(), report.convergence.benchmark_means.as_slice());
    }

    #[test]
    fn test_report_serializes() {
        let outcome = Experiment::new(config())
            .run_with(NaiveBenchmark::new(2))
            .unwrap();
        let json = serde_json::to_value(&outcome.report).unwrap();
        assert_eq!(json["num_actions"], 2);
        assert!(json["convergence"]["improvements"].is_array());
    }
}
