//! Integration test for the full generate → split → fit → score flow.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bandit_core::config::{
        AppConfig, CombineMethod, ModelType, SplitConfig, SyntheticConfig, WideDeepConfig,
    };
    use bandit_core::error::{BanditError, BanditResult};
    use bandit_core::types::Observation;
    use bandit_rl_engine::{
        Experiment, NaiveBenchmark, RewardModel, SyntheticGenerator, WideDeepBandit,
    };

    fn small_config(model_type: ModelType, combine_method: CombineMethod) -> AppConfig {
        AppConfig {
            synthetic: SyntheticConfig {
                num_rows: 300,
                num_actions: 2,
                context_dim: 3,
                num_users: 8,
                noise_std: 0.1,
                user_effect_std: 0.5,
                seed: 42,
            },
            split: SplitConfig {
                validation_fraction: 0.2,
                seed: 7,
            },
            model: WideDeepConfig {
                model_type,
                combine_method,
                wide_embed_size: 16,
                wide_embed_dim: 8,
                deep_layer_sizes: vec![16],
                update_freq_nn: 50,
                update_freq_lr: 50,
                num_epochs: 10,
                batch_size: 32,
                initial_pulls: 5,
                seed: Some(3),
                ..Default::default()
            },
        }
    }

    /// Knows the generator's true expected rewards.
    struct Oracle {
        generator: SyntheticGenerator,
    }

    impl RewardModel for Oracle {
        fn name(&self) -> String {
            "oracle".to_string()
        }

        fn num_actions(&self) -> usize {
            self.generator.config().num_actions
        }

        fn fit(&mut self, _observations: &[Observation]) -> BanditResult<()> {
            Ok(())
        }

        fn expected_values(&self, user_id: u64, context: &[f64]) -> BanditResult<Vec<f64>> {
            Ok(self.generator.true_expected_values(user_id, context))
        }
    }

    #[test]
    fn test_wide_deep_experiment_end_to_end() {
        for combine in [
            CombineMethod::Add,
            CombineMethod::ConcatReward,
            CombineMethod::ConcatRewardLlr,
            CombineMethod::ConcatRepresentationLlr,
        ] {
            let outcome = Experiment::new(small_config(ModelType::WideDeep, combine))
                .run()
                .unwrap();
            let report = &outcome.report;

            assert_eq!(report.train_rows, 240);
            assert_eq!(report.validation_rows, 60);
            assert_eq!(report.convergence.improvements.len(), 2);
            assert_eq!(report.convergence.validation_counts.iter().sum::<usize>(), 60);
            assert!(report.convergence.score.is_finite(), "{combine:?}");
            assert_eq!(outcome.model.timestep(), 240);
        }
    }

    #[test]
    fn test_wide_and_deep_only_models_run() {
        for model_type in [ModelType::Wide, ModelType::Deep] {
            let outcome = Experiment::new(small_config(model_type, CombineMethod::default()))
                .run()
                .unwrap();
            assert!(outcome.report.convergence.score.is_finite());
            assert!(outcome.report.model.contains(&model_type.to_string()));
        }
    }

    #[test]
    fn test_trained_models_beat_naive_benchmark() {
        for (model_type, combine) in [
            (ModelType::WideDeep, CombineMethod::ConcatRepresentationLlr),
            (ModelType::Deep, CombineMethod::default()),
        ] {
            let mut config = AppConfig::default();
            config.synthetic.num_rows = 2_000;
            config.model.model_type = model_type;
            config.model.combine_method = combine;

            let report = Experiment::new(config).run().unwrap().report;
            let convergence = &report.convergence;
            assert!(
                convergence.beats_benchmark(),
                "{model_type} scored {}",
                convergence.score
            );
            assert!(convergence.score > 1.0, "{model_type} scored {}", convergence.score);
            if model_type == ModelType::WideDeep {
                for (model, benchmark) in convergence
                    .model_errors
                    .iter()
                    .zip(&convergence.benchmark_errors)
                {
                    assert!(model < benchmark);
                }
            }
        }
    }

    #[test]
    fn test_benchmark_scores_zero_and_oracle_scores_action_count() {
        let mut config = small_config(ModelType::WideDeep, CombineMethod::default());
        config.synthetic.noise_std = 0.0;
        let experiment = Experiment::new(config.clone());

        let naive = experiment.run_with(NaiveBenchmark::new(2)).unwrap();
        assert_eq!(naive.report.convergence.score, 0.0);

        let oracle = Oracle {
            generator: SyntheticGenerator::new(config.synthetic).unwrap(),
        };
        let perfect = experiment.run_with(oracle).unwrap();
        assert_eq!(perfect.report.convergence.model_errors, vec![0.0, 0.0]);
        assert_eq!(perfect.report.convergence.score, 2.0);
        assert!(perfect.report.convergence.beats_benchmark());
    }

    #[test]
    fn test_fitted_model_survives_save_and_load() {
        let outcome = Experiment::new(small_config(ModelType::WideDeep, CombineMethod::default()))
            .run()
            .unwrap();
        let path = std::env::temp_dir().join(format!(
            "experiment_flow_{}_{}.json",
            std::process::id(),
            outcome.report.run_id
        ));
        outcome.model.save(&path).unwrap();
        let restored = WideDeepBandit::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let context = [0.3, -1.2, 0.5];
        let before = RewardModel::expected_values(&outcome.model, 4, &context).unwrap();
        let after = RewardModel::expected_values(&restored, 4, &context).unwrap();
        for (b, a) in before.iter().zip(&after) {
            assert!((b - a).abs() < 1e-9);
        }
    }

    #[test]
    fn test_invalid_split_is_reported() {
        let mut config = small_config(ModelType::Deep, CombineMethod::default());
        config.split.validation_fraction = 1.5;
        let result = Experiment::new(config).run_with(NaiveBenchmark::new(2));
        assert!(matches!(result, Err(BanditError::Config(_))));
    }
}
