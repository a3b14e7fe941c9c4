//! Wide & deep contextual bandit: a neural reward network learns a
//! representation of (user, context), and a Bayesian linear head on top of
//! it drives Thompson sampling.

use crate::model::RewardModel;
use crate::posterior::BayesianLinearHead;
use bandit_core::config::{ExpectationMethod, SelectionMethod, WideDeepConfig};
use bandit_core::dataset::{ContextualDataset, RunningScaling, ScalingStats};
use bandit_core::error::{BanditError, BanditResult};
use bandit_core::types::{argmax, Observation, UNKNOWN_USER};
use bandit_neural::network::{RewardNetwork, StepStats};
use bandit_neural::optimizer::{GroupRates, RmsProp};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WideDeepBandit {
    config: WideDeepConfig,
    num_actions: usize,
    context_dim: usize,
    network: RewardNetwork,
    optimizer: RmsProp,
    posterior: BayesianLinearHead,
    /// Raw observations.
    data: ContextualDataset,
    /// Column moments of `data`, kept in step with every update.
    scaling: RunningScaling,
    /// Latent representation of every observation, keyed by embedding row.
    latent: ContextualDataset,
    /// User id → embedding row. Row 0 belongs to unknown users.
    user_index: HashMap<u64, usize>,
    t: u64,
    #[serde(skip, default = "entropy_rng")]
    rng: StdRng,
}

fn entropy_rng() -> StdRng {
    StdRng::from_entropy()
}

impl WideDeepBandit {
    pub fn new(
        num_actions: usize,
        context_dim: usize,
        config: WideDeepConfig,
    ) -> BanditResult<Self> {
        config.validate()?;
        if num_actions == 0 {
            return Err(BanditError::Config("num_actions must be positive".to_string()));
        }
        if context_dim == 0 {
            return Err(BanditError::Config("context_dim must be positive".to_string()));
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => entropy_rng(),
        };
        let network = RewardNetwork::build(&config, num_actions, context_dim, &mut rng);
        let latent_dim = network.latent_dim();
        let posterior = BayesianLinearHead::new(
            num_actions,
            latent_dim,
            config.lambda_prior,
            config.a0,
            config.b0,
        );

        info!(
            name = %config.name,
            model_type = %config.model_type,
            combine_method = %config.combine_method,
            num_actions,
            context_dim,
            latent_dim,
            "Wide & deep bandit initialized"
        );

        Ok(Self {
            num_actions,
            context_dim,
            network,
            optimizer: RmsProp::default(),
            posterior,
            data: ContextualDataset::new(context_dim, num_actions),
            scaling: RunningScaling::new(context_dim),
            latent: ContextualDataset::new(latent_dim, num_actions),
            user_index: HashMap::from([(UNKNOWN_USER, 0)]),
            t: 0,
            rng,
            config,
        })
    }

    pub fn config(&self) -> &WideDeepConfig {
        &self.config
    }

    /// Number of observations seen so far.
    pub fn timestep(&self) -> u64 {
        self.t
    }

    pub fn latent_dim(&self) -> usize {
        self.network.latent_dim()
    }

    pub fn data(&self) -> &ContextualDataset {
        &self.data
    }

    pub fn posterior(&self) -> &BayesianLinearHead {
        &self.posterior
    }

    /// Embedding rows in use, including the unknown-user row.
    pub fn known_users(&self) -> usize {
        self.user_index.len()
    }

    /// Choose an action for `user_id` in `context`. Plays round robin until
    /// every action has been pulled `initial_pulls` times.
    pub fn action(
        &mut self,
        user_id: u64,
        context: &[f64],
        method: SelectionMethod,
    ) -> BanditResult<usize> {
        self.check_context(context)?;
        let warmup = self.num_actions as u64 * self.config.initial_pulls;
        if self.t < warmup {
            return Ok((self.t % self.num_actions as u64) as usize);
        }

        let context = self.prepare_context(context, self.config.do_scaling);
        let values = match method {
            SelectionMethod::Forward => {
                self.values_for(user_id, context, ExpectationMethod::Forward)
            }
            SelectionMethod::PosteriorMean => {
                self.values_for(user_id, context, ExpectationMethod::Blr)
            }
            SelectionMethod::ThompsonSampling => {
                let z = self.representation_row(self.user_row(user_id), context);
                self.posterior.sample(&mut self.rng, z.view())
            }
        };
        argmax(&values).ok_or_else(|| BanditError::Numerical("no action values".to_string()))
    }

    /// Record one observation. Retrains the network every `update_freq_nn`
    /// rows and refreshes the posterior every `update_freq_lr` rows.
    pub fn update(&mut self, obs: &Observation) -> BanditResult<()> {
        self.data.add_observation(obs)?;
        self.scaling.push(&obs.context);
        self.t += 1;
        self.register_user(obs.user_id);

        let retrain = self.t % self.config.update_freq_nn == 0;
        if retrain {
            self.train(self.config.num_epochs)?;
        }
        if self.t % self.config.update_freq_lr == 0 {
            self.refresh_posterior()?;
        }

        let context = self.prepare_context(&obs.context, self.config.do_scaling && self.t > 1);
        let row = self.user_row(obs.user_id);
        let z = self.representation_row(row, context);
        self.latent.add(row as u64, &z.to_vec(), obs.action, obs.reward)?;

        if retrain {
            self.replace_latent()?;
        }
        Ok(())
    }

    /// Expected reward per action. `scale` standardises the context with the
    /// statistics of the observations seen so far.
    pub fn expected_values(
        &self,
        user_id: u64,
        context: &[f64],
        scale: bool,
        method: ExpectationMethod,
    ) -> BanditResult<Vec<f64>> {
        self.check_context(context)?;
        let context = self.prepare_context(context, scale);
        Ok(self.values_for(user_id, context, method))
    }

    /// Run `num_steps` minibatch steps over every observation. Each batch
    /// leads with the `update_freq_nn` most recent rows.
    pub fn train(&mut self, num_steps: usize) -> BanditResult<()> {
        // A single row has no spread to scale by.
        if self.data.len() < 2 {
            return Ok(());
        }
        let scaling = self.active_scaling();
        let n_recent = usize::try_from(self.config.update_freq_nn).unwrap_or(usize::MAX);

        let mut last: Option<StepStats> = None;
        for step in 0..num_steps {
            let batch = self.data.batch_with_weights(
                &mut self.rng,
                self.config.batch_size,
                n_recent,
                scaling.as_ref(),
            )?;
            let users: Vec<usize> = batch.user_ids.iter().map(|&u| self.user_row(u)).collect();
            let rates = GroupRates::decayed(
                self.config.initial_lr_wide,
                self.config.lr_decay_rate_wide,
                self.config.initial_lr_deep,
                self.config.lr_decay_rate_deep,
                step,
            );
            last = Some(self.network.train_step(
                &users,
                &batch.contexts,
                &batch.rewards,
                &batch.weights,
                &mut self.optimizer,
                &rates,
                self.config.max_grad_norm,
            )?);
        }

        if let Some(stats) = last {
            debug!(
                t = self.t,
                steps = num_steps,
                loss = stats.loss,
                grad_norm = stats.grad_norm,
                "Network trained"
            );
        }
        Ok(())
    }

    /// Retrain the network on every stored observation, then rebuild the
    /// latent representations and the posterior.
    pub fn retrain(&mut self) -> BanditResult<()> {
        self.train(self.config.num_epochs)?;
        self.replace_latent()?;
        self.refresh_posterior()
    }

    /// Recompute the posterior of every action played so far.
    pub fn refresh_posterior(&mut self) -> BanditResult<()> {
        let actions = self.latent.played_actions();
        for &action in &actions {
            let slice = self.latent.data_for_action(action);
            self.posterior
                .update(action, slice.contexts.view(), slice.rewards.view())?;
        }
        debug!(t = self.t, actions = actions.len(), "Posterior refreshed");
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> BanditResult<()> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Restore a saved bandit. Sampling continues from a fresh entropy seed.
    pub fn load(path: impl AsRef<Path>) -> BanditResult<Self> {
        let file = File::open(path)?;
        let bandit: Self = serde_json::from_reader(BufReader::new(file))?;
        Ok(bandit)
    }

    // ─── Internals ──────────────────────────────────────────────────────

    fn check_context(&self, context: &[f64]) -> BanditResult<()> {
        if context.len() != self.context_dim {
            return Err(BanditError::DimensionMismatch {
                expected: self.context_dim,
                got: context.len(),
            });
        }
        Ok(())
    }

    fn active_scaling(&self) -> Option<ScalingStats> {
        self.config.do_scaling.then(|| self.scaling.stats())
    }

    fn prepare_context(&self, context: &[f64], scale: bool) -> Array1<f64> {
        if scale {
            Array1::from(self.scaling.stats().scale_row(context))
        } else {
            Array1::from(context.to_vec())
        }
    }

    fn values_for(&self, user_id: u64, context: Array1<f64>, method: ExpectationMethod) -> Vec<f64> {
        let row = self.user_row(user_id);
        match method {
            ExpectationMethod::Blr => {
                let z = self.representation_row(row, context);
                self.posterior.expected_values(z.view())
            }
            ExpectationMethod::Forward => {
                let contexts = context.insert_axis(Axis(0));
                self.network.predict(&[row], &contexts).row(0).to_vec()
            }
        }
    }

    fn representation_row(&self, row: usize, context: Array1<f64>) -> Array1<f64> {
        let contexts = context.insert_axis(Axis(0));
        self.network
            .representation(&[row], &contexts)
            .index_axis_move(Axis(0), 0)
    }

    fn user_row(&self, user_id: u64) -> usize {
        self.user_index.get(&user_id).copied().unwrap_or(0)
    }

    fn register_user(&mut self, user_id: u64) {
        if self.user_index.contains_key(&user_id) {
            return;
        }
        let next = self.user_index.len();
        let capacity = self.network.embed_size();
        if capacity > 0 && next >= capacity {
            debug!(
                user_id,
                capacity, "Embedding table full; user shares the unknown-user row"
            );
            return;
        }
        self.user_index.insert(user_id, next);
    }

    /// Recompute the latent representation of every stored observation.
    fn replace_latent(&mut self) -> BanditResult<()> {
        if self.latent.is_empty() {
            return Ok(());
        }
        let contexts: Array2<f64> = match self.active_scaling() {
            Some(stats) => stats.scale_matrix(self.data.contexts()),
            None => self.data.contexts().to_owned(),
        };
        let rows: Vec<usize> = self.latent.user_ids().iter().map(|&r| r as usize).collect();
        let z = self.network.representation(&rows, &contexts);
        self.latent.replace_contexts(z)
    }
}

impl RewardModel for WideDeepBandit {
    fn name(&self) -> String {
        format!(
            "{} ({}, {})",
            self.config.name, self.config.model_type, self.config.combine_method
        )
    }

    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn fit(&mut self, observations: &[Observation]) -> BanditResult<()> {
        for obs in observations {
            self.update(obs)?;
        }
        self.refresh_posterior()
    }

    fn expected_values(&self, user_id: u64, context: &[f64]) -> BanditResult<Vec<f64>> {
        WideDeepBandit::expected_values(
            self,
            user_id,
            context,
            self.config.do_scaling,
            self.config.prediction_method,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bandit_core::config::{CombineMethod, ModelType};

    fn small_config() -> WideDeepConfig {
        WideDeepConfig {
            wide_embed_size: 4,
            wide_embed_dim: 3,
            deep_layer_sizes: vec![5],
            update_freq_nn: 10,
            update_freq_lr: 10,
            num_epochs: 5,
            initial_pulls: 2,
            batch_size: 16,
            seed: Some(5),
            ..Default::default()
        }
    }

    fn observation(i: usize) -> Observation {
        let x = i as f64 / 10.0;
        let action = i % 2;
        let reward = if action == 0 { x } else { 1.0 - x };
        Observation::new((i % 3) as u64 + 1, vec![x, -x], action, reward)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let cfg = WideDeepConfig {
            batch_size: 0,
            ..small_config()
        };
        assert!(matches!(
            WideDeepBandit::new(2, 2, cfg),
            Err(BanditError::Config(_))
        ));
        assert!(WideDeepBandit::new(0, 2, small_config()).is_err());
    }

    #[test]
    fn test_round_robin_warmup() {
        let mut bandit = WideDeepBandit::new(2, 2, small_config()).unwrap();
        let mut chosen = Vec::new();
        for i in 0..4 {
            let obs = observation(i);
            chosen.push(
                bandit
                    .action(obs.user_id, &obs.context, SelectionMethod::ThompsonSampling)
                    .unwrap(),
            );
            bandit.update(&obs).unwrap();
        }
        assert_eq!(chosen, vec![0, 1, 0, 1]);

        // Past the warm-up every method returns a valid action.
        for method in [
            SelectionMethod::ThompsonSampling,
            SelectionMethod::PosteriorMean,
            SelectionMethod::Forward,
        ] {
            let a = bandit.action(1, &[0.1, -0.1], method).unwrap();
            assert!(a < 2);
        }
    }

    #[test]
    fn test_update_tracks_latent_rows_and_posterior() {
        let mut bandit = WideDeepBandit::new(2, 2, small_config()).unwrap();
        for i in 0..20 {
            bandit.update(&observation(i)).unwrap();
        }
        assert_eq!(bandit.timestep(), 20);
        assert_eq!(bandit.data().len(), 20);
        assert_eq!(bandit.latent.len(), 20);
        assert_eq!(bandit.latent.row_width(), bandit.latent_dim());
        // Posterior refreshed at t = 10 and t = 20.
        let a0 = bandit.posterior().posterior(0).unwrap().a;
        assert!(a0 > bandit.config().a0);
    }

    #[test]
    fn test_cached_scaling_follows_observations() {
        let mut bandit = WideDeepBandit::new(2, 2, small_config()).unwrap();
        for i in 0..25 {
            bandit.update(&observation(i)).unwrap();
        }
        assert_eq!(bandit.scaling.count(), 25);

        let full = bandit.data().scaling_stats();
        let cached = bandit.active_scaling().unwrap();
        for col in 0..2 {
            assert!((full.means[col] - cached.means[col]).abs() < 1e-9);
            assert!((full.stds[col] - cached.stds[col]).abs() < 1e-9);
        }

        let unscaled = WideDeepBandit::new(
            2,
            2,
            WideDeepConfig {
                do_scaling: false,
                ..small_config()
            },
        )
        .unwrap();
        assert!(unscaled.active_scaling().is_none());
    }

    #[test]
    fn test_user_index_overflow_shares_unknown_row() {
        let mut bandit = WideDeepBandit::new(2, 2, small_config()).unwrap();
        for user in 1..=6 {
            bandit.update(&Observation::new(user, vec![0.0, 1.0], 0, 1.0)).unwrap();
        }
        // Embedding holds four rows: unknown user plus three real users.
        assert_eq!(bandit.known_users(), 4);
        assert_eq!(bandit.user_row(3), 3);
        assert_eq!(bandit.user_row(6), 0);
        assert_eq!(bandit.user_row(999), 0);
    }

    #[test]
    fn test_update_rejects_bad_observation_without_advancing() {
        let mut bandit = WideDeepBandit::new(2, 2, small_config()).unwrap();
        let bad = Observation::new(1, vec![0.0], 0, 1.0);
        assert!(bandit.update(&bad).is_err());
        let out_of_range = Observation::new(1, vec![0.0, 0.0], 7, 1.0);
        assert!(bandit.update(&out_of_range).is_err());
        assert_eq!(bandit.timestep(), 0);
    }

    #[test]
    fn test_expected_values_methods() {
        for model_type in [ModelType::Wide, ModelType::Deep, ModelType::WideDeep] {
            let cfg = WideDeepConfig {
                model_type,
                combine_method: CombineMethod::ConcatReward,
                ..small_config()
            };
            let mut bandit = WideDeepBandit::new(2, 2, cfg).unwrap();
            bandit.fit(&(0..30).map(observation).collect::<Vec<_>>()).unwrap();

            for method in [ExpectationMethod::Blr, ExpectationMethod::Forward] {
                let vals = bandit.expected_values(2, &[0.3, -0.3], true, method).unwrap();
                assert_eq!(vals.len(), 2);
                assert!(vals.iter().all(|v| v.is_finite()));
            }
            assert!(bandit.expected_values(2, &[0.3], true, ExpectationMethod::Blr).is_err());
        }
    }

    #[test]
    fn test_retrain_keeps_state_consistent() {
        let mut bandit = WideDeepBandit::new(2, 2, small_config()).unwrap();
        for i in 0..15 {
            bandit.update(&observation(i)).unwrap();
        }
        bandit.retrain().unwrap();
        assert_eq!(bandit.latent.len(), 15);
        assert_eq!(bandit.posterior().posterior(1).unwrap().a, bandit.config().a0 + 3.5);
    }

    #[test]
    fn test_save_and_load() {
        let mut bandit = WideDeepBandit::new(2, 2, small_config()).unwrap();
        bandit.fit(&(0..12).map(observation).collect::<Vec<_>>()).unwrap();

        let path = std::env::temp_dir().join(format!("wide_deep_{}.json", std::process::id()));
        bandit.save(&path).unwrap();
        let restored = WideDeepBandit::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(restored.timestep(), 12);
        assert_eq!(restored.known_users(), bandit.known_users());
        let before = RewardModel::expected_values(&bandit, 1, &[0.2, -0.2]).unwrap();
        let after = RewardModel::expected_values(&restored, 1, &[0.2, -0.2]).unwrap();
        for (b, a) in before.iter().zip(&after) {
            assert!((b - a).abs() < 1e-9);
        }
    }
}
