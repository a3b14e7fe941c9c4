//! Model dispatch and the masked-MSE training step.

use crate::model::{DeepModel, WideDeepModel, WideModel};
use crate::optimizer::{clip_grad_norm, GroupRates, ParamGroup, RmsProp};
use bandit_core::config::{ModelType, WideDeepConfig};
use bandit_core::error::{BanditError, BanditResult};
use ndarray::{Array2, ArrayViewMutD};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The reward network behind a wide & deep bandit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RewardNetwork {
    Wide(WideModel),
    Deep(DeepModel),
    WideDeep(WideDeepModel),
}

/// Loss and pre-clipping gradient norm of one optimizer step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepStats {
    pub loss: f64,
    pub grad_norm: f64,
}

impl RewardNetwork {
    pub fn build<R: Rng + ?Sized>(
        config: &WideDeepConfig,
        num_actions: usize,
        context_dim: usize,
        rng: &mut R,
    ) -> Self {
        let network = match config.model_type {
            ModelType::Wide => RewardNetwork::Wide(WideModel::new(
                config.wide_embed_size,
                config.wide_embed_dim,
                num_actions,
                rng,
            )),
            ModelType::Deep => RewardNetwork::Deep(DeepModel::new(
                context_dim,
                &config.deep_layer_sizes,
                num_actions,
                rng,
            )),
            ModelType::WideDeep => RewardNetwork::WideDeep(WideDeepModel::new(
                context_dim,
                &config.deep_layer_sizes,
                num_actions,
                config.wide_embed_size,
                config.wide_embed_dim,
                config.combine_method,
                rng,
            )),
        };
        debug!(
            model_type = %config.model_type,
            num_actions,
            context_dim,
            latent_dim = network.latent_dim(),
            "Reward network built"
        );
        network
    }

    pub fn model_type(&self) -> ModelType {
        match self {
            RewardNetwork::Wide(_) => ModelType::Wide,
            RewardNetwork::Deep(_) => ModelType::Deep,
            RewardNetwork::WideDeep(_) => ModelType::WideDeep,
        }
    }

    pub fn num_actions(&self) -> usize {
        match self {
            RewardNetwork::Wide(m) => m.num_actions(),
            RewardNetwork::Deep(m) => m.num_actions(),
            RewardNetwork::WideDeep(m) => m.num_actions(),
        }
    }

    pub fn latent_dim(&self) -> usize {
        match self {
            RewardNetwork::Wide(m) => m.embed_dim(),
            RewardNetwork::Deep(m) => m.latent_dim(),
            RewardNetwork::WideDeep(m) => m.latent_dim(),
        }
    }

    /// Rows in the user embedding table, or zero for context-only models.
    pub fn embed_size(&self) -> usize {
        match self {
            RewardNetwork::Wide(m) => m.embed_size(),
            RewardNetwork::Deep(_) => 0,
            RewardNetwork::WideDeep(m) => m.embed_size(),
        }
    }

    /// Expected reward per action, `batch × num_actions`. `users` are
    /// embedding rows, one per context row.
    pub fn predict(&self, users: &[usize], contexts: &Array2<f64>) -> Array2<f64> {
        match self {
            RewardNetwork::Wide(m) => m.forward(users).output,
            RewardNetwork::Deep(m) => m.forward(contexts).output,
            RewardNetwork::WideDeep(m) => m.predict(users, contexts),
        }
    }

    /// Last-layer representation fed to the Bayesian linear head.
    pub fn representation(&self, users: &[usize], contexts: &Array2<f64>) -> Array2<f64> {
        match self {
            RewardNetwork::Wide(m) => m.representation(users),
            RewardNetwork::Deep(m) => m.representation(contexts),
            RewardNetwork::WideDeep(m) => m.representation(users, contexts),
        }
    }

    /// One RMSprop step on the squared error of the played actions only.
    /// `rewards` and `weights` are `batch × num_actions`; `weights` is the
    /// one-hot mask of the played action.
    #[allow(clippy::too_many_arguments)]
    pub fn train_step(
        &mut self,
        users: &[usize],
        contexts: &Array2<f64>,
        rewards: &Array2<f64>,
        weights: &Array2<f64>,
        optimizer: &mut RmsProp,
        rates: &GroupRates,
        max_grad_norm: f64,
    ) -> BanditResult<StepStats> {
        let (loss, mut grads) = match self {
            RewardNetwork::Wide(m) => {
                let pass = m.forward(users);
                let (loss, grad) = masked_mse(&pass.output, rewards, weights)?;
                (loss, m.backward(&pass, Some(&grad), None))
            }
            RewardNetwork::Deep(m) => {
                let pass = m.forward(contexts);
                let (loss, grad) = masked_mse(&pass.output, rewards, weights)?;
                (loss, m.backward(&pass, Some(&grad), None))
            }
            RewardNetwork::WideDeep(m) => {
                let pass = m.forward(users, contexts);
                let (targets, mask) = m.training_targets(rewards, weights);
                let (loss, grad) = masked_mse(&pass.output, &targets, &mask)?;
                (loss, m.backward(&pass, &grad))
            }
        };
        if !loss.is_finite() {
            return Err(BanditError::Numerical(format!(
                "training loss is not finite: {loss}"
            )));
        }

        let grad_norm = clip_grad_norm(&mut grads, max_grad_norm);
        optimizer.step(self.params_mut(), &grads, rates)?;
        Ok(StepStats { loss, grad_norm })
    }

    fn params_mut(&mut self) -> Vec<(ParamGroup, ArrayViewMutD<'_, f64>)> {
        match self {
            RewardNetwork::Wide(m) => m.params_mut(),
            RewardNetwork::Deep(m) => m.params_mut(),
            RewardNetwork::WideDeep(m) => m.params_mut(),
        }
    }
}

/// `mean((ŷ ⊙ w − y)²)` over every cell, and its gradient w.r.t. `ŷ`.
fn masked_mse(
    output: &Array2<f64>,
    targets: &Array2<f64>,
    mask: &Array2<f64>,
) -> BanditResult<(f64, Array2<f64>)> {
    if output.dim() != targets.dim() || output.dim() != mask.dim() {
        return Err(BanditError::DimensionMismatch {
            expected: output.len(),
            got: targets.len(),
        });
    }
    let count = output.len().max(1) as f64;
    let residual = output * mask - targets;
    let loss = residual.iter().map(|r| r * r).sum::<f64>() / count;
    let grad = residual * mask * (2.0 / count);
    Ok((loss, grad))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bandit_core::config::CombineMethod;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config(model_type: ModelType, combine_method: CombineMethod) -> WideDeepConfig {
        WideDeepConfig {
            model_type,
            combine_method,
            wide_embed_size: 4,
            wide_embed_dim: 3,
            deep_layer_sizes: vec![6],
            ..Default::default()
        }
    }

    #[test]
    fn test_masked_mse_ignores_unplayed_actions() {
        let output = array![[1.0, 5.0], [7.0, 2.0]];
        let targets = array![[0.0, 0.0], [0.0, 1.0]];
        let mask = array![[1.0, 0.0], [0.0, 1.0]];
        let (loss, grad) = masked_mse(&output, &targets, &mask).unwrap();
        // residuals: 1, 0, 0, 1
        assert!((loss - 0.5).abs() < 1e-12);
        assert_eq!(grad, array![[0.5, 0.0], [0.0, 0.5]]);
    }

    #[test]
    fn test_build_matches_model_type() {
        let mut rng = StdRng::seed_from_u64(0);
        for (model_type, latent) in [
            (ModelType::Wide, 3),
            (ModelType::Deep, 6),
            (ModelType::WideDeep, 9),
        ] {
            let cfg = small_config(model_type, CombineMethod::Add);
            let net = RewardNetwork::build(&cfg, 2, 5, &mut rng);
            assert_eq!(net.model_type(), model_type);
            assert_eq!(net.latent_dim(), latent);
            assert_eq!(net.latent_dim(), cfg.latent_dim());
            assert_eq!(net.num_actions(), 2);

            let contexts = Array2::zeros((3, 5));
            assert_eq!(net.predict(&[0, 1, 3], &contexts).dim(), (3, 2));
            assert_eq!(net.representation(&[0, 1, 3], &contexts).dim(), (3, latent));
        }
    }

    #[test]
    fn test_training_reduces_loss() {
        let combines = [
            CombineMethod::Add,
            CombineMethod::ConcatReward,
            CombineMethod::ConcatRewardLlr,
            CombineMethod::ConcatRepresentationLlr,
        ];
        for combine in combines {
            let mut rng = StdRng::seed_from_u64(21);
            let cfg = small_config(ModelType::WideDeep, combine);
            let mut net = RewardNetwork::build(&cfg, 2, 2, &mut rng);
            let mut opt = RmsProp::default();
            let rates = GroupRates::decayed(0.01, 0.0, 0.01, 0.0, 0);

            let users = vec![1, 2, 3, 1];
            let contexts = array![[0.5, -0.5], [1.0, 0.0], [-1.0, 0.5], [0.0, 1.0]];
            let rewards = array![[1.0, 0.0], [0.0, -1.0], [0.5, 0.0], [0.0, 0.2]];
            let weights = array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]];

            let first = net
                .train_step(&users, &contexts, &rewards, &weights, &mut opt, &rates, 5.0)
                .unwrap();
            let mut last = first;
            for _ in 0..300 {
                last = net
                    .train_step(&users, &contexts, &rewards, &weights, &mut opt, &rates, 5.0)
                    .unwrap();
            }
            assert!(
                last.loss < first.loss,
                "{combine:?}: loss {} did not drop below {}",
                last.loss,
                first.loss
            );
        }
    }

    #[test]
    fn test_train_step_rejects_mismatched_targets() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = small_config(ModelType::Deep, CombineMethod::Add);
        let mut net = RewardNetwork::build(&cfg, 2, 2, &mut rng);
        let mut opt = RmsProp::default();
        let rates = GroupRates::decayed(0.01, 0.0, 0.01, 0.0, 0);
        let result = net.train_step(
            &[0],
            &array![[0.0, 1.0]],
            &array![[1.0, 0.0, 0.0]],
            &array![[1.0, 0.0, 0.0]],
            &mut opt,
            &rates,
            5.0,
        );
        assert!(matches!(result, Err(BanditError::DimensionMismatch { .. })));
    }
}
