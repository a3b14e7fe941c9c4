//! RMSprop with per-group learning rates and global-norm gradient clipping.

use bandit_core::error::{BanditError, BanditResult};
use ndarray::{ArrayD, ArrayViewMutD, Zip};
use serde::{Deserialize, Serialize};

/// Parameter groups that carry separate learning rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamGroup {
    Wide,
    Deep,
    /// Combining / output heads of the wide+deep network.
    Head,
}

/// Learning rate per parameter group for one optimizer step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupRates {
    pub wide: f64,
    pub deep: f64,
    pub head: f64,
}

impl GroupRates {
    pub const HEAD_LR: f64 = 0.01;

    /// Inverse-time decay: `lr₀ / (1 + decay · step)`.
    pub fn decayed(
        initial_wide: f64,
        decay_wide: f64,
        initial_deep: f64,
        decay_deep: f64,
        step: usize,
    ) -> Self {
        Self {
            wide: initial_wide / (1.0 + decay_wide * step as f64),
            deep: initial_deep / (1.0 + decay_deep * step as f64),
            head: Self::HEAD_LR,
        }
    }

    pub fn rate(&self, group: ParamGroup) -> f64 {
        match group {
            ParamGroup::Wide => self.wide,
            ParamGroup::Deep => self.deep,
            ParamGroup::Head => self.head,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RmsProp {
    alpha: f64,
    eps: f64,
    square_avg: Vec<ArrayD<f64>>,
}

impl Default for RmsProp {
    fn default() -> Self {
        Self::new(0.99, 1e-8)
    }
}

impl RmsProp {
    pub fn new(alpha: f64, eps: f64) -> Self {
        Self {
            alpha,
            eps,
            square_avg: Vec::new(),
        }
    }

    /// Apply one update. `params` and `grads` must line up one-to-one and
    /// keep the same order between calls.
    pub fn step(
        &mut self,
        params: Vec<(ParamGroup, ArrayViewMutD<'_, f64>)>,
        grads: &[ArrayD<f64>],
        rates: &GroupRates,
    ) -> BanditResult<()> {
        if params.len() != grads.len() {
            return Err(BanditError::DimensionMismatch {
                expected: params.len(),
                got: grads.len(),
            });
        }
        if self.square_avg.is_empty() {
            self.square_avg = grads.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
        }
        if self.square_avg.len() != grads.len() {
            return Err(BanditError::DimensionMismatch {
                expected: self.square_avg.len(),
                got: grads.len(),
            });
        }

        let (alpha, eps) = (self.alpha, self.eps);
        for (((group, mut param), grad), avg) in params
            .into_iter()
            .zip(grads.iter())
            .zip(self.square_avg.iter_mut())
        {
            if param.shape() != grad.shape() || avg.shape() != grad.shape() {
                return Err(BanditError::DimensionMismatch {
                    expected: param.len(),
                    got: grad.len(),
                });
            }
            let lr = rates.rate(group);
            Zip::from(&mut param)
                .and(avg)
                .and(grad)
                .for_each(|p, v, &g| {
                    *v = alpha * *v + (1.0 - alpha) * g * g;
                    *p -= lr * g / (v.sqrt() + eps);
                });
        }
        Ok(())
    }
}

/// Rescale gradients so their joint L2 norm is at most `max_norm`.
/// Returns the norm before clipping.
pub fn clip_grad_norm(grads: &mut [ArrayD<f64>], max_norm: f64) -> f64 {
    let total = grads
        .iter()
        .map(|g| g.iter().map(|x| x * x).sum::<f64>())
        .sum::<f64>()
        .sqrt();
    let coef = max_norm / (total + 1e-6);
    if coef < 1.0 {
        for grad in grads.iter_mut() {
            grad.mapv_inplace(|x| x * coef);
        }
    }
    total
}
