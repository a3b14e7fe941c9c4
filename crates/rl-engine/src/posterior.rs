//! Bayesian linear regression over last-layer representations, one
//! Normal-Inverse-Gamma posterior per action.

use bandit_core::error::{BanditError, BanditResult};
use bandit_neural::linalg::{sample_multivariate_normal, spd_inverse};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;
use rand_distr::{Distribution, Gamma, StandardNormal};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// `β | σ² ~ N(mu, σ² cov)`, `σ² ~ InvGamma(a, b)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPosterior {
    pub mu: Array1<f64>,
    pub cov: Array2<f64>,
    pub precision: Array2<f64>,
    pub a: f64,
    pub b: f64,
}

impl ActionPosterior {
    fn prior(dim: usize, lambda_prior: f64, a0: f64, b0: f64) -> Self {
        Self {
            mu: Array1::zeros(dim),
            cov: Array2::eye(dim) / lambda_prior,
            precision: Array2::eye(dim) * lambda_prior,
            a: a0,
            b: b0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesianLinearHead {
    dim: usize,
    lambda_prior: f64,
    a0: f64,
    b0: f64,
    actions: Vec<ActionPosterior>,
}

impl BayesianLinearHead {
    pub fn new(num_actions: usize, dim: usize, lambda_prior: f64, a0: f64, b0: f64) -> Self {
        Self {
            dim,
            lambda_prior,
            a0,
            b0,
            actions: (0..num_actions)
                .map(|_| ActionPosterior::prior(dim, lambda_prior, a0, b0))
                .collect(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_actions(&self) -> usize {
        self.actions.len()
    }

    pub fn posterior(&self, action: usize) -> Option<&ActionPosterior> {
        self.actions.get(action)
    }

    /// Recompute the posterior of `action` from every `(z, y)` pair where it
    /// was played. The prior mean is zero.
    pub fn update(
        &mut self,
        action: usize,
        z: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> BanditResult<()> {
        let num_actions = self.actions.len();
        if action >= num_actions {
            return Err(BanditError::ActionOutOfRange {
                action,
                num_actions,
            });
        }
        if z.ncols() != self.dim {
            return Err(BanditError::DimensionMismatch {
                expected: self.dim,
                got: z.ncols(),
            });
        }
        if z.nrows() != y.len() {
            return Err(BanditError::DimensionMismatch {
                expected: z.nrows(),
                got: y.len(),
            });
        }

        let precision = z.t().dot(&z) + Array2::<f64>::eye(self.dim) * self.lambda_prior;
        let cov = spd_inverse(&precision).ok_or_else(|| {
            BanditError::Numerical(format!(
                "posterior precision for action {action} is not positive definite"
            ))
        })?;
        let mu = cov.dot(&z.t().dot(&y));

        let a = self.a0 + z.nrows() as f64 / 2.0;
        let b = self.b0 + 0.5 * (y.dot(&y) - mu.dot(&precision.dot(&mu)));

        self.actions[action] = ActionPosterior {
            mu,
            cov,
            precision,
            a,
            b,
        };
        Ok(())
    }

    /// Posterior mean reward per action: `mu_a · z`.
    pub fn expected_values(&self, z: ArrayView1<'_, f64>) -> Vec<f64> {
        self.actions.iter().map(|p| p.mu.dot(&z)).collect()
    }

    /// One Thompson draw per action: `σ² = b / Gamma(a, 1)`,
    /// `β ~ N(mu, σ² cov)`, value `β · z`. Falls back to `β ~ N(0, I)` for
    /// every action when any draw fails.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, z: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut betas = Vec::with_capacity(self.actions.len());
        for (action, posterior) in self.actions.iter().enumerate() {
            match Self::sample_beta(rng, posterior) {
                Some(beta) => betas.push(beta),
                None => {
                    warn!(
                        action,
                        a = posterior.a,
                        b = posterior.b,
                        "Posterior sampling failed; drawing from the standard normal prior"
                    );
                    betas = (0..self.actions.len())
                        .map(|_| Array1::from_shape_fn(self.dim, |_| StandardNormal.sample(rng)))
                        .collect();
                    break;
                }
            }
        }
        betas.iter().map(|beta| beta.dot(&z)).collect()
    }

    fn sample_beta<R: Rng + ?Sized>(rng: &mut R, posterior: &ActionPosterior) -> Option<Array1<f64>> {
        let gamma = Gamma::new(posterior.a, 1.0).ok()?;
        let sigma2 = posterior.b / gamma.sample(rng);
        if !sigma2.is_finite() || sigma2 <= 0.0 {
            return None;
        }
        sample_multivariate_normal(rng, &posterior.mu, &(&posterior.cov * sigma2))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_prior_state() {
        let head = BayesianLinearHead::new(2, 3, 0.25, 6.0, 6.0);
        let p = head.posterior(1).unwrap();
        assert_eq!(p.mu, Array1::<f64>::zeros(3));
        assert_eq!(p.cov[[0, 0]], 4.0);
        assert_eq!(p.precision[[2, 2]], 0.25);
        assert_eq!((p.a, p.b), (6.0, 6.0));
        assert_eq!(head.expected_values(array![1.0, 2.0, 3.0].view()), vec![0.0, 0.0]);
    }

    #[test]
    fn test_update_matches_closed_form() {
        let mut head = BayesianLinearHead::new(2, 2, 1.0, 6.0, 6.0);
        let z = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let y = array![1.0, 2.0, 3.0];
        head.update(0, z.view(), y.view()).unwrap();

        // precision = ZᵀZ + I = [[3, 1], [1, 3]]; Zᵀy = [4, 5]
        let p = head.posterior(0).unwrap();
        assert_eq!(p.precision, array![[3.0, 1.0], [1.0, 3.0]]);
        // cov = 1/8 [[3, -1], [-1, 3]] → mu = [7/8, 11/8]
        assert!((p.mu[0] - 0.875).abs() < 1e-12);
        assert!((p.mu[1] - 1.375).abs() < 1e-12);
        assert!((p.a - 7.5).abs() < 1e-12);
        // yᵀy = 14, muᵀ P mu = mu · [4, 5] = 10.375
        assert!((p.b - (6.0 + 0.5 * (14.0 - 10.375))).abs() < 1e-12);

        // Untouched action keeps its prior.
        assert_eq!(head.posterior(1).unwrap().a, 6.0);

        let vals = head.expected_values(array![1.0, 1.0].view());
        assert!((vals[0] - 2.25).abs() < 1e-12);
        assert_eq!(vals[1], 0.0);
    }

    #[test]
    fn test_update_rejects_bad_shapes() {
        let mut head = BayesianLinearHead::new(2, 2, 1.0, 6.0, 6.0);
        let z = array![[1.0, 0.0, 0.0]];
        let y = array![1.0];
        assert!(matches!(
            head.update(0, z.view(), y.view()),
            Err(BanditError::DimensionMismatch { expected: 2, got: 3 })
        ));
        let z = array![[1.0, 0.0]];
        assert!(matches!(
            head.update(5, z.view(), y.view()),
            Err(BanditError::ActionOutOfRange { action: 5, .. })
        ));
    }

    #[test]
    fn test_thompson_samples_concentrate_on_mean() {
        let mut head = BayesianLinearHead::new(1, 1, 1.0, 6.0, 6.0);
        let z: Array2<f64> = Array2::ones((2000, 1));
        let y = Array1::from_elem(2000, 3.0);
        head.update(0, z.view(), y.view()).unwrap();

        let mut rng = StdRng::seed_from_u64(13);
        let draws: Vec<f64> = (0..200)
            .map(|_| head.sample(&mut rng, array![1.0].view())[0])
            .collect();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!((mean - 3.0).abs() < 0.05, "mean of draws {mean}");
    }

    #[test]
    fn test_sampling_falls_back_on_broken_covariance() {
        let mut head = BayesianLinearHead::new(2, 2, 1.0, 6.0, 6.0);
        head.actions[1].cov = array![[1.0, 2.0], [2.0, 1.0]];
        let mut rng = StdRng::seed_from_u64(3);
        let vals = head.sample(&mut rng, array![1.0, -1.0].view());
        assert_eq!(vals.len(), 2);
        assert!(vals.iter().all(|v| v.is_finite()));
    }
}
