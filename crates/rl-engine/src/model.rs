//! The boundary between the evaluator and a reward model.

use bandit_core::error::BanditResult;
use bandit_core::types::Observation;

/// A regression model of the expected reward of every action given a user
/// and a context. The convergence evaluator only sees this trait.
pub trait RewardModel {
    /// Short description used in reports.
    fn name(&self) -> String;

    fn num_actions(&self) -> usize;

    /// Train on logged observations.
    fn fit(&mut self, observations: &[Observation]) -> BanditResult<()>;

    /// Predicted expected reward, one entry per action.
    fn expected_values(&self, user_id: u64, context: &[f64]) -> BanditResult<Vec<f64>>;
}
