//! Contextual bandit data buffer. Appends observations and serves
//! per-action slices, random minibatches with one-hot action weights, and
//! column scaling statistics.

use crate::error::{BanditError, BanditResult};
use crate::types::Observation;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Row storage for (user id, context, action, reward) tuples. Rewards for
/// the actions that were not played are implicitly zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextualDataset {
    context_dim: usize,
    num_actions: usize,
    memory_size: Option<usize>,
    intercept: bool,
    user_ids: Vec<u64>,
    contexts: Array2<f64>,
    actions: Vec<usize>,
    rewards: Vec<f64>,
}

/// All rows where one action was played.
#[derive(Debug, Clone)]
pub struct ActionSlice {
    pub user_ids: Vec<u64>,
    pub contexts: Array2<f64>,
    pub rewards: Array1<f64>,
}

/// A training minibatch. `rewards` and `weights` are `batch × num_actions`;
/// each row carries the observed reward and a one in the played column.
#[derive(Debug, Clone)]
pub struct Batch {
    pub user_ids: Vec<u64>,
    pub contexts: Array2<f64>,
    pub rewards: Array2<f64>,
    pub weights: Array2<f64>,
}

/// Per-column mean / standard deviation used to standardise contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingStats {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl ScalingStats {
    pub fn scale_row<'a>(&self, row: impl IntoIterator<Item = &'a f64>) -> Vec<f64> {
        row.into_iter()
            .zip(self.means.iter().zip(self.stds.iter()))
            .map(|(&x, (&mean, &std))| (x - mean) / std)
            .collect()
    }

    pub fn scale_matrix(&self, rows: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = rows.to_owned();
        for mut row in out.rows_mut() {
            for (col, value) in row.iter_mut().enumerate() {
                *value = (*value - self.means[col]) / self.stds[col];
            }
        }
        out
    }
}

/// Streaming column moments (Welford). Yields the same statistics as
/// [`ContextualDataset::scaling_stats`] in `O(width)` per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningScaling {
    count: usize,
    means: Vec<f64>,
    m2: Vec<f64>,
}

impl RunningScaling {
    pub fn new(width: usize) -> Self {
        Self {
            count: 0,
            means: vec![0.0; width],
            m2: vec![0.0; width],
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn push(&mut self, row: &[f64]) {
        self.count += 1;
        let n = self.count as f64;
        for ((mean, m2), &x) in self.means.iter_mut().zip(self.m2.iter_mut()).zip(row) {
            let delta = x - *mean;
            *mean += delta / n;
            *m2 += delta * (x - *mean);
        }
    }

    pub fn stats(&self) -> ScalingStats {
        let stds = self
            .m2
            .iter()
            .map(|&m2| {
                if self.count < 2 {
                    return 1.0;
                }
                let sd = (m2 / (self.count - 1) as f64).sqrt();
                if sd > 0.0 && sd.is_finite() {
                    sd
                } else {
                    1.0
                }
            })
            .collect();
        ScalingStats {
            means: self.means.clone(),
            stds,
        }
    }
}

impl ContextualDataset {
    pub fn new(context_dim: usize, num_actions: usize) -> Self {
        Self {
            context_dim,
            num_actions,
            memory_size: None,
            intercept: false,
            user_ids: Vec::new(),
            contexts: Array2::zeros((0, context_dim)),
            actions: Vec::new(),
            rewards: Vec::new(),
        }
    }

    /// Keep at most `memory_size` rows, dropping the oldest first.
    pub fn with_memory(mut self, memory_size: usize) -> Self {
        self.memory_size = Some(memory_size);
        self
    }

    /// Append a constant `1.0` column to every stored context.
    pub fn with_intercept(mut self) -> Self {
        self.intercept = true;
        self.contexts = Array2::zeros((0, self.context_dim + 1));
        self
    }

    pub fn context_dim(&self) -> usize {
        self.context_dim
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    /// Stored width of each context row (including the intercept column).
    pub fn row_width(&self) -> usize {
        self.context_dim + usize::from(self.intercept)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn user_ids(&self) -> &[u64] {
        &self.user_ids
    }

    pub fn rewards(&self) -> &[f64] {
        &self.rewards
    }

    pub fn contexts(&self) -> ArrayView2<'_, f64> {
        self.contexts.view()
    }

    pub fn context_row(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.contexts.row(idx)
    }

    /// Add one (context, action, reward) row for `user_id`.
    pub fn add(
        &mut self,
        user_id: u64,
        context: &[f64],
        action: usize,
        reward: f64,
    ) -> BanditResult<()> {
        self.check_row(context.len(), action)?;

        let mut row = context.to_vec();
        if self.intercept {
            row.push(1.0);
        }
        self.contexts
            .push_row(ArrayView1::from(&row))
            .map_err(|e| BanditError::Internal(e.into()))?;
        self.user_ids.push(user_id);
        self.actions.push(action);
        self.rewards.push(reward);

        if let Some(capacity) = self.memory_size {
            if self.len() > capacity {
                self.user_ids.remove(0);
                self.contexts = self.contexts.slice(s![1.., ..]).to_owned();
                self.actions.remove(0);
                self.rewards.remove(0);
            }
        }
        Ok(())
    }

    pub fn add_observation(&mut self, obs: &Observation) -> BanditResult<()> {
        self.add(obs.user_id, &obs.context, obs.action, obs.reward)
    }

    /// Bulk-load rows. Fails without modifying the buffer if the lengths
    /// disagree or the memory limit would be exceeded.
    pub fn ingest(
        &mut self,
        user_ids: &[u64],
        contexts: ArrayView2<'_, f64>,
        actions: &[usize],
        rewards: &[f64],
    ) -> BanditResult<()> {
        let rows = rewards.len();
        for len in [user_ids.len(), contexts.nrows(), actions.len()] {
            if len != rows {
                return Err(BanditError::DimensionMismatch {
                    expected: rows,
                    got: len,
                });
            }
        }
        if let Some(capacity) = self.memory_size {
            if self.len() + rows > capacity {
                return Err(BanditError::CapacityExceeded {
                    capacity,
                    requested: self.len() + rows,
                });
            }
        }
        for &action in actions {
            self.check_row(contexts.ncols(), action)?;
        }

        let block = if self.intercept {
            let mut widened = Array2::ones((rows, self.row_width()));
            widened.slice_mut(s![.., ..self.context_dim]).assign(&contexts);
            widened
        } else {
            contexts.to_owned()
        };
        self.contexts
            .append(Axis(0), block.view())
            .map_err(|e| BanditError::Internal(e.into()))?;
        self.user_ids.extend_from_slice(user_ids);
        self.actions.extend_from_slice(actions);
        self.rewards.extend_from_slice(rewards);
        Ok(())
    }

    /// All (user id, context, reward) rows where `action` was played.
    pub fn data_for_action(&self, action: usize) -> ActionSlice {
        let idx: Vec<usize> = (0..self.len())
            .filter(|&i| self.actions[i] == action)
            .collect();

        ActionSlice {
            user_ids: idx.iter().map(|&i| self.user_ids[i]).collect(),
            contexts: if idx.is_empty() {
                Array2::zeros((0, self.row_width()))
            } else {
                self.contexts.select(Axis(0), &idx)
            },
            rewards: idx.iter().map(|&i| self.rewards[i]).collect(),
        }
    }

    /// Distinct actions present in the buffer, ascending.
    pub fn played_actions(&self) -> Vec<usize> {
        let mut seen = vec![false; self.num_actions];
        for &a in &self.actions {
            seen[a] = true;
        }
        seen.iter()
            .enumerate()
            .filter_map(|(a, &s)| s.then_some(a))
            .collect()
    }

    /// Random minibatch (sampled with replacement). The first
    /// `min(n_recent, batch_size, len)` slots are the most recent rows.
    pub fn batch_with_weights<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        batch_size: usize,
        n_recent: usize,
        scaling: Option<&ScalingStats>,
    ) -> BanditResult<Batch> {
        let n = self.len();
        if n == 0 {
            return Err(BanditError::EmptyDataset);
        }

        let mut idx: Vec<usize> = (0..batch_size).map(|_| rng.gen_range(0..n)).collect();
        let recent = n_recent.min(batch_size).min(n);
        for (slot, row) in (n - recent..n).enumerate() {
            idx[slot] = row;
        }

        let width = self.row_width();
        let mut contexts = Array2::zeros((batch_size, width));
        let mut rewards = Array2::zeros((batch_size, self.num_actions));
        let mut weights = Array2::zeros((batch_size, self.num_actions));
        for (row, &i) in idx.iter().enumerate() {
            let raw = self.context_row(i);
            let values = match scaling {
                Some(stats) => stats.scale_row(raw.iter()),
                None => raw.to_vec(),
            };
            for (col, value) in values.into_iter().enumerate() {
                contexts[[row, col]] = value;
            }
            rewards[[row, self.actions[i]]] = self.rewards[i];
            weights[[row, self.actions[i]]] = 1.0;
        }

        Ok(Batch {
            user_ids: idx.iter().map(|&i| self.user_ids[i]).collect(),
            contexts,
            rewards,
            weights,
        })
    }

    /// Column means and sample standard deviations. Deviations that are
    /// zero or undefined (fewer than two rows) are reported as 1.
    pub fn scaling_stats(&self) -> ScalingStats {
        let width = self.row_width();
        let n = self.len();
        let mut means = vec![0.0; width];
        let mut stds = vec![1.0; width];
        if n == 0 {
            return ScalingStats { means, stds };
        }

        for row in self.contexts.rows() {
            for (col, &value) in row.iter().enumerate() {
                means[col] += value;
            }
        }
        for mean in &mut means {
            *mean /= n as f64;
        }

        if n > 1 {
            let mut sq = vec![0.0; width];
            for row in self.contexts.rows() {
                for (col, &value) in row.iter().enumerate() {
                    sq[col] += (value - means[col]).powi(2);
                }
            }
            for (std, s) in stds.iter_mut().zip(sq) {
                let sd = (s / (n - 1) as f64).sqrt();
                *std = if sd > 0.0 && sd.is_finite() { sd } else { 1.0 };
            }
        }

        ScalingStats { means, stds }
    }

    /// Number of rows logged for `user_id`.
    pub fn user_frequency(&self, user_id: u64) -> usize {
        self.user_ids.iter().filter(|&&u| u == user_id).count()
    }

    /// Overwrite every stored context, e.g. after recomputing latent
    /// representations. The shape must match the current buffer.
    pub fn replace_contexts(&mut self, contexts: Array2<f64>) -> BanditResult<()> {
        if contexts.nrows() != self.len() {
            return Err(BanditError::DimensionMismatch {
                expected: self.len(),
                got: contexts.nrows(),
            });
        }
        if contexts.ncols() != self.row_width() {
            return Err(BanditError::DimensionMismatch {
                expected: self.row_width(),
                got: contexts.ncols(),
            });
        }
        self.contexts = contexts;
        Ok(())
    }

    fn check_row(&self, context_len: usize, action: usize) -> BanditResult<()> {
        if context_len != self.context_dim {
            return Err(BanditError::DimensionMismatch {
                expected: self.context_dim,
                got: context_len,
            });
        }
        if action >= self.num_actions {
            return Err(BanditError::ActionOutOfRange {
                action,
                num_actions: self.num_actions,
            });
        }
        Ok(())
    }
}
