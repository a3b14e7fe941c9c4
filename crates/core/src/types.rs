use serde::{Deserialize, Serialize};

/// User id reserved for the "unknown user" embedding row.
pub const UNKNOWN_USER: u64 = 0;

/// One logged bandit interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub user_id: u64,
    pub context: Vec<f64>,
    pub action: usize,
    pub reward: f64,
}

impl Observation {
    pub fn new(user_id: u64, context: Vec<f64>, action: usize, reward: f64) -> Self {
        Self {
            user_id,
            context,
            action,
            reward,
        }
    }
}

/// Index of the largest value; ties resolve to the lowest index.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}
