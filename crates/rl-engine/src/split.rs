//! Seeded train / validation partitioning of logged observations.

use bandit_core::config::SplitConfig;
use bandit_core::error::{BanditError, BanditResult};
use bandit_core::types::Observation;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSplit {
    pub train: Vec<Observation>,
    pub validation: Vec<Observation>,
}

/// Shuffle `rows` with the configured seed and move
/// `ceil(n · validation_fraction)` of them to the validation partition.
/// Both partitions must end up non-empty.
pub fn train_validation_split(
    mut rows: Vec<Observation>,
    config: &SplitConfig,
) -> BanditResult<DataSplit> {
    let fraction = config.validation_fraction;
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(BanditError::Config(format!(
            "validation_fraction must lie in (0, 1), got {fraction}"
        )));
    }
    if rows.is_empty() {
        return Err(BanditError::EmptyDataset);
    }

    let n = rows.len();
    let n_validation = (n as f64 * fraction).ceil() as usize;
    if n_validation >= n {
        return Err(BanditError::Config(format!(
            "{n} rows leave no training data at validation_fraction {fraction}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    rows.shuffle(&mut rng);
    let train = rows.split_off(n_validation);
    Ok(DataSplit {
        train,
        validation: rows,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<Observation> {
        (0..n)
            .map(|i| Observation::new(i as u64, vec![i as f64], i % 2, i as f64))
            .collect()
    }

    fn config(validation_fraction: f64) -> SplitConfig {
        SplitConfig {
            validation_fraction,
            seed: 3,
        }
    }

    #[test]
    fn test_split_sizes_round_validation_up() {
        let split = train_validation_split(rows(11), &config(0.2)).unwrap();
        assert_eq!(split.validation.len(), 3);
        assert_eq!(split.train.len(), 8);
    }

    #[test]
    fn test_split_is_a_seeded_partition() {
        let split = train_validation_split(rows(50), &config(0.3)).unwrap();
        let mut ids: Vec<u64> = split
            .train
            .iter()
            .chain(&split.validation)
            .map(|o| o.user_id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..50).collect::<Vec<u64>>());

        let again = train_validation_split(rows(50), &config(0.3)).unwrap();
        assert_eq!(split, again);
    }

    #[test]
    fn test_split_rejects_degenerate_inputs() {
        assert!(matches!(
            train_validation_split(rows(10), &config(0.0)),
            Err(BanditError::Config(_))
        ));
        assert!(train_validation_split(rows(10), &config(1.0)).is_err());
        assert!(train_validation_split(rows(10), &config(f64::NAN)).is_err());
        assert!(matches!(
            train_validation_split(Vec::new(), &config(0.5)),
            Err(BanditError::EmptyDataset)
        ));
        // One row cannot feed both partitions.
        assert!(train_validation_split(rows(1), &config(0.5)).is_err());
    }
}
