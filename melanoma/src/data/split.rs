use rand::seq::SliceRandom;

use super::Record;
use crate::{
    PipelineErr, Result,
    seed::{Seed, Stream},
};

/// A table partitioned into training and validation rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Vec<Record>,
    pub val: Vec<Record>,
}

/// Partitions `records` with a seeded shuffle.
///
/// The validation side gets `ceil(n * test_fraction)` rows and the training side the rest, both
/// in shuffled order. The same seed and input order always give the same partition.
///
/// # Errors
/// `InvalidSplit` if `test_fraction` is not in `(0, 1)` or either side would be empty.
pub fn train_test_split(records: &[Record], test_fraction: f64, seed: Seed) -> Result<Split> {
    let n = records.len();
    let invalid = PipelineErr::InvalidSplit {
        rows: n,
        fraction: test_fraction,
    };

    if !(test_fraction > 0. && test_fraction < 1.) {
        return Err(invalid);
    }

    let n_val = (n as f64 * test_fraction).ceil() as usize;
    if n_val == 0 || n_val >= n {
        return Err(invalid);
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut seed.rng(Stream::Split, &[]));

    let (val, train) = order.split_at(n_val);
    let pick = |idx: &[usize]| -> Vec<Record> { idx.iter().map(|&i| records[i].clone()).collect() };

    Ok(Split {
        train: pick(train),
        val: pick(val),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::data::Label;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record {
                image_name: format!("ISIC_{i:07}"),
                target: Some(if i % 3 == 0 { Label::Malignant } else { Label::Benign }),
            })
            .collect()
    }

    #[test]
    fn hundred_rows_split_95_5() {
        let split = train_test_split(&records(100), 0.05, Seed::new(777)).unwrap();

        assert_eq!(split.train.len(), 95);
        assert_eq!(split.val.len(), 5);
    }

    #[test]
    fn validation_size_rounds_up() {
        let split = train_test_split(&records(101), 0.05, Seed::new(777)).unwrap();

        assert_eq!(split.val.len(), 6);
        assert_eq!(split.train.len(), 95);
    }

    #[test]
    fn same_seed_same_partition() {
        let rows = records(100);

        let a = train_test_split(&rows, 0.05, Seed::new(777)).unwrap();
        let b = train_test_split(&rows, 0.05, Seed::new(777)).unwrap();
        let c = train_test_split(&rows, 0.05, Seed::new(778)).unwrap();

        assert_eq!(a, b);
        assert_ne!(a.val, c.val);
    }

    #[test]
    fn partition_covers_every_row_once() {
        let rows = records(40);
        let split = train_test_split(&rows, 0.25, Seed::new(1)).unwrap();

        let names: HashSet<_> = split
            .train
            .iter()
            .chain(&split.val)
            .map(|r| r.image_name.as_str())
            .collect();
        assert_eq!(names.len(), 40);
    }

    #[test]
    fn degenerate_splits_fail() {
        assert!(train_test_split(&records(10), 0., Seed::new(1)).is_err());
        assert!(train_test_split(&records(10), 1., Seed::new(1)).is_err());
        assert!(train_test_split(&records(1), 0.5, Seed::new(1)).is_err());
        assert!(train_test_split(&[], 0.5, Seed::new(1)).is_err());
    }
}
