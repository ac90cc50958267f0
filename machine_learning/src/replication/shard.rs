use std::ops::Range;

/// Splits `total` samples among `replicas` and returns the shard for `replica_id`.
///
/// Properties:
/// - Ranges are contiguous, disjoint and cover `[0..total)`.
/// - Sizes differ by at most 1 (balanced partition).
pub fn shard_range(total: usize, replica_id: usize, replicas: usize) -> Range<usize> {
    assert!(replicas > 0);
    assert!(replica_id < replicas);

    let base = total / replicas;
    let rem = total % replicas;

    let start = replica_id * base + replica_id.min(rem);
    let extra = if replica_id < rem { 1 } else { 0 };
    let end = start + base + extra;

    start..end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_range_balanced() {
        // total 10, replicas 3 => sizes 4,3,3
        assert_eq!(shard_range(10, 0, 3), 0..4);
        assert_eq!(shard_range(10, 1, 3), 4..7);
        assert_eq!(shard_range(10, 2, 3), 7..10);
    }

    #[test]
    fn more_replicas_than_samples_leaves_empty_shards() {
        assert_eq!(shard_range(2, 0, 4), 0..1);
        assert_eq!(shard_range(2, 1, 4), 1..2);
        assert!(shard_range(2, 3, 4).is_empty());
    }
}
