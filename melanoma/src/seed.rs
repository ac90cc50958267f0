use rand::{SeedableRng, rngs::StdRng};

/// The purposes random numbers are drawn for. Each one gets an independent stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Split,
    Init,
    Shuffle,
    Augment,
}

/// The single seed of a run, from which every random source is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed(u64);

impl Seed {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Derives the seed of `stream` at the coordinates `path`, e.g. `[pass, position]`.
    pub fn derive(&self, stream: Stream, path: &[u64]) -> u64 {
        path.iter()
            .fold(mix(self.0 ^ mix(stream as u64 + 1)), |acc, &p| mix(acc ^ p))
    }

    pub fn rng(&self, stream: Stream, path: &[u64]) -> StdRng {
        StdRng::seed_from_u64(self.derive(stream, path))
    }
}

/// SplitMix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streams_and_paths_are_independent() {
        let seed = Seed::new(777);

        assert_eq!(seed.derive(Stream::Augment, &[0, 3]), seed.derive(Stream::Augment, &[0, 3]));
        assert_ne!(seed.derive(Stream::Augment, &[0, 3]), seed.derive(Stream::Shuffle, &[0, 3]));
        assert_ne!(seed.derive(Stream::Augment, &[0, 3]), seed.derive(Stream::Augment, &[3, 0]));
        assert_ne!(seed.derive(Stream::Init, &[]), Seed::new(778).derive(Stream::Init, &[]));
    }
}
