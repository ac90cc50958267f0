use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::{MlErr, Result};

/// A weight generator that follows a certain probabilistic distribution.
pub struct RandWeightGen<'r, R: Rng, D: Distribution<f32>> {
    rng: &'r mut R,
    distribution: D,
}

impl<'r, R: Rng, D: Distribution<f32>> RandWeightGen<'r, R, D> {
    /// Creates a new `RandWeightGen` weight generator.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `distribution` - The distribution to sample the random numbers from.
    pub fn new(rng: &'r mut R, distribution: D) -> Self {
        Self { rng, distribution }
    }

    /// Fills `out` with samples of the distribution.
    pub fn fill(&mut self, out: &mut [f32]) {
        for w in out {
            *w = self.distribution.sample(&mut *self.rng);
        }
    }
}

impl<'r, R: Rng> RandWeightGen<'r, R, Uniform<f32>> {
    /// Creates a new `RandWeightGen` weight generator with a uniform distribution.
    ///
    /// # Returns
    /// An error if the range is invalid (low >= high).
    pub fn uniform(rng: &'r mut R, low: f32, high: f32) -> Result<Self> {
        let distribution = Uniform::new(low, high)
            .map_err(|_| MlErr::InvalidInput("uniform range must satisfy low < high"))?;

        Ok(Self::new(rng, distribution))
    }

    /// Creates a new `RandWeightGen` weight generator using Xavier uniform initialization.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `fan_in` - The number of input units in the weight tensor.
    /// * `fan_out` - The number of output units in the weight tensor.
    pub fn xavier_uniform(rng: &'r mut R, fan_in: usize, fan_out: usize) -> Result<Self> {
        let range = (6. / (fan_in + fan_out).max(1) as f32).sqrt();
        Self::uniform(rng, -range, range)
    }
}

impl<'r, R: Rng> RandWeightGen<'r, R, Normal<f32>> {
    /// Creates a new `RandWeightGen` weight generator with a normal distribution.
    ///
    /// # Returns
    /// An error if `std_dev` is not finite (Nan or infinite).
    pub fn normal(rng: &'r mut R, mean: f32, std_dev: f32) -> Result<Self> {
        let distribution = Normal::new(mean, std_dev)
            .map_err(|_| MlErr::InvalidInput("normal standard deviation must be finite"))?;

        Ok(Self::new(rng, distribution))
    }

    /// Creates a new `RandWeightGen` weight generator using Kaiming normal initialization.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `fan_in` - The number of input units in the weight tensor.
    pub fn kaiming(rng: &'r mut R, fan_in: usize) -> Result<Self> {
        let std_dev = (2. / fan_in.max(1) as f32).sqrt();
        Self::normal(rng, 0., std_dev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn xavier_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut weights = vec![0.; 64];

        RandWeightGen::xavier_uniform(&mut rng, 4, 2)
            .unwrap()
            .fill(&mut weights);

        assert!(weights.iter().all(|w| w.abs() <= 1.));
        assert!(weights.iter().any(|&w| w != 0.));
    }

    #[test]
    fn same_seed_same_weights() {
        let sample = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut weights = vec![0.; 16];
            RandWeightGen::kaiming(&mut rng, 27).unwrap().fill(&mut weights);
            weights
        };

        assert_eq!(sample(777), sample(777));
        assert_ne!(sample(777), sample(778));
    }

    #[test]
    fn invalid_ranges_fail() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(RandWeightGen::uniform(&mut rng, 1., 1.).is_err());
        assert!(RandWeightGen::normal(&mut rng, 0., f32::NAN).is_err());
    }
}
