use super::Optimizer;
use crate::{MlErr, Result};

/// The Adam optimization algorithm.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    beta2_t: f32,
    v: Box<[f32]>,
    s: Box<[f32]>,
    epsilon: f32,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            beta1_t: 1.,
            beta2_t: 1.,
            v: vec![0.; len].into_boxed_slice(),
            s: vec![0.; len].into_boxed_slice(),
            epsilon,
        }
    }

    /// Creates a new `Adam` optimizer with `lr = 1e-3`, `beta1 = 0.9`, `beta2 = 0.999` and
    /// `epsilon = 1e-7`.
    pub fn with_defaults(len: usize) -> Self {
        Self::new(len, 1e-3, 0.9, 0.999, 1e-7)
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        if grad.len() != params.len() || params.len() != self.v.len() {
            return Err(MlErr::SizeMismatch {
                what: "optimizer parameters",
                got: grad.len().min(params.len()),
                expected: self.v.len(),
            });
        }

        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            ..
        } = *self;

        self.beta1_t *= b1;
        self.beta2_t *= b2;

        let bc1 = 1. - self.beta1_t;
        let bc2 = 1. - self.beta2_t;
        let step_size = lr * (bc2.sqrt() / bc1);

        params
            .iter_mut()
            .zip(grad)
            .zip(self.v.iter_mut())
            .zip(self.s.iter_mut())
            .for_each(|(((p, g), v), s)| {
                *v = b1 * *v + (1. - b1) * g;
                *s = b2 * *s + (1. - b2) * g.powi(2);
                *p -= step_size * *v / (s.sqrt() + eps);
            });

        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_by_the_learning_rate() {
        let mut adam = Adam::with_defaults(3);
        let mut params = [1., 1., 1.];
        let grad = [0.5, -2., 0.];

        adam.update_params(&grad, &mut params).unwrap();

        assert!((params[0] - (1. - 1e-3)).abs() < 1e-5);
        assert!((params[1] - (1. + 1e-3)).abs() < 1e-5);
        assert_eq!(params[2], 1.);
    }

    #[test]
    fn learning_rate_can_be_replaced() {
        let mut adam = Adam::with_defaults(1);
        adam.set_learning_rate(0.5);
        assert_eq!(adam.learning_rate(), 0.5);

        let mut params = [0.];
        adam.update_params(&[1.], &mut params).unwrap();
        assert!((params[0] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn size_mismatch_fails() {
        let mut adam = Adam::with_defaults(2);
        let mut params = [0.; 3];
        assert!(adam.update_params(&[0.; 3], &mut params).is_err());
    }
}
