use ndarray::{Array2, ArrayView2, Zip};

use super::LossFn;

/// Binary cross-entropy over probabilities in `[0, 1]`.
///
/// Predictions are clipped to `[epsilon, 1 - epsilon]` before taking logarithms.
#[derive(Clone, Copy, Debug)]
pub struct BinaryCrossEntropy {
    epsilon: f32,
}

impl BinaryCrossEntropy {
    /// Returns a new `BinaryCrossEntropy` with the default clipping epsilon of `1e-7`.
    pub fn new() -> Self {
        Self { epsilon: 1e-7 }
    }

    fn clip(&self, p: f32) -> f32 {
        p.clamp(self.epsilon, 1. - self.epsilon)
    }
}

impl Default for BinaryCrossEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl LossFn for BinaryCrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        if y_pred.is_empty() {
            return 0.;
        }

        let total = Zip::from(&y_pred).and(&y).fold(0., |acc, &p, &t| {
            let p = self.clip(p);
            acc - (t * p.ln() + (1. - t) * (1. - p).ln())
        });

        total / y_pred.len() as f32
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y_pred.len().max(1) as f32;

        Zip::from(&y_pred).and(&y).map_collect(|&p, &t| {
            let p = self.clip(p);
            (p - t) / (p * (1. - p)) / n
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::arch::activations::Sigmoid;

    #[test]
    fn loss_of_known_values() {
        let bce = BinaryCrossEntropy::new();
        let y_pred = array![[0.5], [0.5]];
        let y = array![[1.], [0.]];

        let loss = bce.loss(y_pred.view(), y.view());
        assert!((loss - 2f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn chained_with_sigmoid_gives_prediction_minus_target() {
        let bce = BinaryCrossEntropy::new();
        let sigmoid = Sigmoid::new(1.);
        let z = array![[0.3], [-1.2], [2.0], [0.0]];
        let y = array![[1.], [0.], [0.], [1.]];
        let y_pred = z.mapv(|z| sigmoid.f(z));

        let d = bce.loss_prime(y_pred.view(), y.view());
        let n = z.len() as f32;

        for ((d, &z), (&p, &t)) in d.iter().zip(&z).zip(y_pred.iter().zip(&y)) {
            let chained = d * sigmoid.df(z);
            assert!((chained - (p - t) / n).abs() < 1e-5);
        }
    }

    #[test]
    fn clipping_keeps_the_loss_finite() {
        let bce = BinaryCrossEntropy::new();
        let y_pred = array![[0.], [1.]];
        let y = array![[1.], [0.]];

        assert!(bce.loss(y_pred.view(), y.view()).is_finite());
        assert!(bce.loss_prime(y_pred.view(), y.view()).iter().all(|d| d.is_finite()));
    }
}
