use std::{fmt::Write, mem};

use ndarray::ArrayD;
use rand::Rng;

use super::{Model, layers::Layer};
use crate::{MlErr, Result, initialization::RandWeightGen};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// The layers' parameters are laid out one after the other in the model's parameter buffer, in
/// the same order as the layers.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Creates a fresh parameter buffer for this model.
    ///
    /// Convolution weights follow Kaiming normal initialization, dense weights Xavier uniform,
    /// and every bias starts at zero.
    ///
    /// # Arguments
    /// * `rng` - The random number generator to draw the weights from.
    pub fn initialize<R: Rng>(&self, rng: &mut R) -> Result<Vec<f32>> {
        let mut params = vec![0.; self.size()];
        let mut rest = params.as_mut_slice();

        for layer in &self.layers {
            let (head, tail) = mem::take(&mut rest).split_at_mut(layer.size());
            rest = tail;

            let Some((fan_in, fan_out)) = layer.fans() else {
                continue;
            };

            let (weights, _biases) = head.split_at_mut(fan_in * fan_out);
            match layer {
                Layer::Conv2d(_) => RandWeightGen::kaiming(rng, fan_in)?.fill(weights),
                _ => RandWeightGen::xavier_uniform(rng, fan_in, fan_out)?.fill(weights),
            }
        }

        Ok(params)
    }

    /// Renders a table with the output shape and parameter count of every layer.
    ///
    /// # Arguments
    /// * `input` - The shape of a single input sample.
    /// * `trainable` - The amount of parameters the optimizer updates.
    pub fn summary(&self, input: &[usize], trainable: usize) -> Result<String> {
        let mut out = String::new();
        let mut shape = input.to_vec();

        let _ = writeln!(out, "{:<24}{:<20}{:>12}", "layer", "output shape", "params");
        for (i, layer) in self.layers.iter().enumerate() {
            shape = layer.output_shape(&shape)?;

            let name = match layer.activation() {
                Some(act) => format!("{}_{i} ({act})", layer.name()),
                None => format!("{}_{i}", layer.name()),
            };
            let dims = format!("{shape:?}");
            let _ = writeln!(out, "{name:<24}{dims:<20}{:>12}", layer.size());
        }

        let total = self.size();
        let _ = writeln!(out, "total params: {total}");
        let _ = writeln!(out, "trainable params: {trainable}");
        let _ = write!(out, "non-trainable params: {}", total.saturating_sub(trainable));
        Ok(out)
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        let expected = self.size();
        if got != expected {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected,
            });
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    fn forward(&mut self, params: &[f32], mut x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        self.check_len("params", params.len())?;
        let mut front = params;

        for layer in self.layers.iter_mut() {
            let (head, tail) = front.split_at(layer.size());
            front = tail;
            x = layer.forward(head, x)?;
        }

        Ok(x)
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], mut d: ArrayD<f32>) -> Result<()> {
        self.check_len("params", params.len())?;
        self.check_len("gradient", grad.len())?;
        let mut back = params;
        let mut grad_back = grad;

        for layer in self.layers.iter_mut().rev() {
            let size = layer.size();
            let (rest, head) = back.split_at(back.len() - size);
            let at = grad_back.len() - size;
            let (grad_rest, grad_head) = mem::take(&mut grad_back).split_at_mut(at);
            back = rest;
            grad_back = grad_rest;

            d = layer.backward(head, grad_head, d)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array4, ArrayD, IxDyn};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::arch::activations::ActFn;

    fn tiny() -> Sequential {
        Sequential::new([
            Layer::conv2d(3, 4, 3, 2),
            Layer::relu(),
            Layer::global_avg_pool(),
            Layer::dense((4, 1), Some(ActFn::sigmoid(1.))),
        ])
    }

    #[test]
    fn size_is_the_sum_of_layers() {
        let model = tiny();
        assert_eq!(model.size(), (27 + 1) * 4 + (4 + 1));
    }

    #[test]
    fn forward_gives_one_probability_per_sample() {
        let mut model = tiny();
        let params = model.initialize(&mut StdRng::seed_from_u64(7)).unwrap();
        let x = Array4::from_shape_fn((5, 8, 8, 3), |(b, y, x, c)| ((b + y + x + c) % 4) as f32 / 4.);

        let y = model.forward(&params, x.into_dyn()).unwrap();
        assert_eq!(y.shape(), &[5, 1]);
        assert!(y.iter().all(|p| (0. ..=1.).contains(p)));
    }

    #[test]
    fn backward_fills_the_whole_gradient() {
        let mut model = tiny();
        let params = model.initialize(&mut StdRng::seed_from_u64(7)).unwrap();
        let x = Array4::from_shape_fn((2, 6, 6, 3), |(b, y, x, c)| (b * 5 + y * 3 + x + c) as f32 / 20.);

        let y = model.forward(&params, x.into_dyn()).unwrap();
        let mut grad = vec![f32::NAN; model.size()];
        model
            .backward(&params, &mut grad, ArrayD::ones(y.raw_dim()))
            .unwrap();

        assert!(grad.iter().all(|g| g.is_finite()));
    }

    #[test]
    fn wrong_parameter_count_fails() {
        let mut model = tiny();
        let params = vec![0.; model.size() - 1];
        let x = ArrayD::zeros(IxDyn(&[1, 4, 4, 3]));
        assert!(model.forward(&params, x).is_err());
    }

    #[test]
    fn summary_lists_every_layer() {
        let model = tiny();
        let summary = model.summary(&[8, 8, 3], 5).unwrap();

        assert!(summary.contains("conv2d_0"));
        assert!(summary.contains("[4, 4, 4]"));
        assert!(summary.contains("dense_3 (sigmoid)"));
        assert!(summary.contains("trainable params: 5"));
    }
}
