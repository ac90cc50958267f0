use ndarray::prelude::*;

use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully connected layer with an optional activation.
///
/// Its parameters are laid out as the row-major `(inputs, outputs)` weight matrix followed by
/// the `outputs` biases.
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs.
    /// * `act_fn` - The activation applied to the affine output, if any.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        let zeros = Array2::zeros((0, 0));

        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: zeros.clone(),
            z: zeros,
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the amount of inputs and outputs of this layer.
    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn act_fn(&self) -> Option<&ActFn> {
        self.act_fn.as_ref()
    }

    /// Computes `act_fn(x · w + b)` for a batch of row vectors.
    ///
    /// # Arguments
    /// * `params` - This layer's parameter slice.
    /// * `x` - A `(batch, inputs)` array.
    ///
    /// # Returns
    /// A `(batch, outputs)` array.
    pub fn forward(&mut self, params: &[f32], x: Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense inputs",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let z = x.dot(&w) + &b;
        self.x = x;

        let Some(ref act_fn) = self.act_fn else {
            return Ok(z);
        };

        let a = z.mapv(|z| act_fn.f(z));
        self.z = z;
        Ok(a)
    }

    /// Writes this layer's gradient and propagates `d` to its inputs.
    ///
    /// # Arguments
    /// * `params` - This layer's parameter slice.
    /// * `grad` - This layer's gradient slice, overwritten.
    /// * `d` - The derivative of the loss with respect to this layer's outputs.
    ///
    /// # Returns
    /// The derivative of the loss with respect to this layer's inputs.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        dw.assign(&self.x.t().dot(&d));
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let w_size = self.size - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size])?;
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..])?;
        Ok((weights, biases))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_is_affine_then_activation() {
        let mut dense = Dense::new((2, 1), Some(ActFn::sigmoid(1.)));
        let params = [1., -1., 0.5];
        let x = array![[2., 1.], [0., 0.]];

        let y = dense.forward(&params, x).unwrap();

        let expected = [1. / (1. + (-1.5f32).exp()), 1. / (1. + (-0.5f32).exp())];
        assert!((y[[0, 0]] - expected[0]).abs() < 1e-6);
        assert!((y[[1, 0]] - expected[1]).abs() < 1e-6);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let mut dense = Dense::new((3, 2), Some(ActFn::sigmoid(1.)));
        let mut params: Vec<f32> = (0..dense.size()).map(|i| (i as f32 * 0.37).sin()).collect();
        let x = array![[0.5, -1.0, 2.0], [1.5, 0.25, -0.75]];

        // loss = sum of outputs, so the upstream derivative is all ones
        let y = dense.forward(&params, x.clone()).unwrap();
        let mut grad = vec![0.; dense.size()];
        dense
            .backward(&params, &mut grad, Array2::ones(y.raw_dim()))
            .unwrap();

        let h = 1e-2;
        for i in 0..params.len() {
            let orig = params[i];
            params[i] = orig + h;
            let up = dense.forward(&params, x.clone()).unwrap().sum();
            params[i] = orig - h;
            let down = dense.forward(&params, x.clone()).unwrap().sum();
            params[i] = orig;

            let numeric = (up - down) / (2. * h);
            assert!((numeric - grad[i]).abs() < 1e-3, "param {i}");
        }
    }

    #[test]
    fn rejects_wrong_input_width() {
        let mut dense = Dense::new((3, 1), None);
        let params = vec![0.; dense.size()];
        assert!(dense.forward(&params, Array2::zeros((2, 2))).is_err());
    }
}
