use ndarray::{ArrayD, Ix2, Ix4};

use super::{Conv2d, Dense, GlobalAvgPool, Relu};
use crate::{MlErr, Result, arch::activations::ActFn};

/// A layer of a `Sequential` model.
///
/// Every layer reads its parameters from, and writes its gradient to, a slice of the model's
/// flat buffers of exactly `size()` elements.
#[derive(Clone, Debug)]
pub enum Layer {
    Conv2d(Conv2d),
    Relu(Relu),
    GlobalAvgPool(GlobalAvgPool),
    Dense(Dense),
}

impl Layer {
    pub fn conv2d(in_channels: usize, out_channels: usize, kernel: usize, stride: usize) -> Self {
        Self::Conv2d(Conv2d::new(in_channels, out_channels, kernel, stride))
    }

    pub fn relu() -> Self {
        Self::Relu(Relu::new())
    }

    pub fn global_avg_pool() -> Self {
        Self::GlobalAvgPool(GlobalAvgPool::new())
    }

    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self::Dense(Dense::new(dim, act_fn))
    }

    /// Returns the amount of parameters of this layer.
    pub fn size(&self) -> usize {
        match self {
            Self::Conv2d(l) => l.size(),
            Self::Dense(l) => l.size(),
            Self::Relu(_) | Self::GlobalAvgPool(_) => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Conv2d(_) => "conv2d",
            Self::Relu(_) => "relu",
            Self::GlobalAvgPool(_) => "global_avg_pool",
            Self::Dense(_) => "dense",
        }
    }

    /// The name of the activation fused into this layer, if any.
    pub fn activation(&self) -> Option<&'static str> {
        match self {
            Self::Dense(l) => l.act_fn().map(ActFn::name),
            _ => None,
        }
    }

    /// Infers the shape this layer produces for a single sample of shape `input`.
    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        match (self, input) {
            (Self::Conv2d(l), &[h, w, _]) => Ok(vec![l.output_side(h), l.output_side(w), l.out_channels()]),
            (Self::GlobalAvgPool(_), &[_, _, c]) => Ok(vec![c]),
            (Self::Dense(l), &[_]) => Ok(vec![l.dim().1]),
            (Self::Relu(_), shape) => Ok(shape.to_vec()),
            _ => Err(MlErr::SizeMismatch {
                what: "layer input rank",
                got: input.len(),
                expected: match self {
                    Self::Dense(_) => 1,
                    _ => 3,
                },
            }),
        }
    }

    /// The fan-in and fan-out of this layer's weights, if it has any.
    pub fn fans(&self) -> Option<(usize, usize)> {
        match self {
            Self::Conv2d(l) => Some((l.fan_in(), l.out_channels())),
            Self::Dense(l) => Some(l.dim()),
            Self::Relu(_) | Self::GlobalAvgPool(_) => None,
        }
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let y = match self {
            Self::Conv2d(l) => l.forward(params, x.into_dimensionality::<Ix4>()?)?.into_dyn(),
            Self::Relu(l) => l.forward(x),
            Self::GlobalAvgPool(l) => l.forward(x.into_dimensionality::<Ix4>()?).into_dyn(),
            Self::Dense(l) => l.forward(params, x.into_dimensionality::<Ix2>()?)?.into_dyn(),
        };

        Ok(y)
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        let d = match self {
            Self::Conv2d(l) => l
                .backward(params, grad, d.into_dimensionality::<Ix4>()?)?
                .into_dyn(),
            Self::Relu(l) => l.backward(d),
            Self::GlobalAvgPool(l) => l.backward(d.into_dimensionality::<Ix2>()?).into_dyn(),
            Self::Dense(l) => l
                .backward(params, grad, d.into_dimensionality::<Ix2>()?)?
                .into_dyn(),
        };

        Ok(d)
    }
}
