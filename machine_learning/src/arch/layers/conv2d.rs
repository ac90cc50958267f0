use ndarray::prelude::*;
use rayon::prelude::*;

use crate::{MlErr, Result};

/// A 2D convolution over NHWC batches with zero padding of `kernel / 2`.
///
/// The convolution is computed as a matrix product between the unrolled input patches
/// (`im2col`) and the `(kernel * kernel * in_channels, out_channels)` weight matrix, which is
/// followed in the parameter slice by the `out_channels` biases.
#[derive(Clone, Debug)]
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    size: usize,

    // Forward metadata
    cols: Array2<f32>,
    input_dim: (usize, usize, usize),
}

impl Conv2d {
    /// Creates a new `Conv2d` layer.
    ///
    /// # Arguments
    /// * `in_channels` - The channels of the input feature map.
    /// * `out_channels` - The amount of filters.
    /// * `kernel` - The side of the square kernel.
    /// * `stride` - The step between two consecutive patches.
    pub fn new(in_channels: usize, out_channels: usize, kernel: usize, stride: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel,
            stride: stride.max(1),
            size: (kernel * kernel * in_channels + 1) * out_channels,
            cols: Array2::zeros((0, 0)),
            input_dim: (0, 0, 0),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The amount of inputs feeding each output unit.
    pub fn fan_in(&self) -> usize {
        self.kernel * self.kernel * self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Returns the spatial size of the output for an input of side `side`.
    pub fn output_side(&self, side: usize) -> usize {
        let pad = self.kernel / 2;
        (side + 2 * pad).saturating_sub(self.kernel) / self.stride + 1
    }

    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array4<f32>> {
        let (n, h, w, c) = x.dim();
        if c != self.in_channels {
            return Err(MlErr::SizeMismatch {
                what: "conv input channels",
                got: c,
                expected: self.in_channels,
            });
        }

        let (oh, ow) = (self.output_side(h), self.output_side(w));
        let (weights, biases) = self.view_params(params)?;

        let cols = self.im2col(x.view(), oh, ow);
        let out = cols.dot(&weights) + &biases;

        self.cols = cols;
        self.input_dim = (n, h, w);
        Ok(out.into_shape_with_order((n, oh, ow, self.out_channels))?)
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array4<f32>,
    ) -> Result<Array4<f32>> {
        let rows = self.cols.nrows();
        let d = d
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((rows, self.out_channels))?;

        let (mut dw, mut db) = self.view_grad(grad)?;
        dw.assign(&self.cols.t().dot(&d));
        db.assign(&d.sum_axis(Axis(0)));

        let (weights, _) = self.view_params(params)?;
        let dcols = d.dot(&weights.t());
        Ok(self.col2im(dcols.view()))
    }

    /// Unrolls every `kernel * kernel` patch of `x` into a row, ordered by (row, col, channel).
    fn im2col(&self, x: ArrayView4<f32>, oh: usize, ow: usize) -> Array2<f32> {
        let (n, h, w, c) = x.dim();
        let (k, stride, pad) = (self.kernel, self.stride, self.kernel / 2);
        let mut cols = Array2::zeros((n * oh * ow, k * k * c));

        cols.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(r, mut row)| {
                let (b, oy, ox) = (r / (oh * ow), (r / ow) % oh, r % ow);

                for ky in 0..k {
                    let Some(iy) = (oy * stride + ky).checked_sub(pad).filter(|&iy| iy < h) else {
                        continue;
                    };

                    for kx in 0..k {
                        let Some(ix) = (ox * stride + kx).checked_sub(pad).filter(|&ix| ix < w)
                        else {
                            continue;
                        };

                        let base = (ky * k + kx) * c;
                        for ch in 0..c {
                            row[base + ch] = x[[b, iy, ix, ch]];
                        }
                    }
                }
            });

        cols
    }

    /// Scatters the patch derivatives back into an input-shaped array, summing overlaps.
    fn col2im(&self, dcols: ArrayView2<f32>) -> Array4<f32> {
        let (n, h, w) = self.input_dim;
        let c = self.in_channels;
        let (k, stride, pad) = (self.kernel, self.stride, self.kernel / 2);
        let (oh, ow) = (self.output_side(h), self.output_side(w));
        let mut dx = Array4::zeros((n, h, w, c));

        dx.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(b, mut image)| {
                for oy in 0..oh {
                    for ox in 0..ow {
                        let row = dcols.row(b * oh * ow + oy * ow + ox);

                        for ky in 0..k {
                            let Some(iy) = (oy * stride + ky).checked_sub(pad).filter(|&iy| iy < h)
                            else {
                                continue;
                            };

                            for kx in 0..k {
                                let Some(ix) =
                                    (ox * stride + kx).checked_sub(pad).filter(|&ix| ix < w)
                                else {
                                    continue;
                                };

                                let base = (ky * k + kx) * c;
                                for ch in 0..c {
                                    image[[iy, ix, ch]] += row[base + ch];
                                }
                            }
                        }
                    }
                }
            });

        dx
    }

    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        let w_size = self.size - self.out_channels;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape((self.fan_in(), self.out_channels), dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.out_channels, db_raw)?;
        Ok((dw, db))
    }

    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let w_size = self.size - self.out_channels;
        let weights = ArrayView2::from_shape((self.fan_in(), self.out_channels), &params[..w_size])?;
        let biases = ArrayView1::from_shape(self.out_channels, &params[w_size..])?;
        Ok((weights, biases))
    }
}
