use ndarray::{Array3, ArrayView3, ArrayViewMut1, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{PipelineErr, Result};

/// The random transformations applied to training images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Rotations are drawn uniformly from `[-rotation_range, rotation_range]` degrees.
    pub rotation_range: f32,
    /// Shifts are `-shift` or `+shift` times the image side, each with equal chance.
    pub shift: f32,
    /// Shear angles are drawn uniformly from `[-shear_range, shear_range]` radians.
    pub shear_range: f32,
    /// Zoom factors are drawn per axis from `[1 - zoom_range, 1 + zoom_range]`.
    pub zoom_range: f32,
    pub horizontal_flip: bool,
    pub vertical_flip: bool,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            rotation_range: 180.,
            shift: 0.1,
            shear_range: 0.1,
            zoom_range: 0.25,
            horizontal_flip: true,
            vertical_flip: true,
        }
    }
}

impl AugmentConfig {
    pub fn validate(&self) -> Result<()> {
        let ranges = [self.rotation_range, self.shift, self.shear_range, self.zoom_range];
        if ranges.iter().any(|r| !r.is_finite() || *r < 0.) {
            return Err(PipelineErr::InvalidConfig(
                "augmentation ranges must be finite and non negative".to_string(),
            ));
        }

        if self.zoom_range >= 1. {
            return Err(PipelineErr::InvalidConfig(
                "zoom_range must be below 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Draws the transformation of one image.
    ///
    /// # Arguments
    /// * `rows` - The height of the image.
    /// * `cols` - The width of the image.
    /// * `rng` - The image's random number generator.
    pub fn sample<R: Rng>(&self, rows: usize, cols: usize, rng: &mut R) -> Transform {
        let symmetric = |rng: &mut R, r: f32| if r > 0. { rng.random_range(-r..=r) } else { 0. };
        let choice = |rng: &mut R, r: f32| if rng.random_bool(0.5) { r } else { -r };

        let theta = symmetric(rng, self.rotation_range).to_radians();
        let tx = choice(rng, self.shift) * rows as f32;
        let ty = choice(rng, self.shift) * cols as f32;
        let shear = symmetric(rng, self.shear_range);
        let zx = 1. + symmetric(rng, self.zoom_range);
        let zy = 1. + symmetric(rng, self.zoom_range);
        let flip_horizontal = self.horizontal_flip && rng.random_bool(0.5);
        let flip_vertical = self.vertical_flip && rng.random_bool(0.5);

        Transform {
            theta,
            tx,
            ty,
            shear,
            zx,
            zy,
            flip_horizontal,
            flip_vertical,
        }
    }
}

/// A concrete affine transformation followed by optional flips.
///
/// The affine part maps every output pixel `(row, col)` back to the input position it samples
/// from, about the image centre. Samples are bilinear and positions outside of the image take
/// the value of the nearest edge pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Rotation in radians.
    pub theta: f32,
    /// Shift along the rows, in pixels.
    pub tx: f32,
    /// Shift along the columns, in pixels.
    pub ty: f32,
    /// Shear in radians.
    pub shear: f32,
    pub zx: f32,
    pub zy: f32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

type Matrix = [[f32; 3]; 3];

impl Transform {
    pub fn identity() -> Self {
        Self {
            theta: 0.,
            tx: 0.,
            ty: 0.,
            shear: 0.,
            zx: 1.,
            zy: 1.,
            flip_horizontal: false,
            flip_vertical: false,
        }
    }

    /// Applies the transformation to an `(rows, cols, channels)` image.
    pub fn apply(&self, image: ArrayView3<f32>) -> Array3<f32> {
        let (rows, cols, _) = image.dim();
        if rows == 0 || cols == 0 {
            return image.to_owned();
        }

        let m = self.matrix(rows, cols);
        let mut out = Array3::zeros(image.raw_dim());

        for (r, mut row) in out.axis_iter_mut(Axis(0)).enumerate() {
            for (c, pixel) in row.axis_iter_mut(Axis(0)).enumerate() {
                let (rf, cf) = (r as f32, c as f32);
                let sr = m[0][0] * rf + m[0][1] * cf + m[0][2];
                let sc = m[1][0] * rf + m[1][1] * cf + m[1][2];
                bilinear(image, sr, sc, pixel);
            }
        }

        if self.flip_horizontal {
            out.invert_axis(Axis(1));
        }
        if self.flip_vertical {
            out.invert_axis(Axis(0));
        }

        out
    }

    /// `offset · rotation · shift · shear · zoom · reset`, with the centre at `side / 2 + 0.5`.
    fn matrix(&self, rows: usize, cols: usize) -> Matrix {
        let (sin, cos) = self.theta.sin_cos();
        let rotation = [[cos, -sin, 0.], [sin, cos, 0.], [0., 0., 1.]];
        let shift = [[1., 0., self.tx], [0., 1., self.ty], [0., 0., 1.]];
        let shear = [[1., -self.shear.sin(), 0.], [0., self.shear.cos(), 0.], [0., 0., 1.]];
        let zoom = [[self.zx, 0., 0.], [0., self.zy, 0.], [0., 0., 1.]];

        let (or, oc) = (rows as f32 / 2. + 0.5, cols as f32 / 2. + 0.5);
        let offset = [[1., 0., or], [0., 1., oc], [0., 0., 1.]];
        let reset = [[1., 0., -or], [0., 1., -oc], [0., 0., 1.]];

        [rotation, shift, shear, zoom, reset]
            .iter()
            .fold(offset, |acc, m| matmul(&acc, m))
    }
}

fn matmul(a: &Matrix, b: &Matrix) -> Matrix {
    let mut out = [[0.; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }

    out
}

/// Interpolates every channel at `(r, c)` into `out`, clamping the position into the image.
fn bilinear(image: ArrayView3<f32>, r: f32, c: f32, mut out: ArrayViewMut1<f32>) {
    let (rows, cols, _) = image.dim();
    let r = r.clamp(0., (rows - 1) as f32);
    let c = c.clamp(0., (cols - 1) as f32);

    let (r0, c0) = (r.floor() as usize, c.floor() as usize);
    let (r1, c1) = ((r0 + 1).min(rows - 1), (c0 + 1).min(cols - 1));
    let (fr, fc) = (r - r0 as f32, c - c0 as f32);

    for (ch, v) in out.iter_mut().enumerate() {
        let top = image[[r0, c0, ch]] * (1. - fc) + image[[r0, c1, ch]] * fc;
        let bottom = image[[r1, c0, ch]] * (1. - fc) + image[[r1, c1, ch]] * fc;
        *v = top * (1. - fr) + bottom * fr;
    }
}
