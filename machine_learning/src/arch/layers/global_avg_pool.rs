use ndarray::prelude::*;

/// Averages every channel of an NHWC feature map over its spatial dimensions.
#[derive(Clone, Debug, Default)]
pub struct GlobalAvgPool {
    spatial: (usize, usize),
}

impl GlobalAvgPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns a `(batch, h, w, c)` array into a `(batch, c)` one.
    pub fn forward(&mut self, x: Array4<f32>) -> Array2<f32> {
        let (_, h, w, _) = x.dim();
        self.spatial = (h, w);

        let area = (h * w).max(1) as f32;
        x.sum_axis(Axis(1)).sum_axis(Axis(1)) / area
    }

    pub fn backward(&mut self, d: Array2<f32>) -> Array4<f32> {
        let (n, c) = d.dim();
        let (h, w) = self.spatial;
        let scale = 1. / (h * w).max(1) as f32;

        Array4::from_shape_fn((n, h, w, c), |(b, _, _, ch)| d[[b, ch]] * scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_each_channel() {
        let mut pool = GlobalAvgPool::new();
        let x = Array4::from_shape_fn((1, 2, 2, 2), |(_, y, x, c)| (y * 2 + x) as f32 + 10. * c as f32);

        let y = pool.forward(x);
        assert_eq!(y, array![[1.5, 11.5]]);

        let d = pool.backward(array![[4., 8.]]);
        assert_eq!(d.dim(), (1, 2, 2, 2));
        assert!(d.iter().step_by(2).all(|&v| v == 1.));
        assert!(d.iter().skip(1).step_by(2).all(|&v| v == 2.));
    }
}
