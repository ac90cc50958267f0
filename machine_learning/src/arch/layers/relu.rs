use ndarray::ArrayD;

/// The rectified linear unit, `max(0, x)`, applied element-wise to inputs of any shape.
#[derive(Clone, Debug, Default)]
pub struct Relu {
    a: ArrayD<f32>,
}

impl Relu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, mut x: ArrayD<f32>) -> ArrayD<f32> {
        x.mapv_inplace(|x| x.max(0.));
        self.a = x.clone();
        x
    }

    pub fn backward(&mut self, mut d: ArrayD<f32>) -> ArrayD<f32> {
        d.zip_mut_with(&self.a, |d, &a| {
            if a <= 0. {
                *d = 0.;
            }
        });

        d
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{IxDyn, array};

    use super::*;

    #[test]
    fn masks_negative_inputs_both_ways() {
        let mut relu = Relu::new();
        let x = array![[-1., 2.], [0., 3.]].into_dyn();

        let y = relu.forward(x);
        assert_eq!(y, array![[0., 2.], [0., 3.]].into_dyn());

        let d = relu.backward(ArrayD::ones(IxDyn(&[2, 2])));
        assert_eq!(d, array![[0., 1.], [0., 1.]].into_dyn());
    }
}
