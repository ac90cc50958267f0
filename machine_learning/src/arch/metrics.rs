use ndarray::{ArrayView2, Zip};

/// Counts the predictions that fall on the same side of `0.5` as their binary target.
pub fn binary_correct(y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> usize {
    Zip::from(&y_pred)
        .and(&y)
        .fold(0, |acc, &p, &t| acc + usize::from((p > 0.5) == (t > 0.5)))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn counts_matching_sides() {
        let y_pred = array![[0.9], [0.2], [0.5], [0.51]];
        let y = array![[1.], [1.], [0.], [0.]];
        assert_eq!(binary_correct(y_pred.view(), y.view()), 2);
    }
}
