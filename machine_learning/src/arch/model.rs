use ndarray::ArrayD;

use crate::Result;

/// A differentiable model whose parameters live outside of it, in one flat buffer.
///
/// Implementors cache whatever the backward pass needs during `forward`, so every replica
/// that runs in parallel owns its own clone of the model.
pub trait Model: Clone + Send {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Makes a forward pass through the model.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - A batch of inputs, the first axis being the batch axis.
    ///
    /// # Returns
    /// The prediction for the given input.
    fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// Backpropagates the derivative of the loss with respect to the last forward output.
    ///
    /// # Arguments
    /// * `params` - The same parameters given to the last `forward`.
    /// * `grad` - A buffer of `size()` elements where the gradient is written.
    /// * `d` - The derivative of the loss with respect to the model's output.
    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: ArrayD<f32>) -> Result<()>;
}
