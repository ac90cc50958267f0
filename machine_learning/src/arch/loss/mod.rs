mod binary_cross_entropy;
mod loss_fn;

pub use binary_cross_entropy::BinaryCrossEntropy;
pub use loss_fn::LossFn;
