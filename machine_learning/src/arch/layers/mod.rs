mod conv2d;
mod dense;
mod global_avg_pool;
mod layer;
mod relu;

pub use conv2d::Conv2d;
pub use dense::Dense;
pub use global_avg_pool::GlobalAvgPool;
pub use layer::Layer;
pub use relu::Relu;
