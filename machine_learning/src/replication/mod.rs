mod mirrored;
mod shard;

pub use mirrored::{Mirrored, StepStats};
pub use shard::shard_range;
