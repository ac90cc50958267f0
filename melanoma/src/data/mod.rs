mod augment;
mod generator;
mod split;
mod table;

pub use augment::{AugmentConfig, Transform};
pub use generator::{ImageGenerator, Loader, Role};
pub use split::{Split, train_test_split};
pub use table::{Label, Record, head, log_head, read_labeled, read_unlabeled};
