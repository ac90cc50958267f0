use ndarray::{Array2, ArrayD};

use crate::Result;

/// A group of samples, the first axis of every array being the batch axis.
#[derive(Debug, Clone)]
pub struct Batch {
    pub x: ArrayD<f32>,
    /// The `(batch, 1)` targets, absent for unlabeled data.
    pub y: Option<Array2<f32>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.x.shape().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A restartable source of batches.
///
/// A *pass* is one traversal of the underlying samples. Sources decide whether they stop at the
/// end of a pass or start the next one on their own; in both cases `reset` abandons whatever is
/// left of the current pass.
pub trait BatchSource {
    /// The amount of batches in a full pass.
    fn steps(&self) -> usize;

    /// Rewinds to the start of a new pass.
    fn reset(&mut self);

    /// Produces the next batch, or `None` if the source has no more batches to give.
    fn next_batch(&mut self) -> Option<Result<Batch>>;
}

impl<S: BatchSource + ?Sized> BatchSource for &mut S {
    fn steps(&self) -> usize {
        (**self).steps()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn next_batch(&mut self) -> Option<Result<Batch>> {
        (**self).next_batch()
    }
}
