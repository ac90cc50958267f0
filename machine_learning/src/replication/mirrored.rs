use std::num::NonZeroUsize;

use ndarray::{Array2, ArrayD, ArrayView2, Axis, Ix2, Slice, concatenate};
use rayon::prelude::*;

use super::shard_range;
use crate::{
    MlErr, Result,
    arch::{Model, loss::LossFn, metrics::binary_correct},
};

/// Statistics of a batch pass, accumulated as sums so they can be merged across replicas and
/// across batches.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepStats {
    loss_sum: f64,
    correct: usize,
    samples: usize,
}

impl StepStats {
    /// Creates a new `StepStats`.
    ///
    /// # Arguments
    /// * `loss` - The mean loss over the samples.
    /// * `correct` - The amount of correctly classified samples.
    /// * `samples` - The amount of samples.
    pub fn new(loss: f32, correct: usize, samples: usize) -> Self {
        Self {
            loss_sum: loss as f64 * samples as f64,
            correct,
            samples,
        }
    }

    pub fn merge(&mut self, other: StepStats) {
        self.loss_sum += other.loss_sum;
        self.correct += other.correct;
        self.samples += other.samples;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// The sample-weighted mean loss.
    pub fn loss(&self) -> f32 {
        if self.samples == 0 {
            return 0.;
        }

        (self.loss_sum / self.samples as f64) as f32
    }

    /// The fraction of correctly classified samples.
    pub fn accuracy(&self) -> f32 {
        if self.samples == 0 {
            return 0.;
        }

        self.correct as f32 / self.samples as f32
    }
}

/// One copy of the model with its own gradient buffer.
#[derive(Clone)]
struct Replica<M: Model> {
    model: M,
    grad: Vec<f32>,
}

impl<M: Model> Replica<M> {
    fn predict(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<Array2<f32>> {
        Ok(self.model.forward(params, x)?.into_dimensionality::<Ix2>()?)
    }

    fn evaluate<L: LossFn>(
        &mut self,
        params: &[f32],
        loss_fn: &L,
        x: ArrayD<f32>,
        y: ArrayView2<f32>,
    ) -> Result<(Array2<f32>, StepStats)> {
        let y_pred = self.predict(params, x)?;
        if y_pred.dim() != y.dim() {
            return Err(MlErr::SizeMismatch {
                what: "targets",
                got: y.len(),
                expected: y_pred.len(),
            });
        }

        let loss = loss_fn.loss(y_pred.view(), y);
        let correct = binary_correct(y_pred.view(), y);
        let stats = StepStats::new(loss, correct, y.nrows());
        Ok((y_pred, stats))
    }

    fn step<L: LossFn>(
        &mut self,
        params: &[f32],
        loss_fn: &L,
        x: ArrayD<f32>,
        y: ArrayView2<f32>,
    ) -> Result<StepStats> {
        let (y_pred, stats) = self.evaluate(params, loss_fn, x, y)?;
        let d = loss_fn.loss_prime(y_pred.view(), y);
        self.model.backward(params, &mut self.grad, d.into_dyn())?;
        Ok(stats)
    }
}

/// Synchronous data-parallel replication of a model.
///
/// Every batch is split into balanced contiguous shards, one per replica. Replicas compute their
/// shard's gradient in parallel against the same parameters, then the gradients are reduced into
/// their sample-weighted mean, which equals the gradient of the whole batch.
pub struct Mirrored<M: Model> {
    replicas: Vec<Replica<M>>,
}

impl<M: Model> Mirrored<M> {
    /// Creates a new `Mirrored` strategy.
    ///
    /// # Arguments
    /// * `model` - The model to replicate.
    /// * `replicas` - The amount of copies to run in parallel.
    pub fn new(model: M, replicas: NonZeroUsize) -> Self {
        let replica = Replica {
            grad: vec![0.; model.size()],
            model,
        };

        Self {
            replicas: vec![replica; replicas.get()],
        }
    }

    pub fn replicas(&self) -> usize {
        self.replicas.len()
    }

    /// Returns the amount of parameters of the replicated model.
    pub fn size(&self) -> usize {
        self.replicas[0].model.size()
    }

    /// Computes the mean gradient of the loss over a labeled batch.
    ///
    /// # Arguments
    /// * `params` - The parameters shared by every replica.
    /// * `loss_fn` - The loss function.
    /// * `x` - The batch inputs.
    /// * `y` - The `(batch, 1)` targets.
    /// * `grad` - The buffer the reduced gradient is written to.
    ///
    /// # Returns
    /// The statistics of the batch.
    pub fn compute_gradient<L>(
        &mut self,
        params: &[f32],
        loss_fn: &L,
        x: &ArrayD<f32>,
        y: &Array2<f32>,
        grad: &mut [f32],
    ) -> Result<StepStats>
    where
        L: LossFn + Sync,
    {
        let n = self.check_batch(x, y)?;
        if grad.len() != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "gradient",
                got: grad.len(),
                expected: self.size(),
            });
        }

        let count = self.replicas.len();
        let shards: Vec<StepStats> = self
            .replicas
            .par_iter_mut()
            .enumerate()
            .map(|(id, replica)| {
                let range = shard_range(n, id, count);
                if range.is_empty() {
                    return Ok(StepStats::default());
                }

                let xs = x.slice_axis(Axis(0), Slice::from(range.clone())).to_owned();
                let ys = y.slice_axis(Axis(0), Slice::from(range));
                replica.step(params, loss_fn, xs, ys)
            })
            .collect::<Result<_>>()?;

        grad.fill(0.);
        let mut stats = StepStats::default();

        for (replica, shard) in self.replicas.iter().zip(shards) {
            if shard.samples() == 0 {
                continue;
            }

            let weight = shard.samples() as f32 / n as f32;
            grad.par_iter_mut()
                .zip(replica.grad.par_iter())
                .for_each(|(g, r)| *g += weight * r);

            stats.merge(shard);
        }

        Ok(stats)
    }

    /// Measures the loss and accuracy over a labeled batch without computing gradients.
    pub fn evaluate<L>(
        &mut self,
        params: &[f32],
        loss_fn: &L,
        x: &ArrayD<f32>,
        y: &Array2<f32>,
    ) -> Result<StepStats>
    where
        L: LossFn + Sync,
    {
        let n = self.check_batch(x, y)?;
        let count = self.replicas.len();

        let shards: Vec<StepStats> = self
            .replicas
            .par_iter_mut()
            .enumerate()
            .map(|(id, replica)| {
                let range = shard_range(n, id, count);
                if range.is_empty() {
                    return Ok(StepStats::default());
                }

                let xs = x.slice_axis(Axis(0), Slice::from(range.clone())).to_owned();
                let ys = y.slice_axis(Axis(0), Slice::from(range));
                Ok(replica.evaluate(params, loss_fn, xs, ys)?.1)
            })
            .collect::<Result<_>>()?;

        let mut stats = StepStats::default();
        shards.into_iter().for_each(|shard| stats.merge(shard));
        Ok(stats)
    }

    /// Runs the model over a batch, keeping the order of its samples.
    ///
    /// # Returns
    /// A `(batch, outputs)` array of predictions.
    pub fn predict(&mut self, params: &[f32], x: &ArrayD<f32>) -> Result<Array2<f32>> {
        let n = x.shape().first().copied().unwrap_or(0);
        let count = self.replicas.len();

        let shards: Vec<Option<Array2<f32>>> = self
            .replicas
            .par_iter_mut()
            .enumerate()
            .map(|(id, replica)| {
                let range = shard_range(n, id, count);
                if range.is_empty() {
                    return Ok(None);
                }

                let xs = x.slice_axis(Axis(0), Slice::from(range)).to_owned();
                replica.predict(params, xs).map(Some)
            })
            .collect::<Result<_>>()?;

        let views: Vec<ArrayView2<f32>> = shards.iter().flatten().map(|s| s.view()).collect();
        if views.is_empty() {
            return Ok(Array2::zeros((0, 1)));
        }

        Ok(concatenate(Axis(0), &views)?)
    }

    fn check_batch(&self, x: &ArrayD<f32>, y: &Array2<f32>) -> Result<usize> {
        let n = x.shape().first().copied().unwrap_or(0);
        if y.nrows() != n {
            return Err(MlErr::SizeMismatch {
                what: "batch targets",
                got: y.nrows(),
                expected: n,
            });
        }

        Ok(n)
    }
}
