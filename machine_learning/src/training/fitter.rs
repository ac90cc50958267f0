use std::ops::Range;

use log::{debug, info};

use super::{Callback, Control, EpochLogs, History, StopReason};
use crate::{
    MlErr, Result,
    arch::{Model, loss::LossFn},
    dataset::BatchSource,
    optimization::Optimizer,
    replication::{Mirrored, StepStats},
};

/// Drives the epoch loop of a replicated model.
///
/// Only the parameters inside `trainable` are updated by the optimizer; everything outside of it
/// is frozen.
pub struct Fitter<M: Model, O: Optimizer, L: LossFn> {
    strategy: Mirrored<M>,
    optimizer: O,
    loss_fn: L,
    trainable: Range<usize>,
    grad: Vec<f32>,
}

impl<M, O, L> Fitter<M, O, L>
where
    M: Model,
    O: Optimizer,
    L: LossFn + Sync,
{
    /// Creates a new `Fitter`.
    ///
    /// # Arguments
    /// * `strategy` - The replicated model.
    /// * `optimizer` - The optimizer, sized to the trainable range.
    /// * `loss_fn` - The loss to minimize.
    /// * `trainable` - The range of the parameter buffer the optimizer updates.
    ///
    /// # Returns
    /// An error if `trainable` does not lie inside the model's parameters.
    pub fn new(strategy: Mirrored<M>, optimizer: O, loss_fn: L, trainable: Range<usize>) -> Result<Self> {
        let size = strategy.size();
        if trainable.start > trainable.end || trainable.end > size {
            return Err(MlErr::InvalidInput("trainable range out of the model parameters"));
        }

        Ok(Self {
            strategy,
            optimizer,
            loss_fn,
            trainable,
            grad: vec![0.; size],
        })
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn trainable(&self) -> Range<usize> {
        self.trainable.clone()
    }

    /// Trains the model for up to `epochs` epochs.
    ///
    /// Every epoch runs one pass over `train`, updating the parameters after each batch, then one
    /// pass over `val` to measure the validation metrics. The callbacks are notified in order at
    /// the end of each epoch.
    ///
    /// # Arguments
    /// * `params` - The model parameters, updated in place.
    /// * `train` - The labeled training batches.
    /// * `val` - The labeled validation batches.
    /// * `epochs` - The maximum amount of epochs.
    /// * `callbacks` - The epoch observers.
    ///
    /// # Returns
    /// The per-epoch metrics and the reason training ended.
    pub fn fit<T, V>(
        &mut self,
        params: &mut [f32],
        mut train: T,
        mut val: V,
        epochs: usize,
        callbacks: &mut [Box<dyn Callback + '_>],
    ) -> Result<History>
    where
        T: BatchSource,
        V: BatchSource,
    {
        let mut logs = Vec::with_capacity(epochs);

        for epoch in 0..epochs {
            let train_stats = self.train_epoch(params, &mut train)?;
            let val_stats = self.evaluate(params, &mut val)?;
            if val_stats.samples() == 0 {
                return Err(MlErr::EmptyPass { what: "validation" });
            }

            let mut epoch_logs = EpochLogs {
                epoch,
                loss: train_stats.loss(),
                acc: train_stats.accuracy(),
                val_loss: val_stats.loss(),
                val_acc: val_stats.accuracy(),
                lr: self.optimizer.learning_rate(),
            };

            info!(
                epoch = epoch + 1,
                loss = epoch_logs.loss,
                acc = epoch_logs.acc,
                val_loss = epoch_logs.val_loss,
                val_acc = epoch_logs.val_acc;
                "epoch {}/{epochs} finished", epoch + 1
            );

            let mut stop = None;
            for callback in callbacks.iter_mut() {
                let verdict = callback.on_epoch_end(epoch, &epoch_logs, params);

                if let Some(lr) = verdict.learning_rate {
                    self.optimizer.set_learning_rate(lr);
                    epoch_logs.lr = lr;
                }

                if let Control::Stop { restore } = verdict.control {
                    // The first callback asking to stop decides what is restored.
                    stop.get_or_insert(restore);
                }
            }

            logs.push(epoch_logs);

            if let Some(restore) = stop {
                if let Some(best) = restore {
                    self.restore(params, &best)?;
                }

                return Ok(History {
                    logs,
                    stop_reason: StopReason::EarlyStopped { epoch },
                });
            }
        }

        Ok(History {
            logs,
            stop_reason: StopReason::Completed,
        })
    }

    /// Measures the loss and accuracy over one pass of labeled batches.
    pub fn evaluate<S: BatchSource>(&mut self, params: &[f32], mut source: S) -> Result<StepStats> {
        source.reset();
        let mut stats = StepStats::default();

        for _ in 0..source.steps() {
            let Some(batch) = source.next_batch() else {
                break;
            };

            let batch = batch?;
            let y = batch
                .y
                .as_ref()
                .ok_or(MlErr::InvalidInput("evaluation batches must be labeled"))?;
            stats.merge(self.strategy.evaluate(params, &self.loss_fn, &batch.x, y)?);
        }

        Ok(stats)
    }

    /// Runs the model over one pass of `source`.
    ///
    /// # Returns
    /// The first output of every sample, in the order the source produced them.
    pub fn predict<S: BatchSource>(&mut self, params: &[f32], mut source: S) -> Result<Vec<f32>> {
        source.reset();
        let mut predictions = Vec::new();

        for _ in 0..source.steps() {
            let Some(batch) = source.next_batch() else {
                break;
            };

            let y_pred = self.strategy.predict(params, &batch?.x)?;
            predictions.extend(y_pred.column(0).iter().copied());
        }

        Ok(predictions)
    }

    fn train_epoch<T: BatchSource>(&mut self, params: &mut [f32], train: &mut T) -> Result<StepStats> {
        train.reset();
        let mut stats = StepStats::default();

        for step in 0..train.steps() {
            let Some(batch) = train.next_batch() else {
                break;
            };

            let batch = batch?;
            let y = batch
                .y
                .as_ref()
                .ok_or(MlErr::InvalidInput("training batches must be labeled"))?;

            let step_stats =
                self.strategy
                    .compute_gradient(params, &self.loss_fn, &batch.x, y, &mut self.grad)?;

            let range = self.trainable.clone();
            self.optimizer
                .update_params(&self.grad[range.clone()], &mut params[range])?;

            debug!(step = step, loss = step_stats.loss(); "batch done");
            stats.merge(step_stats);
        }

        if stats.samples() == 0 {
            return Err(MlErr::EmptyPass { what: "training" });
        }

        Ok(stats)
    }

    fn restore(&self, params: &mut [f32], best: &[f32]) -> Result<()> {
        if best.len() != params.len() {
            return Err(MlErr::SizeMismatch {
                what: "restored params",
                got: best.len(),
                expected: params.len(),
            });
        }

        params.copy_from_slice(best);
        Ok(())
    }
}
