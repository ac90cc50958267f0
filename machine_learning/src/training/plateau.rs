use log::info;

use super::{Callback, EpochLogs, Verdict};

/// Scales the learning rate down when the validation loss stops improving.
///
/// An epoch improves if its validation loss is below the best seen so far by more than
/// `min_delta`. After `patience` epochs in a row without improvement the learning rate is
/// multiplied by `factor`, never going below `min_lr`, and the count starts over.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    factor: f32,
    patience: usize,
    min_delta: f32,
    min_lr: f32,
    best: f32,
    wait: usize,
}

impl ReduceLrOnPlateau {
    /// Creates a new `ReduceLrOnPlateau` with `min_delta = 1e-4` and `min_lr = 0`.
    ///
    /// # Arguments
    /// * `factor` - The multiplier applied to the learning rate on a plateau.
    /// * `patience` - The amount of epochs without improvement that make a plateau.
    pub fn new(factor: f32, patience: usize) -> Self {
        Self {
            factor,
            patience,
            min_delta: 1e-4,
            min_lr: 0.,
            best: f32::INFINITY,
            wait: 0,
        }
    }

    pub fn with_min_lr(mut self, min_lr: f32) -> Self {
        self.min_lr = min_lr;
        self
    }

    pub fn with_min_delta(mut self, min_delta: f32) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// The amount of epochs since the last improvement or reduction.
    pub fn wait(&self) -> usize {
        self.wait
    }
}

impl Callback for ReduceLrOnPlateau {
    fn on_epoch_end(&mut self, epoch: usize, logs: &EpochLogs, _params: &[f32]) -> Verdict {
        let current = logs.val_loss;

        if current < self.best - self.min_delta {
            self.best = current;
            self.wait = 0;
            return Verdict::proceed();
        }

        self.wait += 1;
        if self.wait < self.patience || logs.lr <= self.min_lr {
            return Verdict::proceed();
        }

        let lr = (logs.lr * self.factor).max(self.min_lr);
        self.wait = 0;
        info!(epoch = epoch + 1, lr = lr; "reducing learning rate on plateau");
        Verdict::proceed().with_learning_rate(lr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::Control;

    fn logs(val_loss: f32, lr: f32) -> EpochLogs {
        EpochLogs {
            epoch: 0,
            loss: 0.,
            acc: 0.,
            val_loss,
            val_acc: 0.,
            lr,
        }
    }

    #[test]
    fn reduces_after_patience_epochs_without_improvement() {
        let mut plateau = ReduceLrOnPlateau::new(0.95, 4);

        assert_eq!(plateau.on_epoch_end(0, &logs(1.0, 1e-3), &[]).learning_rate, None);
        for epoch in 1..4 {
            let verdict = plateau.on_epoch_end(epoch, &logs(1.0, 1e-3), &[]);
            assert_eq!(verdict.learning_rate, None);
            assert_eq!(plateau.wait(), epoch);
        }

        let verdict = plateau.on_epoch_end(4, &logs(1.0, 1e-3), &[]);
        assert_eq!(verdict.control, Control::Continue);
        let lr = verdict.learning_rate.unwrap();
        assert!((lr - 0.95e-3).abs() < 1e-9);
        assert_eq!(plateau.wait(), 0);
    }

    #[test]
    fn tiny_improvements_do_not_count() {
        let mut plateau = ReduceLrOnPlateau::new(0.5, 2);

        plateau.on_epoch_end(0, &logs(1.0, 1.), &[]);
        plateau.on_epoch_end(1, &logs(0.99995, 1.), &[]);
        let verdict = plateau.on_epoch_end(2, &logs(0.99992, 1.), &[]);

        assert_eq!(verdict.learning_rate, Some(0.5));
    }

    #[test]
    fn improvement_resets_the_wait() {
        let mut plateau = ReduceLrOnPlateau::new(0.5, 2);

        plateau.on_epoch_end(0, &logs(1.0, 1.), &[]);
        plateau.on_epoch_end(1, &logs(1.0, 1.), &[]);
        plateau.on_epoch_end(2, &logs(0.5, 1.), &[]);
        assert_eq!(plateau.wait(), 0);

        let verdict = plateau.on_epoch_end(3, &logs(0.6, 1.), &[]);
        assert_eq!(verdict.learning_rate, None);
    }

    #[test]
    fn never_goes_below_the_minimum() {
        let mut plateau = ReduceLrOnPlateau::new(0.1, 1).with_min_lr(0.5);

        plateau.on_epoch_end(0, &logs(1.0, 1.), &[]);
        let verdict = plateau.on_epoch_end(1, &logs(1.0, 1.), &[]);
        assert_eq!(verdict.learning_rate, Some(0.5));

        let verdict = plateau.on_epoch_end(2, &logs(1.0, 0.5), &[]);
        assert_eq!(verdict.learning_rate, None);
    }

    #[test]
    fn zero_min_delta_counts_any_decrease() {
        let mut plateau = ReduceLrOnPlateau::new(0.5, 1).with_min_delta(0.);

        plateau.on_epoch_end(0, &logs(1.0, 1.), &[]);
        let verdict = plateau.on_epoch_end(1, &logs(0.99995, 1.), &[]);

        assert_eq!(verdict.learning_rate, None);
        assert_eq!(plateau.wait(), 0);
    }
}
