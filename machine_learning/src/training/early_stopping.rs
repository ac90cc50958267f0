use log::info;

use super::{Callback, EpochLogs, Verdict};

/// Stops training once the validation loss has not improved for `patience` epochs, restoring the
/// parameters of the best epoch.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: f32,
    best_epoch: Option<usize>,
    best_params: Option<Vec<f32>>,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f32::INFINITY,
            best_epoch: None,
            best_params: None,
            wait: 0,
        }
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn wait(&self) -> usize {
        self.wait
    }
}

impl Callback for EarlyStopping {
    fn on_epoch_end(&mut self, epoch: usize, logs: &EpochLogs, params: &[f32]) -> Verdict {
        // Without any improvement the first epoch's parameters are the ones restored.
        if self.best_params.is_none() {
            self.best_params = Some(params.to_vec());
        }

        self.wait += 1;
        if logs.val_loss < self.best {
            self.best = logs.val_loss;
            self.best_epoch = Some(epoch);
            self.best_params = Some(params.to_vec());
            self.wait = 0;
            return Verdict::proceed();
        }

        if self.wait < self.patience || epoch == 0 {
            return Verdict::proceed();
        }

        info!(
            epoch = epoch + 1,
            best_epoch = self.best_epoch.map_or(0, |e| e + 1);
            "early stopping, restoring the best parameters"
        );
        Verdict::stop(self.best_params.clone())
    }
}
