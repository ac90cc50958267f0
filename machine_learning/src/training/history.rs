use super::EpochLogs;

/// Why a call to `fit` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    /// A callback stopped training at the end of this epoch.
    EarlyStopped { epoch: usize },
}

/// The record of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct History {
    pub logs: Vec<EpochLogs>,
    pub stop_reason: StopReason,
}

impl History {
    pub fn epochs(&self) -> usize {
        self.logs.len()
    }

    /// The epoch with the lowest validation loss, the first one on ties.
    pub fn best_epoch(&self) -> Option<usize> {
        self.logs
            .iter()
            .filter(|logs| !logs.val_loss.is_nan())
            .min_by(|a, b| a.val_loss.total_cmp(&b.val_loss))
            .map(|logs| logs.epoch)
    }
}
