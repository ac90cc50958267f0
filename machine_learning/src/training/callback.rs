use serde::Serialize;

/// The metrics of a finished epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochLogs {
    pub epoch: usize,
    pub loss: f32,
    pub acc: f32,
    pub val_loss: f32,
    pub val_acc: f32,
    /// The learning rate the next epoch will use.
    pub lr: f32,
}

/// Whether training goes on after a callback ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Continue,
    /// Stop after this epoch, optionally replacing the parameters with `restore`.
    Stop { restore: Option<Vec<f32>> },
}

/// What a callback asks the training loop to do.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub control: Control,
    pub learning_rate: Option<f32>,
}

impl Verdict {
    pub fn proceed() -> Self {
        Self {
            control: Control::Continue,
            learning_rate: None,
        }
    }

    pub fn stop(restore: Option<Vec<f32>>) -> Self {
        Self {
            control: Control::Stop { restore },
            learning_rate: None,
        }
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = Some(learning_rate);
        self
    }
}

/// An observer of the training loop, notified at the end of every epoch.
pub trait Callback {
    /// Inspects a finished epoch.
    ///
    /// # Arguments
    /// * `epoch` - The zero based index of the epoch.
    /// * `logs` - The epoch's metrics, including any learning rate change made by the callbacks
    ///   that ran before this one.
    /// * `params` - The model parameters after the epoch.
    fn on_epoch_end(&mut self, epoch: usize, logs: &EpochLogs, params: &[f32]) -> Verdict;
}
