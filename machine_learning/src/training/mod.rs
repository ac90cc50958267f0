mod callback;
mod early_stopping;
mod fitter;
mod history;
mod plateau;

pub use callback::{Callback, Control, EpochLogs, Verdict};
pub use early_stopping::EarlyStopping;
pub use fitter::Fitter;
pub use history::{History, StopReason};
pub use plateau::ReduceLrOnPlateau;
