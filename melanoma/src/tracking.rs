use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use log::{info, warn};
use machine_learning::{
    checkpoint,
    training::{Callback, EpochLogs, Verdict},
};
use serde::Serialize;

use crate::{PipelineErr, Result, config::PipelineConfig, model};

const CONFIG_FILE: &str = "config.json";
const METRICS_FILE: &str = "metrics.jsonl";
const WEIGHTS_FILE: &str = "weights.safetensors";
const SUMMARY_FILE: &str = "summary.json";

/// The best epoch of a run so far.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
struct RunSummary {
    best_val_loss: f32,
    best_epoch: usize,
}

/// Records a run into `<runs_dir>/<project>/<run name>`.
///
/// The run's configuration is written when the logger is created and every epoch's metrics are
/// appended as one JSON line. The weights and `summary.json` are only written when the validation
/// loss improves on the best so far. Failing to write never stops training, it is only logged.
pub struct ExperimentLogger {
    dir: Option<PathBuf>,
    backbone_size: usize,
    best: Option<RunSummary>,
}

impl ExperimentLogger {
    /// Creates the run directory and writes the configuration into it.
    ///
    /// # Arguments
    /// * `config` - The configuration of the run.
    /// * `backbone_size` - Where the weights are split between the `backbone` and `head` tensors.
    pub fn new(config: &PipelineConfig, backbone_size: usize) -> Self {
        let tracking = &config.tracking;
        let run_name = tracking.run_name.clone().unwrap_or_else(default_run_name);
        let dir = tracking.runs_dir.join(&tracking.project).join(run_name);

        let dir = match init_run(&dir, config) {
            Ok(()) => {
                info!("tracking the run in {}", dir.display());
                Some(dir)
            }
            Err(e) => {
                warn!("experiment tracking disabled: {e}");
                None
            }
        };

        Self {
            dir,
            backbone_size,
            best: None,
        }
    }

    /// The run directory, unless it could not be created.
    pub fn run_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// The lowest validation loss seen and its epoch, if any epoch finished.
    pub fn best(&self) -> Option<(f32, usize)> {
        self.best.map(|b| (b.best_val_loss, b.best_epoch))
    }

    fn improves(&self, val_loss: f32) -> bool {
        self.best.is_none_or(|b| val_loss < b.best_val_loss)
    }

    fn record(&self, dir: &Path, logs: &EpochLogs) -> Result<()> {
        let metrics = dir.join(METRICS_FILE);
        let io_err = |source| PipelineErr::Io {
            path: metrics.clone(),
            source,
        };

        let mut line = serde_json::to_vec(logs).map_err(|e| io_err(e.into()))?;
        line.push(b'\n');

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&metrics)
            .and_then(|mut file| file.write_all(&line))
            .map_err(io_err)
    }

    fn save_best(&self, dir: &Path, summary: RunSummary, params: &[f32]) -> Result<()> {
        checkpoint::save(dir.join(WEIGHTS_FILE), &model::tensors(params, self.backbone_size))?;

        let path = dir.join(SUMMARY_FILE);
        let io_err = |source| PipelineErr::Io {
            path: path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(&summary).map_err(|e| io_err(e.into()))?;
        fs::write(&path, json).map_err(io_err)
    }
}

impl Callback for ExperimentLogger {
    fn on_epoch_end(&mut self, epoch: usize, logs: &EpochLogs, params: &[f32]) -> Verdict {
        // NaN never improves.
        let improved = !logs.val_loss.is_nan() && self.improves(logs.val_loss);
        let summary = RunSummary {
            best_val_loss: logs.val_loss,
            best_epoch: epoch,
        };

        if let Some(dir) = &self.dir {
            if let Err(e) = self.record(dir, logs) {
                warn!(epoch = epoch + 1; "failed to record the epoch: {e}");
            }

            if improved {
                if let Err(e) = self.save_best(dir, summary, params) {
                    warn!(epoch = epoch + 1; "failed to save the best weights: {e}");
                }
            }
        }

        if improved {
            self.best = Some(summary);
        }

        Verdict::proceed()
    }
}

fn init_run(dir: &Path, config: &PipelineConfig) -> Result<()> {
    let path = dir.join(CONFIG_FILE);
    let io_err = |source| PipelineErr::Io {
        path: path.clone(),
        source,
    };

    fs::create_dir_all(dir).map_err(io_err)?;
    let json = serde_json::to_string_pretty(config).map_err(|e| io_err(e.into()))?;
    fs::write(&path, json).map_err(io_err)
}

fn default_run_name() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    format!("run-{secs}")
}
