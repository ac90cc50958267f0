use std::{
    env,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{PipelineErr, Result, data::AugmentConfig};

/// Names a JSON file whose fields override the defaults.
pub const CONFIG_VAR: &str = "MELANOMA_CONFIG";
/// Overrides the data root.
pub const ROOT_VAR: &str = "MELANOMA_ROOT";

/// Every constant of a training run.
///
/// Deserializing fills missing fields with their defaults, so a config file only needs the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    /// The side every image is resized to.
    pub image_size: u32,
    pub batch_size: usize,
    pub epochs: usize,
    pub seed: u64,
    /// The fraction of the training table held out for validation.
    pub val_fraction: f64,
    pub loader: LoaderConfig,
    pub augmentation: AugmentConfig,
    pub model: ModelConfig,
    pub callbacks: CallbacksConfig,
    pub tracking: TrackingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            image_size: 224,
            batch_size: 1024,
            epochs: 10,
            seed: 777,
            val_fraction: 0.05,
            loader: LoaderConfig::default(),
            augmentation: AugmentConfig::default(),
            model: ModelConfig::default(),
            callbacks: CallbacksConfig::default(),
            tracking: TrackingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub root: PathBuf,
    pub train_csv: PathBuf,
    pub test_csv: PathBuf,
    pub submission_template: PathBuf,
    pub train_images: PathBuf,
    pub test_images: PathBuf,
    /// Where the submission is written, relative to the working directory.
    pub output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/data/jerry/private/data"),
            train_csv: PathBuf::from("new_train.csv"),
            test_csv: PathBuf::from("new_test.csv"),
            submission_template: PathBuf::from("sample_submission.csv"),
            train_images: PathBuf::from("jpeg/train"),
            test_images: PathBuf::from("jpeg/test"),
            output: PathBuf::from("submission.csv"),
        }
    }
}

impl PathsConfig {
    pub fn train_csv(&self) -> PathBuf {
        self.root.join(&self.train_csv)
    }

    pub fn test_csv(&self) -> PathBuf {
        self.root.join(&self.test_csv)
    }

    pub fn submission_template(&self) -> PathBuf {
        self.root.join(&self.submission_template)
    }

    pub fn train_images(&self) -> PathBuf {
        self.root.join(&self.train_images)
    }

    pub fn test_images(&self) -> PathBuf {
        self.root.join(&self.test_images)
    }
}

/// Background image loading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// The threads decoding images.
    pub workers: usize,
    /// The capacity, in batches, of the prefetch queue.
    pub max_queue_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            workers: 24,
            max_queue_size: 32,
        }
    }
}

/// One `Conv2d(3x3) + ReLU` stage of the backbone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub channels: usize,
    pub stride: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub backbone: Vec<StageConfig>,
    /// A safetensors file holding a `backbone` tensor to start from.
    pub backbone_weights: Option<PathBuf>,
    pub freeze_backbone: bool,
    /// The amount of model replicas, every available core if unset.
    pub replicas: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let stage = |channels| StageConfig {
            channels,
            stride: 2,
        };

        Self {
            backbone: vec![stage(32), stage(64), stage(128), stage(256)],
            backbone_weights: None,
            freeze_backbone: false,
            replicas: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbacksConfig {
    pub plateau_factor: f32,
    pub plateau_patience: usize,
    pub plateau_min_lr: f32,
    pub early_stopping_patience: usize,
}

impl Default for CallbacksConfig {
    fn default() -> Self {
        Self {
            plateau_factor: 0.95,
            plateau_patience: 4,
            plateau_min_lr: 0.,
            early_stopping_patience: 7,
        }
    }
}

/// The local run directory experiment metrics are written to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub runs_dir: PathBuf,
    pub project: String,
    /// Defaults to `run-<unix seconds>`.
    pub run_name: Option<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("runs"),
            project: String::from("kaggle_melanoma"),
            run_name: None,
        }
    }
}

impl PipelineConfig {
    /// Loads the configuration from the environment.
    ///
    /// Starts from the file named by `MELANOMA_CONFIG`, or the defaults if unset, then applies
    /// `MELANOMA_ROOT`.
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var_os(CONFIG_VAR) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(root) = env::var_os(ROOT_VAR) {
            config.paths.root = PathBuf::from(root);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| PipelineErr::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_reader(BufReader::new(file)).map_err(|source| PipelineErr::ConfigFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks every value is usable.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(PipelineErr::InvalidConfig(msg.to_string()));

        if self.image_size == 0 {
            return fail("image_size must be positive");
        }
        if self.batch_size == 0 {
            return fail("batch_size must be positive");
        }
        if !(self.val_fraction > 0. && self.val_fraction < 1.) {
            return fail("val_fraction must lie in (0, 1)");
        }
        if self.loader.workers == 0 || self.loader.max_queue_size == 0 {
            return fail("loader workers and max_queue_size must be positive");
        }
        if self.model.backbone.is_empty() {
            return fail("the backbone needs at least one stage");
        }
        if self.model.backbone.iter().any(|s| s.channels == 0 || s.stride == 0) {
            return fail("backbone stages need positive channels and stride");
        }
        if self.model.replicas == Some(0) {
            return fail("replicas must be positive");
        }
        if !(self.callbacks.plateau_factor > 0. && self.callbacks.plateau_factor < 1.) {
            return fail("plateau_factor must lie in (0, 1)");
        }

        self.augmentation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_the_reference_run() {
        let config = PipelineConfig::default();

        assert_eq!(config.image_size, 224);
        assert_eq!(config.batch_size, 1024);
        assert_eq!(config.seed, 777);
        assert_eq!(config.epochs, 10);
        assert_eq!(config.loader.workers, 24);
        assert_eq!(config.loader.max_queue_size, 32);
        assert_eq!(
            config.paths.train_csv(),
            Path::new("/data/jerry/private/data/new_train.csv")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_files_keep_the_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "epochs": 3, "paths": { "root": "/tmp/data" } }"#).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();

        assert_eq!(config.epochs, 3);
        assert_eq!(config.paths.root, Path::new("/tmp/data"));
        assert_eq!(config.paths.test_csv, Path::new("new_test.csv"));
        assert_eq!(config.batch_size, 1024);
    }

    #[test]
    fn malformed_files_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ epochs: ").unwrap();

        assert!(matches!(
            PipelineConfig::from_file(&path),
            Err(PipelineErr::ConfigFormat { .. })
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = PipelineConfig::default();
        config.val_fraction = 1.;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.model.backbone.clear();
        assert!(config.validate().is_err());
    }
}
