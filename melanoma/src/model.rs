use std::ops::Range;

use log::info;
use machine_learning::{
    arch::{Model, Sequential, activations::ActFn, layers::Layer},
    checkpoint,
};

use crate::{
    PipelineErr, Result,
    config::ModelConfig,
    seed::{Seed, Stream},
};

/// The name of the backbone tensor in weight files.
pub const BACKBONE_TENSOR: &str = "backbone";
/// The name of the head tensor in weight files.
pub const HEAD_TENSOR: &str = "head";

/// The transfer learning classifier: a convolutional backbone, global average pooling and a
/// single sigmoid unit.
#[derive(Debug, Clone)]
pub struct Classifier {
    model: Sequential,
    backbone_size: usize,
    freeze_backbone: bool,
}

impl Classifier {
    /// Builds the classifier's layers for RGB inputs.
    pub fn new(config: &ModelConfig) -> Self {
        let mut layers = Vec::with_capacity(2 * config.backbone.len() + 2);
        let mut channels = 3;

        for stage in &config.backbone {
            layers.push(Layer::conv2d(channels, stage.channels, 3, stage.stride));
            layers.push(Layer::relu());
            channels = stage.channels;
        }

        let backbone_size = layers.iter().map(Layer::size).sum();
        layers.push(Layer::global_avg_pool());
        layers.push(Layer::dense((channels, 1), Some(ActFn::sigmoid(1.))));

        Self {
            model: Sequential::new(layers),
            backbone_size,
            freeze_backbone: config.freeze_backbone,
        }
    }

    pub fn model(&self) -> &Sequential {
        &self.model
    }

    pub fn into_model(self) -> Sequential {
        self.model
    }

    /// The amount of parameters of the backbone, which sit at the front of the buffer.
    pub fn backbone_size(&self) -> usize {
        self.backbone_size
    }

    /// The range of parameters the optimizer updates.
    pub fn trainable(&self) -> Range<usize> {
        let start = if self.freeze_backbone {
            self.backbone_size
        } else {
            0
        };

        start..self.model.size()
    }

    /// Creates the initial parameters.
    ///
    /// Everything is initialized from the seed, then the backbone is replaced by the pretrained
    /// weights, if any.
    pub fn initial_params(&self, config: &ModelConfig, seed: Seed) -> Result<Vec<f32>> {
        let mut params = self.model.initialize(&mut seed.rng(Stream::Init, &[]))?;

        if let Some(path) = &config.backbone_weights {
            let weights = checkpoint::load(path, BACKBONE_TENSOR)?;
            if weights.len() != self.backbone_size {
                return Err(PipelineErr::InvalidConfig(format!(
                    "{} holds {} backbone parameters, the configured backbone has {}",
                    path.display(),
                    weights.len(),
                    self.backbone_size
                )));
            }

            params[..self.backbone_size].copy_from_slice(&weights);
            info!("loaded pretrained backbone from {}", path.display());
        }

        Ok(params)
    }

    /// Logs the per-layer summary for inputs of `image_size` square images.
    pub fn log_summary(&self, image_size: u32) -> Result<()> {
        let side = image_size as usize;
        let trainable = self.trainable().len();
        let summary = self.model.summary(&[side, side, 3], trainable)?;

        for line in summary.lines() {
            info!("{line}");
        }

        Ok(())
    }
}

/// Splits a parameter buffer into the tensors written to weight files.
pub fn tensors(params: &[f32], backbone_size: usize) -> [checkpoint::Tensor<'_>; 2] {
    let (backbone, head) = params.split_at(backbone_size.min(params.len()));
    [
        checkpoint::Tensor::flat(BACKBONE_TENSOR, backbone),
        checkpoint::Tensor::flat(HEAD_TENSOR, head),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;

    fn config() -> ModelConfig {
        ModelConfig {
            backbone: vec![
                StageConfig {
                    channels: 4,
                    stride: 2,
                },
                StageConfig {
                    channels: 6,
                    stride: 1,
                },
            ],
            ..ModelConfig::default()
        }
    }

    #[test]
    fn backbone_is_the_parameter_prefix() {
        let classifier = Classifier::new(&config());

        let backbone = (27 + 1) * 4 + (36 + 1) * 6;
        assert_eq!(classifier.backbone_size(), backbone);
        assert_eq!(classifier.model().size(), backbone + 6 + 1);
        assert_eq!(classifier.trainable(), 0..backbone + 7);
    }

    #[test]
    fn freezing_excludes_the_backbone() {
        let config = ModelConfig {
            freeze_backbone: true,
            ..config()
        };
        let classifier = Classifier::new(&config);

        assert_eq!(classifier.trainable(), classifier.backbone_size()..classifier.model().size());
    }

    #[test]
    fn pretrained_backbone_replaces_the_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");
        let classifier = Classifier::new(&config());
        let pretrained = vec![0.5; classifier.backbone_size()];
        checkpoint::save(&path, &tensors(&pretrained, pretrained.len())).unwrap();

        let pretrained_config = ModelConfig {
            backbone_weights: Some(path),
            ..config()
        };
        let params = classifier.initial_params(&pretrained_config, Seed::new(777)).unwrap();
        let fresh = classifier.initial_params(&config(), Seed::new(777)).unwrap();

        let n = classifier.backbone_size();
        assert_eq!(params[..n], pretrained[..]);
        assert_eq!(params[n..], fresh[n..]);
    }

    #[test]
    fn mismatched_pretrained_weights_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");
        checkpoint::save(&path, &tensors(&[1., 2.], 2)).unwrap();

        let config = ModelConfig {
            backbone_weights: Some(path),
            ..config()
        };
        let classifier = Classifier::new(&config);
        assert!(classifier.initial_params(&config, Seed::new(1)).is_err());
    }
}
