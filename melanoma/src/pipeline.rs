use std::path::PathBuf;

use log::info;
use machine_learning::{
    arch::loss::BinaryCrossEntropy,
    optimization::Adam,
    replication::Mirrored,
    training::{Callback, EarlyStopping, Fitter, History, ReduceLrOnPlateau},
};

use crate::{
    Result,
    config::PipelineConfig,
    data::{self, Loader, Role},
    devices,
    model::Classifier,
    seed::Seed,
    submission,
    tracking::ExperimentLogger,
};

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct Report {
    pub history: History,
    /// The amount of test predictions written.
    pub predictions: usize,
    pub submission: PathBuf,
    /// Where the run was tracked, unless tracking was unavailable.
    pub run_dir: Option<PathBuf>,
}

/// The end to end training and inference run.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Trains the classifier on the labeled table and writes the test predictions.
    ///
    /// # Returns
    /// The training history and where the submission was written.
    pub fn run(&self) -> Result<Report> {
        let config = &self.config;
        config.validate()?;

        let seed = Seed::new(config.seed);
        info!(seed = seed.value(); "seeding every random source");
        let replicas = devices::replicas(config.model.replicas);
        devices::configure(replicas);

        let paths = &config.paths;
        let train_table = data::read_labeled(paths.train_csv())?;
        let test_table = data::read_unlabeled(paths.test_csv())?;
        data::log_head("train", &train_table);
        data::log_head("test", &test_table);

        let split = data::train_test_split(&train_table, config.val_fraction, seed)?;
        info!(train = split.train.len(), val = split.val.len(); "split the labeled table");
        data::log_head("val", &split.val);

        let loader = Loader::new(&config.loader, config.image_size, config.batch_size, seed)?;
        let train_images = paths.train_images();
        let mut train = loader.generator(
            Role::Train,
            &split.train,
            &train_images,
            Some(config.augmentation),
        );
        let mut val = loader.generator(Role::Validation, &split.val, &train_images, None);
        let mut test = loader.generator(Role::Test, &test_table, &paths.test_images(), None);

        let classifier = Classifier::new(&config.model);
        let mut params = classifier.initial_params(&config.model, seed)?;
        classifier.log_summary(config.image_size)?;

        let trainable = classifier.trainable();
        let backbone_size = classifier.backbone_size();
        let strategy = Mirrored::new(classifier.into_model(), replicas);
        let optimizer = Adam::with_defaults(trainable.len());
        let mut fitter = Fitter::new(strategy, optimizer, BinaryCrossEntropy::new(), trainable)?;

        let logger = ExperimentLogger::new(config, backbone_size);
        let run_dir = logger.run_dir().map(PathBuf::from);

        let cb = &config.callbacks;
        let mut callbacks: Vec<Box<dyn Callback>> = vec![
            Box::new(
                ReduceLrOnPlateau::new(cb.plateau_factor, cb.plateau_patience)
                    .with_min_lr(cb.plateau_min_lr),
            ),
            Box::new(EarlyStopping::new(cb.early_stopping_patience)),
            Box::new(logger),
        ];

        let history = fitter.fit(&mut params, &mut train, &mut val, config.epochs, &mut callbacks)?;
        info!(epochs = history.epochs(); "training finished: {:?}", history.stop_reason);
        if let Some(best) = history.best_epoch() {
            info!("best validation loss at epoch {}", best + 1);
        }

        let predictions = fitter.predict(&params, &mut test)?;
        info!("predicted {} test images", predictions.len());

        let rows = submission::write_submission(paths.submission_template(), &predictions, &paths.output)?;
        info!("wrote {} rows to {}", rows, paths.output.display());

        Ok(Report {
            history,
            predictions: rows,
            submission: paths.output.clone(),
            run_dir,
        })
    }
}
