use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use crossbeam_channel::{Receiver, bounded};
use image::imageops::{self, FilterType};
use log::{debug, info, warn};
use machine_learning::{
    MlErr,
    dataset::{Batch, BatchSource},
};
use ndarray::{Array2, Array3, Array4, Axis};
use rand::seq::SliceRandom;
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};

use super::{AugmentConfig, Record};
use crate::{
    PipelineErr, Result,
    config::LoaderConfig,
    seed::{Seed, Stream},
};

/// The file extensions images are accepted with.
const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

/// How a generator traverses and prepares its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Shuffled every pass, augmented, cycles forever.
    Train,
    /// In table order, cycles forever.
    Validation,
    /// In table order, unlabeled, stops after one pass.
    Test,
}

impl Role {
    fn shuffles(self) -> bool {
        self == Role::Train
    }

    fn cycles(self) -> bool {
        self != Role::Test
    }

    fn labeled(self) -> bool {
        self != Role::Test
    }
}

/// An image on disk and its training target.
#[derive(Debug, Clone)]
struct Sample {
    path: PathBuf,
    target: Option<f32>,
}

/// What every pass of a generator shares with its loading thread.
struct Shared {
    samples: Vec<Sample>,
    pool: Arc<ThreadPool>,
    augmentation: Option<AugmentConfig>,
    image_size: u32,
    batch_size: usize,
    seed: Seed,
}

/// Builds the image generators of a run, all of them decoding on the same thread pool.
pub struct Loader {
    pool: Arc<ThreadPool>,
    image_size: u32,
    batch_size: usize,
    max_queue_size: usize,
    seed: Seed,
}

impl Loader {
    /// Creates a new `Loader`.
    ///
    /// # Arguments
    /// * `config` - The worker and queue sizes.
    /// * `image_size` - The side images are resized to.
    /// * `batch_size` - The amount of images per batch.
    /// * `seed` - The seed shuffles and augmentations derive from.
    pub fn new(config: &LoaderConfig, image_size: u32, batch_size: usize, seed: Seed) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("loader-{i}"))
            .build()?;

        Ok(Self {
            pool: Arc::new(pool),
            image_size,
            batch_size: batch_size.max(1),
            max_queue_size: config.max_queue_size.max(1),
            seed,
        })
    }

    /// Creates a generator over the images of `records` found in `dir`.
    ///
    /// Rows whose image is missing or has an unknown extension are dropped with a warning.
    ///
    /// # Arguments
    /// * `role` - How the generator traverses its samples.
    /// * `records` - The table rows, in order.
    /// * `dir` - The directory holding the images.
    /// * `augmentation` - The random transformations applied to every image, if any.
    pub fn generator(
        &self,
        role: Role,
        records: &[Record],
        dir: &Path,
        augmentation: Option<AugmentConfig>,
    ) -> ImageGenerator {
        let mut samples = Vec::with_capacity(records.len());

        for record in records {
            let path = dir.join(&record.image_name);

            let known_ext = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));

            if !known_ext || !path.is_file() {
                warn!("dropping {}: not a readable image file", path.display());
                continue;
            }

            samples.push(Sample {
                path,
                target: if role.labeled() {
                    record.target.map(|t| t.value())
                } else {
                    None
                },
            });
        }

        if role.labeled() {
            info!("found {} validated image filenames belonging to 2 classes", samples.len());
        } else {
            info!("found {} validated image filenames", samples.len());
        }

        ImageGenerator {
            role,
            shared: Arc::new(Shared {
                samples,
                pool: Arc::clone(&self.pool),
                augmentation,
                image_size: self.image_size,
                batch_size: self.batch_size,
                seed: self.seed,
            }),
            max_queue_size: self.max_queue_size,
            passes: 0,
            current: None,
            exhausted: false,
        }
    }
}

/// A pass being produced by a loading thread.
struct Pass {
    rx: Receiver<machine_learning::Result<Batch>>,
    remaining: usize,
}

/// A lazy, restartable sequence of image batches.
///
/// Every pass is produced by a background thread that decodes each batch on the loader's pool
/// and pushes it into a bounded queue. Dropping the current pass disconnects the queue, which
/// makes the thread exit.
pub struct ImageGenerator {
    role: Role,
    shared: Arc<Shared>,
    max_queue_size: usize,
    passes: u64,
    current: Option<Pass>,
    exhausted: bool,
}

impl ImageGenerator {
    pub fn role(&self) -> Role {
        self.role
    }

    /// The amount of samples in a pass.
    pub fn len(&self) -> usize {
        self.shared.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.samples.is_empty()
    }

    /// The image paths in the order the next pass will produce them, when it is deterministic.
    pub fn filenames(&self) -> Vec<&Path> {
        self.shared.samples.iter().map(|s| s.path.as_path()).collect()
    }

    fn spawn_pass(&mut self) -> Pass {
        let pass = self.passes;
        self.passes += 1;

        let shared = Arc::clone(&self.shared);
        let mut order: Vec<usize> = (0..shared.samples.len()).collect();
        if self.role.shuffles() {
            order.shuffle(&mut shared.seed.rng(Stream::Shuffle, &[pass]));
        }

        let remaining = order.len().div_ceil(shared.batch_size);
        let (tx, rx) = bounded(self.max_queue_size);
        debug!(pass = pass, batches = remaining; "starting a {:?} pass", self.role);

        thread::spawn(move || {
            for (step, chunk) in order.chunks(shared.batch_size).enumerate() {
                let start = step * shared.batch_size;
                let batch = shared
                    .pool
                    .install(|| load_batch(&shared, pass, start, chunk))
                    .map_err(MlErr::from);

                if tx.send(batch).is_err() {
                    // The generator moved on to another pass.
                    break;
                }
            }
        });

        Pass { rx, remaining }
    }
}

impl BatchSource for ImageGenerator {
    fn steps(&self) -> usize {
        self.len().div_ceil(self.shared.batch_size)
    }

    fn reset(&mut self) {
        self.current = None;
        self.exhausted = false;
    }

    fn next_batch(&mut self) -> Option<machine_learning::Result<Batch>> {
        if self.is_empty() || self.exhausted {
            return None;
        }

        if self.current.as_ref().is_some_and(|pass| pass.remaining == 0) {
            self.current = None;
            if !self.role.cycles() {
                self.exhausted = true;
                return None;
            }
        }

        if self.current.is_none() {
            let pass = self.spawn_pass();
            self.current = Some(pass);
        }

        let pass = self.current.as_mut()?;
        match pass.rx.recv() {
            Ok(batch) => {
                pass.remaining -= 1;
                Some(batch)
            }
            Err(_) => {
                self.current = None;
                Some(Err(MlErr::InvalidInput("the image loading thread stopped")))
            }
        }
    }
}

/// Decodes the samples at `chunk` into a batch, in parallel.
fn load_batch(shared: &Shared, pass: u64, start: usize, chunk: &[usize]) -> Result<Batch> {
    let side = shared.image_size as usize;

    let images: Vec<Array3<f32>> = chunk
        .par_iter()
        .enumerate()
        .map(|(i, &idx)| {
            let position = (start + i) as u64;
            load_image(shared, &shared.samples[idx], pass, position)
        })
        .collect::<Result<_>>()?;

    let mut x = Array4::zeros((chunk.len(), side, side, 3));
    for (mut slot, image) in x.axis_iter_mut(Axis(0)).zip(&images) {
        slot.assign(image);
    }

    let y = chunk
        .iter()
        .map(|&idx| shared.samples[idx].target)
        .collect::<Option<Vec<f32>>>()
        .map(|targets| Array2::from_shape_vec((targets.len(), 1), targets))
        .transpose()
        .map_err(MlErr::from)?;

    Ok(Batch { x: x.into_dyn(), y })
}

/// Decodes, resizes, augments and rescales one image into an `(h, w, 3)` array in `[0, 1]`.
fn load_image(shared: &Shared, sample: &Sample, pass: u64, position: u64) -> Result<Array3<f32>> {
    let decoded = image::open(&sample.path).map_err(|source| PipelineErr::Image {
        path: sample.path.clone(),
        source,
    })?;

    let side = shared.image_size;
    let mut rgb = decoded.to_rgb8();
    if rgb.dimensions() != (side, side) {
        rgb = imageops::resize(&rgb, side, side, FilterType::Nearest);
    }

    let (w, h) = rgb.dimensions();
    let pixels = Array3::from_shape_vec((h as usize, w as usize, 3), rgb.into_raw())
        .map_err(MlErr::from)?
        .mapv(|p| p as f32);

    let pixels = match &shared.augmentation {
        Some(config) => {
            let mut rng = shared.seed.rng(Stream::Augment, &[pass, position]);
            config
                .sample(h as usize, w as usize, &mut rng)
                .apply(pixels.view())
        }
        None => pixels,
    };

    Ok(pixels.mapv(|p| p / 255.))
}
