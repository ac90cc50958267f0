use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use machine_learning::MlErr;

/// The result type used across the pipeline.
pub type Result<T> = std::result::Result<T, PipelineErr>;

/// All errors that can stop the pipeline.
#[derive(Debug)]
pub enum PipelineErr {
    /// Invalid configuration, caught before any data is read.
    InvalidConfig(String),
    ConfigFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Csv {
        path: PathBuf,
        source: csv::Error,
    },
    MissingColumn {
        path: PathBuf,
        column: &'static str,
    },
    UnknownLabel {
        path: PathBuf,
        row: usize,
        label: String,
    },
    InvalidSplit {
        rows: usize,
        fraction: f64,
    },
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    ThreadPool(rayon::ThreadPoolBuildError),
    /// The amount of predictions doesn't match the rows of the submission template.
    SubmissionLength {
        predictions: usize,
        rows: usize,
    },
    Ml(MlErr),
}

impl Display for PipelineErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::ConfigFormat { path, source } => {
                write!(f, "malformed config file {}: {source}", path.display())
            }
            Self::Io { path, source } => write!(f, "io error on {}: {source}", path.display()),
            Self::Csv { path, source } => write!(f, "failed to read {}: {source}", path.display()),
            Self::MissingColumn { path, column } => {
                write!(f, "{} has no {column:?} column", path.display())
            }
            Self::UnknownLabel { path, row, label } => write!(
                f,
                "{} row {row} has label {label:?}, expected \"0\" or \"1\"",
                path.display()
            ),
            Self::InvalidSplit { rows, fraction } => write!(
                f,
                "cannot split {rows} rows with a validation fraction of {fraction}"
            ),
            Self::Image { path, source } => {
                write!(f, "failed to decode image {}: {source}", path.display())
            }
            Self::ThreadPool(e) => write!(f, "failed to build the loader thread pool: {e}"),
            Self::SubmissionLength { predictions, rows } => write!(
                f,
                "got {predictions} predictions for a submission template of {rows} rows"
            ),
            Self::Ml(e) => write!(f, "{e}"),
        }
    }
}

impl Error for PipelineErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ConfigFormat { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Image { source, .. } => Some(source),
            Self::ThreadPool(e) => Some(e),
            Self::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for PipelineErr {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

impl From<rayon::ThreadPoolBuildError> for PipelineErr {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool(e)
    }
}

impl From<PipelineErr> for MlErr {
    fn from(e: PipelineErr) -> Self {
        match e {
            PipelineErr::Ml(e) => e,
            e => MlErr::Data(Box::new(e)),
        }
    }
}
