use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ndarray::ShapeError;
use safetensors::tensor::SafeTensorError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Shape(ShapeError),
    InvalidInput(&'static str),
    EmptyPass {
        what: &'static str,
    },
    MissingTensor {
        name: String,
    },
    Checkpoint(SafeTensorError),
    Io(io::Error),
    /// A batch source failed to produce a batch.
    Data(Box<dyn Error + Send + Sync>),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch for {what}, got {got} and expected {expected}"
            ),
            MlErr::Shape(e) => write!(f, "invalid array shape: {e}"),
            MlErr::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            MlErr::EmptyPass { what } => {
                write!(f, "the {what} data produced no batches in a full pass")
            }
            MlErr::MissingTensor { name } => {
                write!(f, "the checkpoint has no f32 tensor named {name:?}")
            }
            MlErr::Checkpoint(e) => write!(f, "checkpoint error: {e}"),
            MlErr::Io(e) => write!(f, "io error: {e}"),
            MlErr::Data(e) => write!(f, "failed to load batch: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            MlErr::Checkpoint(e) => Some(e),
            MlErr::Io(e) => Some(e),
            MlErr::Data(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<SafeTensorError> for MlErr {
    fn from(value: SafeTensorError) -> Self {
        Self::Checkpoint(value)
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
