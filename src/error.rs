use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Model not trained yet")]
    NotTrained,

    #[error("Vectorizer has not been fitted")]
    NotFitted,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Dataset missing required column: {0}")]
    MissingColumn(String),

    #[error("Invalid label {value:?} in row {row}, expected 0 or 1")]
    InvalidLabel { row: usize, value: String },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode model: {0}")]
    Encode(#[source] bincode::Error),

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: bincode::Error,
    },

    #[error("Unsupported model format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Model expects {model} features but vocabulary has {vocabulary}")]
    DimensionMismatch { model: usize, vocabulary: usize },

    #[error("No trained model to save")]
    NothingToSave,
}

pub type Result<T> = std::result::Result<T, DetectorError>;
