pub mod config;
pub mod detector;
pub mod domain_utils;
pub mod error;
pub mod features;
pub mod html_text;
pub mod machine_learning;
pub mod normalization;

pub use config::Config;
pub use detector::{EmailAnalysis, PhishingDetector};
pub use error::{DatasetError, DetectorError, PersistenceError};
pub use features::{analyze_urls, UrlReport};
pub use machine_learning::{ClassifierEngine, Label, Metrics, PredictionResult, TrainingRequest};
pub use normalization::{EmailNormalizer, ParsedEmail};

use lazy_static::lazy_static;

lazy_static! {
    static ref DEFAULT_NORMALIZER: EmailNormalizer = EmailNormalizer::new();
}

/// Normalizes a raw message with the default settings. Never fails: input
/// whose MIME structure cannot be followed is returned unchanged.
pub fn normalize(raw: &str) -> String {
    DEFAULT_NORMALIZER.normalize(raw)
}
