pub mod toml_config;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub vectorizer: VectorizerConfig,
    pub forest: ForestConfig,
    pub training: TrainingConfig,
    pub normalizer: NormalizerConfig,
    pub url_heuristics: UrlHeuristicsConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub model_path: String,
    pub vectorizer_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct VectorizerConfig {
    pub max_features: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ForestConfig {
    pub n_estimators: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TrainingConfig {
    pub test_fraction: f64,
    pub seed: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Multipart nesting beyond this depth is skipped like an attachment.
    pub max_mime_depth: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct UrlHeuristicsConfig {
    pub unusual_tlds: Vec<String>,
    pub shorteners: Vec<String>,
    pub trusted_domains: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: "models/phishing_model.bin".to_string(),
            vectorizer_path: "models/vectorizer.bin".to_string(),
        }
    }
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self { max_features: 5000 }
    }
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self { n_estimators: 100 }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self { max_mime_depth: 64 }
    }
}

impl Default for UrlHeuristicsConfig {
    fn default() -> Self {
        Self {
            unusual_tlds: [".xyz", ".top", ".tk", ".ml", ".ga", ".cf"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            shorteners: ["bit.ly", "tinyurl.com", "goo.gl", "t.co", "is.gd"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            trusted_domains: [
                "paypal.com",
                "google.com",
                "apple.com",
                "microsoft.com",
                "amazon.com",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Config {
    pub fn log_level(&self) -> log::LevelFilter {
        self.logging
            .as_ref()
            .and_then(|l| l.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info)
    }
}
