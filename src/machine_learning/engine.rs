use super::dataset::Dataset;
use super::explain::{explain, FeatureImportance};
use super::forest::RandomForest;
use super::metrics::Metrics;
use super::vectorizer::TfidfVectorizer;
use crate::config::Config;
use crate::error::{DetectorError, PersistenceError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Bumped whenever the on-disk layout of either blob changes.
pub const MODEL_FORMAT_VERSION: u32 = 1;

const MODEL_TYPE: &str = "random_forest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Legitimate,
    Phishing,
}

impl Label {
    /// Argmax over `[legitimate, phishing]`; ties go to legitimate.
    pub fn from_proba(proba: [f64; 2]) -> Self {
        if proba[1] > proba[0] {
            Label::Phishing
        } else {
            Label::Legitimate
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Label::Legitimate => 0,
            Label::Phishing => 1,
        }
    }

    pub fn is_phishing(self) -> bool {
        self == Label::Phishing
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Legitimate => write!(f, "legitimate"),
            Label::Phishing => write!(f, "phishing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: Label,
    pub confidence: f64,
    pub explanation: String,
}

/// Training input: either a loaded dataset or paired texts and labels.
#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub dataset: Option<Dataset>,
    pub texts: Option<Vec<String>>,
    pub labels: Option<Vec<u8>>,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for TrainingRequest {
    fn default() -> Self {
        Self {
            dataset: None,
            texts: None,
            labels: None,
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

impl TrainingRequest {
    pub fn from_dataset(dataset: Dataset) -> Self {
        Self {
            dataset: Some(dataset),
            ..Default::default()
        }
    }

    pub fn from_texts(texts: Vec<String>, labels: Vec<u8>) -> Self {
        Self {
            texts: Some(texts),
            labels: Some(labels),
            ..Default::default()
        }
    }

    pub fn with_test_fraction(mut self, test_fraction: f64) -> Self {
        self.test_fraction = test_fraction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn into_dataset(self) -> Result<Dataset> {
        match (self.dataset, self.texts, self.labels) {
            (Some(dataset), _, _) => Ok(dataset),
            (None, Some(texts), Some(labels)) => Dataset::from_pairs(texts, labels),
            _ => Err(DetectorError::InvalidInput(
                "either a dataset or texts and labels must be provided".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub max_features: usize,
    pub n_estimators: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_features: config.vectorizer.max_features,
            n_estimators: config.forest.n_estimators,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_loaded: bool,
    pub model_type: String,
    pub feature_count: usize,
    pub tree_count: usize,
    /// Unix seconds
    pub last_trained: Option<u64>,
}

/// Immutable fitted state. Shared with in-flight predictions through `Arc`.
#[derive(Debug)]
pub struct TrainedModel {
    vectorizer: TfidfVectorizer,
    forest: RandomForest,
    importance: Option<FeatureImportance>,
    trained_at: u64,
}

impl TrainedModel {
    fn new(vectorizer: TfidfVectorizer, forest: RandomForest, trained_at: u64) -> Self {
        let importance = forest
            .feature_importances()
            .map(|weights| FeatureImportance::new(&vectorizer.feature_names(), weights));
        Self {
            vectorizer,
            forest,
            importance,
            trained_at,
        }
    }

    pub fn predict(&self, text: &str) -> Result<PredictionResult> {
        let row = self.vectorizer.transform(text)?;
        let proba = self.forest.predict_proba(&row);
        let label = Label::from_proba(proba);

        Ok(PredictionResult {
            label,
            confidence: proba[0].max(proba[1]),
            explanation: explain(text, label, self.importance.as_ref()),
        })
    }

    pub fn importance(&self) -> Option<&FeatureImportance> {
        self.importance.as_ref()
    }

    pub fn feature_count(&self) -> usize {
        self.forest.n_features()
    }
}

#[derive(Serialize, Deserialize)]
struct ModelFile<F> {
    version: u32,
    trained_at: u64,
    forest: F,
}

#[derive(Serialize, Deserialize)]
struct VectorizerFile<V> {
    version: u32,
    vectorizer: V,
}

/// Trains, serves and persists the phishing classifier.
///
/// The current model sits behind a `RwLock` that is only held long enough to
/// clone or replace the `Arc`; vectorizing, tree walks and disk I/O all run
/// outside it, so predictions keep using the old model while a new one is
/// trained.
pub struct ClassifierEngine {
    settings: EngineSettings,
    model: RwLock<Option<Arc<TrainedModel>>>,
}

impl Default for ClassifierEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl ClassifierEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            model: RwLock::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(EngineSettings::from_config(config))
    }

    /// Engine with the model saved at the given paths, or an untrained engine
    /// if it is missing or unreadable.
    pub fn restore_or_untrained<P: AsRef<Path>>(
        settings: EngineSettings,
        model_path: P,
        vectorizer_path: P,
    ) -> Self {
        let engine = Self::new(settings);
        let (model_path, vectorizer_path) = (model_path.as_ref(), vectorizer_path.as_ref());

        if !model_path.exists() || !vectorizer_path.exists() {
            log::info!(
                "No saved model at {}, starting untrained",
                model_path.display()
            );
            return engine;
        }

        match engine.load(model_path, vectorizer_path) {
            Ok(()) => log::info!("Loaded model from {}", model_path.display()),
            Err(e) => log::warn!(
                "Failed to load model from {}: {}. Starting untrained",
                model_path.display(),
                e
            ),
        }
        engine
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    fn snapshot(&self) -> Option<Arc<TrainedModel>> {
        self.model
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn install(&self, model: TrainedModel) {
        let mut slot = self
            .model
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::new(model));
    }

    pub fn is_trained(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Trains a new model and swaps it in. Predictions in flight keep the
    /// previous model.
    pub fn train(&self, request: TrainingRequest) -> Result<Metrics> {
        let (model, metrics) = self.fit(request)?;
        self.install(model);
        Ok(metrics)
    }

    /// Trains a new model, writes it to disk and only then swaps it in. On
    /// any error the engine keeps serving the previous model.
    pub fn train_and_save<P: AsRef<Path>>(
        &self,
        request: TrainingRequest,
        model_path: P,
        vectorizer_path: P,
    ) -> Result<Metrics> {
        let (model, metrics) = self.fit(request)?;
        write_model(&model, model_path.as_ref(), vectorizer_path.as_ref())?;
        self.install(model);
        Ok(metrics)
    }

    fn fit(&self, request: TrainingRequest) -> Result<(TrainedModel, Metrics)> {
        let test_fraction = request.test_fraction;
        let seed = request.seed;

        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(DetectorError::InvalidInput(format!(
                "test_fraction must be between 0 and 1, got {}",
                test_fraction
            )));
        }

        let dataset = request.into_dataset()?;
        let texts = dataset.texts();
        let labels = dataset.labels();

        let n = texts.len();
        let n_test = (n as f64 * test_fraction).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(DetectorError::InvalidInput(format!(
                "{} samples cannot be split into non-empty train and test sets",
                n
            )));
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));
        let (test_idx, train_idx) = order.split_at(n_test);

        let train_texts: Vec<&str> = train_idx.iter().map(|&i| texts[i]).collect();
        let train_labels: Vec<u8> = train_idx.iter().map(|&i| labels[i]).collect();
        let test_texts: Vec<&str> = test_idx.iter().map(|&i| texts[i]).collect();
        let test_labels: Vec<u8> = test_idx.iter().map(|&i| labels[i]).collect();

        log::info!(
            "Training on {} emails ({} held out, seed {})",
            train_texts.len(),
            test_texts.len(),
            seed
        );

        let mut vectorizer = TfidfVectorizer::new(self.settings.max_features);
        let x_train = vectorizer.fit_transform(&train_texts)?;
        let x_test = vectorizer.transform_all(&test_texts)?;

        let mut forest = RandomForest::new(self.settings.n_estimators);
        forest.fit(&x_train, &train_labels, seed)?;

        let predictions: Vec<u8> = x_test
            .iter()
            .map(|row| Label::from_proba(forest.predict_proba(row)).as_u8())
            .collect();
        let metrics = Metrics::evaluate(
            &test_labels,
            &predictions,
            train_texts.len(),
            forest.n_features(),
        );

        log::info!(
            "Model trained: accuracy {:.3}, precision {:.3}, recall {:.3}, f1 {:.3}",
            metrics.accuracy,
            metrics.precision,
            metrics.recall,
            metrics.f1_score
        );
        log::debug!("Classification report:\n{}", metrics.classification_report);

        Ok((TrainedModel::new(vectorizer, forest, unix_now()), metrics))
    }

    pub fn predict(&self, text: &str) -> Result<PredictionResult> {
        let model = self.snapshot().ok_or(DetectorError::NotTrained)?;
        model.predict(text)
    }

    /// Writes the forest and the vectorizer to separate files, creating
    /// parent directories as needed.
    pub fn save<P: AsRef<Path>>(
        &self,
        model_path: P,
        vectorizer_path: P,
    ) -> std::result::Result<(), PersistenceError> {
        let model = self.snapshot().ok_or(PersistenceError::NothingToSave)?;
        write_model(&model, model_path.as_ref(), vectorizer_path.as_ref())
    }

    /// Replaces the current model with the saved one. Leaves the engine
    /// unchanged on any error.
    pub fn load<P: AsRef<Path>>(
        &self,
        model_path: P,
        vectorizer_path: P,
    ) -> std::result::Result<(), PersistenceError> {
        let model_file: ModelFile<RandomForest> = read_blob(model_path.as_ref())?;
        check_version(model_file.version)?;

        let vectorizer_file: VectorizerFile<TfidfVectorizer> = read_blob(vectorizer_path.as_ref())?;
        check_version(vectorizer_file.version)?;

        let vocabulary = vectorizer_file
            .vectorizer
            .vocabulary()
            .map(|v| v.len())
            .unwrap_or(0);
        if !model_file.forest.is_fitted() || model_file.forest.n_features() != vocabulary {
            return Err(PersistenceError::DimensionMismatch {
                model: model_file.forest.n_features(),
                vocabulary,
            });
        }

        self.install(TrainedModel::new(
            vectorizer_file.vectorizer,
            model_file.forest,
            model_file.trained_at,
        ));
        Ok(())
    }

    pub fn model_info(&self) -> ModelInfo {
        match self.snapshot() {
            Some(model) => ModelInfo {
                model_loaded: true,
                model_type: MODEL_TYPE.to_string(),
                feature_count: model.forest.n_features(),
                tree_count: model.forest.n_trees(),
                last_trained: Some(model.trained_at),
            },
            None => ModelInfo {
                model_loaded: false,
                model_type: MODEL_TYPE.to_string(),
                feature_count: 0,
                tree_count: 0,
                last_trained: None,
            },
        }
    }

    /// Highest weighted vocabulary terms of the current model.
    pub fn top_features(&self, n: usize) -> Vec<(String, f64)> {
        self.snapshot()
            .and_then(|model| {
                model.importance().map(|imp| {
                    imp.top(n)
                        .into_iter()
                        .map(|(term, weight)| (term.to_string(), weight))
                        .collect()
                })
            })
            .unwrap_or_default()
    }
}

/// Writes both blobs next to their targets and renames them into place once
/// both are complete, so a failed write leaves the previous files intact.
fn write_model(
    model: &TrainedModel,
    model_path: &Path,
    vectorizer_path: &Path,
) -> std::result::Result<(), PersistenceError> {
    let model_tmp = staging_path(model_path);
    let vectorizer_tmp = staging_path(vectorizer_path);

    let written = write_blob(
        &model_tmp,
        &ModelFile {
            version: MODEL_FORMAT_VERSION,
            trained_at: model.trained_at,
            forest: &model.forest,
        },
    )
    .and_then(|()| {
        write_blob(
            &vectorizer_tmp,
            &VectorizerFile {
                version: MODEL_FORMAT_VERSION,
                vectorizer: &model.vectorizer,
            },
        )
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&model_tmp);
        let _ = fs::remove_file(&vectorizer_tmp);
        return Err(e);
    }

    for (tmp, target) in [(&model_tmp, model_path), (&vectorizer_tmp, vectorizer_path)] {
        fs::rename(tmp, target).map_err(|source| PersistenceError::Io {
            path: target.to_path_buf(),
            source,
        })?;
    }

    log::info!(
        "Saved model to {} and vectorizer to {}",
        model_path.display(),
        vectorizer_path.display()
    );
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn check_version(found: u32) -> std::result::Result<(), PersistenceError> {
    if found != MODEL_FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found,
            expected: MODEL_FORMAT_VERSION,
        });
    }
    Ok(())
}

fn write_blob<T: Serialize>(path: &Path, value: &T) -> std::result::Result<(), PersistenceError> {
    let io_error = |source: std::io::Error| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
    bincode::serialize_into(&mut writer, value).map_err(PersistenceError::Encode)?;
    writer.flush().map_err(io_error)
}

fn read_blob<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> std::result::Result<T, PersistenceError> {
    let file = File::open(path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    bincode::deserialize_from(BufReader::new(file)).map_err(|source| PersistenceError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
