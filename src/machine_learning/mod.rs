pub mod dataset;
pub mod engine;
pub mod explain;
pub mod forest;
pub mod metrics;
pub mod stop_words;
pub mod vectorizer;

pub use dataset::{Dataset, LabeledEmail};
pub use engine::{
    ClassifierEngine, EngineSettings, Label, ModelInfo, PredictionResult, TrainedModel,
    TrainingRequest, MODEL_FORMAT_VERSION,
};
pub use explain::{explain, FeatureImportance};
pub use forest::RandomForest;
pub use metrics::{ConfusionMatrix, Metrics};
pub use vectorizer::{FeatureVector, TfidfVectorizer, Vocabulary};
