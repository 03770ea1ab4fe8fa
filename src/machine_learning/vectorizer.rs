use super::stop_words::is_stop_word;
use crate::config::VectorizerConfig;
use crate::error::{DetectorError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type FeatureVector = Vec<f64>;

/// Alphabetically ordered terms; a term's position is its feature column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    terms: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    fn from_terms(mut terms: Vec<String>) -> Self {
        terms.sort();
        let index = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        Self { terms, index }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn column(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Fitted {
    vocabulary: Vocabulary,
    idf: Vec<f64>,
}

/// TF-IDF with smoothed idf and L2-normalized rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    max_features: usize,
    fitted: Option<Fitted>,
    #[serde(skip, default = "token_regex")]
    token_regex: Regex,
}

fn token_regex() -> Regex {
    Regex::new(r"\b\w\w+\b").unwrap()
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self::new(VectorizerConfig::default().max_features)
    }
}

impl TfidfVectorizer {
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features,
            fitted: None,
            token_regex: token_regex(),
        }
    }

    pub fn from_config(config: &VectorizerConfig) -> Self {
        Self::new(config.max_features)
    }

    pub fn max_features(&self) -> usize {
        self.max_features
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn vocabulary(&self) -> Option<&Vocabulary> {
        self.fitted.as_ref().map(|f| &f.vocabulary)
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.vocabulary()
            .map(|v| v.terms().to_vec())
            .unwrap_or_default()
    }

    /// Lowercased tokens of two or more word characters, stop words removed.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.token_regex
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|t| !is_stop_word(t))
            .map(str::to_string)
            .collect()
    }

    pub fn fit<S: AsRef<str>>(&mut self, corpus: &[S]) -> Result<&Vocabulary> {
        let mut term_counts: HashMap<String, usize> = HashMap::new();
        let mut document_frequency: HashMap<String, usize> = HashMap::new();

        for doc in corpus {
            let tokens = self.tokenize(doc.as_ref());
            let mut seen = std::collections::HashSet::new();
            for token in tokens {
                if seen.insert(token.clone()) {
                    *document_frequency.entry(token.clone()).or_insert(0) += 1;
                }
                *term_counts.entry(token).or_insert(0) += 1;
            }
        }

        if term_counts.is_empty() {
            return Err(DetectorError::InvalidInput(
                "empty vocabulary; documents contain only stop words or no tokens".to_string(),
            ));
        }

        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.max_features.max(1));

        let vocabulary = Vocabulary::from_terms(ranked.into_iter().map(|(t, _)| t).collect());
        let n = corpus.len() as f64;
        let idf = vocabulary
            .terms()
            .iter()
            .map(|t| {
                let df = document_frequency.get(t).copied().unwrap_or(0) as f64;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        log::debug!("Fitted vectorizer on {} documents, {} terms", corpus.len(), vocabulary.len());

        let fitted = self.fitted.insert(Fitted { vocabulary, idf });
        Ok(&fitted.vocabulary)
    }

    pub fn transform(&self, text: &str) -> Result<FeatureVector> {
        let fitted = self.fitted.as_ref().ok_or(DetectorError::NotFitted)?;
        let mut row = vec![0.0; fitted.vocabulary.len()];

        for token in self.tokenize(text) {
            if let Some(column) = fitted.vocabulary.column(&token) {
                row[column] += 1.0;
            }
        }

        for (value, idf) in row.iter_mut().zip(&fitted.idf) {
            *value *= idf;
        }

        let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in row.iter_mut() {
                *value /= norm;
            }
        }

        Ok(row)
    }

    pub fn transform_all<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<FeatureVector>> {
        texts.iter().map(|t| self.transform(t.as_ref())).collect()
    }

    pub fn fit_transform<S: AsRef<str>>(&mut self, corpus: &[S]) -> Result<Vec<FeatureVector>> {
        self.fit(corpus)?;
        self.transform_all(corpus)
    }
}
