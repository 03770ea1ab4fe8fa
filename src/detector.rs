use crate::config::{Config, ModelConfig};
use crate::error::Result;
use crate::features::{LinkAnalyzer, UrlReport};
use crate::machine_learning::{
    ClassifierEngine, Dataset, EngineSettings, Metrics, PredictionResult, TrainingRequest,
};
use crate::normalization::EmailNormalizer;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAnalysis {
    pub prediction: PredictionResult,
    pub urls: UrlReport,
}

/// Raw message in, verdict and link report out.
pub struct PhishingDetector {
    normalizer: EmailNormalizer,
    links: LinkAnalyzer,
    engine: ClassifierEngine,
    paths: ModelConfig,
}

impl PhishingDetector {
    /// Builds every component from `config`, restoring a previously saved
    /// model when one exists at the configured paths.
    pub fn from_config(config: &Config) -> Self {
        let engine = ClassifierEngine::restore_or_untrained(
            EngineSettings::from_config(config),
            Path::new(&config.model.model_path),
            Path::new(&config.model.vectorizer_path),
        );

        Self {
            normalizer: EmailNormalizer::from_config(&config.normalizer),
            links: LinkAnalyzer::from_config(&config.url_heuristics),
            engine,
            paths: config.model.clone(),
        }
    }

    pub fn engine(&self) -> &ClassifierEngine {
        &self.engine
    }

    pub fn normalize(&self, raw: &str) -> String {
        self.normalizer.normalize(raw)
    }

    /// Link report over every HTML part of the message. An unparsable message
    /// is scanned as a whole.
    pub fn analyze_links(&self, raw: &str) -> UrlReport {
        match self.normalizer.parse(raw) {
            Ok(parsed) => {
                let mut report = UrlReport::default();
                for html in &parsed.html_fragments {
                    report.merge(self.links.analyze_html(html));
                }
                report
            }
            Err(_) => self.links.analyze_html(raw),
        }
    }

    pub fn analyze(&self, raw: &str) -> Result<EmailAnalysis> {
        let text = self.normalizer.normalize(raw);
        let prediction = self.engine.predict(&text)?;
        let urls = self.analyze_links(raw);

        log::debug!(
            "Classified email as {} ({:.2}), {} of {} links suspicious",
            prediction.label,
            prediction.confidence,
            urls.suspicious_count,
            urls.total_urls
        );

        Ok(EmailAnalysis { prediction, urls })
    }

    /// Trains on a CSV dataset and saves the result to the configured model
    /// paths. The new model is served only once it is on disk.
    pub fn train_from_csv<P: AsRef<Path>>(
        &self,
        path: P,
        test_fraction: f64,
        seed: u64,
    ) -> Result<Metrics> {
        let dataset = Dataset::from_csv_path(path)?;
        self.engine.train_and_save(
            TrainingRequest::from_dataset(dataset)
                .with_test_fraction(test_fraction)
                .with_seed(seed),
            Path::new(&self.paths.model_path),
            Path::new(&self.paths.vectorizer_path),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectorError;
    use crate::machine_learning::Label;
    use std::io::Write;

    const PHISHING_EMAIL: &str = "Subject: Account suspended\r\n\
From: security@paypa1-alerts.tk\r\n\
To: victim@example.com\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain\r\n\
\r\n\
Urgent: verify your account password now\r\n\
--b1\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>Urgent: <a href=\"http://paypal.com.secure-login.tk/verify\">verify your account</a></p>\
<a href=\"http://192.168.10.5/login\">login</a><a href=\"https://www.paypal.com/\">home</a>\r\n\
--b1--\r\n";

    fn write_dataset(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("emails.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "content,is_phishing").unwrap();
        for i in 0..12 {
            writeln!(
                file,
                "\"Urgent verify your account password, suspended notice {}\",1",
                i
            )
            .unwrap();
            writeln!(file, "\"Team meeting agenda and lunch schedule, week {}\",0", i).unwrap();
        }
        path
    }

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.model.model_path = dir.join("models/model.bin").display().to_string();
        config.model.vectorizer_path = dir.join("models/vectorizer.bin").display().to_string();
        config.vectorizer.max_features = 100;
        config.forest.n_estimators = 20;
        config
    }

    #[test]
    fn test_untrained_detector() {
        let dir = tempfile::tempdir().unwrap();
        let detector = PhishingDetector::from_config(&config_in(dir.path()));
        assert!(matches!(
            detector.analyze(PHISHING_EMAIL),
            Err(DetectorError::NotTrained)
        ));
    }

    #[test]
    fn test_links_from_html_parts() {
        let dir = tempfile::tempdir().unwrap();
        let detector = PhishingDetector::from_config(&config_in(dir.path()));
        let report = detector.analyze_links(PHISHING_EMAIL);

        assert_eq!(report.total_urls, 3);
        assert_eq!(report.suspicious_count, 2);
        assert_eq!(
            report.suspicious_domains,
            vec!["paypal.com.secure-login.tk", "192.168.10.5"]
        );
    }

    #[test]
    fn test_train_persist_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let dataset = write_dataset(dir.path());

        let detector = PhishingDetector::from_config(&config);
        let metrics = detector.train_from_csv(&dataset, 0.25, 42).unwrap();
        assert_eq!(metrics.test_size, 6);
        assert!(Path::new(&config.model.model_path).exists());
        assert!(Path::new(&config.model.vectorizer_path).exists());

        let analysis = detector.analyze(PHISHING_EMAIL).unwrap();
        assert_eq!(analysis.prediction.label, Label::Phishing);
        assert_eq!(analysis.urls.suspicious_count, 2);

        let restored = PhishingDetector::from_config(&config);
        assert!(restored.engine().is_trained());
        assert_eq!(restored.analyze(PHISHING_EMAIL).unwrap(), analysis);
    }

    #[test]
    fn test_unwritable_model_path_leaves_detector_untrained() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        let mut config = config_in(dir.path());
        config.model.model_path = blocker.join("model.bin").display().to_string();
        config.model.vectorizer_path = blocker.join("vectorizer.bin").display().to_string();
        let dataset = write_dataset(dir.path());

        let detector = PhishingDetector::from_config(&config);
        assert!(matches!(
            detector.train_from_csv(&dataset, 0.25, 42),
            Err(DetectorError::Persistence(_))
        ));
        assert!(!detector.engine().is_trained());
        assert!(matches!(
            detector.analyze(PHISHING_EMAIL),
            Err(DetectorError::NotTrained)
        ));
    }

    #[test]
    fn test_train_from_missing_csv() {
        let dir = tempfile::tempdir().unwrap();
        let detector = PhishingDetector::from_config(&config_in(dir.path()));
        assert!(matches!(
            detector.train_from_csv(dir.path().join("missing.csv"), 0.2, 42),
            Err(DetectorError::Dataset(_))
        ));
    }
}
