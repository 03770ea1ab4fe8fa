use crate::error::{DatasetError, DetectorError};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const CONTENT_COLUMN: &str = "content";
pub const LABEL_COLUMN: &str = "is_phishing";

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledEmail {
    pub content: String,
    /// 1 for phishing, 0 for legitimate
    pub label: u8,
}

/// Labeled training corpus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    emails: Vec<LabeledEmail>,
}

impl Dataset {
    /// Pairs texts with labels, rejecting unequal lengths and labels other
    /// than 0 and 1.
    pub fn from_pairs(texts: Vec<String>, labels: Vec<u8>) -> Result<Self, DetectorError> {
        if texts.len() != labels.len() {
            return Err(DetectorError::InvalidInput(format!(
                "{} texts but {} labels",
                texts.len(),
                labels.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&label| label > 1) {
            return Err(DetectorError::InvalidInput(format!(
                "label {} is not 0 or 1",
                bad
            )));
        }

        Ok(Self {
            emails: texts
                .into_iter()
                .zip(labels)
                .map(|(content, label)| LabeledEmail { content, label })
                .collect(),
        })
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::from_csv_reader(file)?;
        log::info!("Loaded {} emails from {}", dataset.len(), path.display());
        Ok(dataset)
    }

    /// Reads a CSV with a header row containing `content` and `is_phishing`.
    /// Other columns are ignored and an empty content cell is an empty email.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().trim_start_matches('\u{feff}') == name)
                .ok_or_else(|| DatasetError::MissingColumn(name.to_string()))
        };
        let content_index = column(CONTENT_COLUMN)?;
        let label_index = column(LABEL_COLUMN)?;

        let mut emails = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let raw_label = record.get(label_index).unwrap_or("");
            let label = parse_label(raw_label).ok_or_else(|| DatasetError::InvalidLabel {
                row: row + 1,
                value: raw_label.to_string(),
            })?;

            emails.push(LabeledEmail {
                content: record.get(content_index).unwrap_or("").to_string(),
                label,
            });
        }

        Ok(Self { emails })
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    pub fn emails(&self) -> &[LabeledEmail] {
        &self.emails
    }

    pub fn texts(&self) -> Vec<&str> {
        self.emails.iter().map(|e| e.content.as_str()).collect()
    }

    pub fn labels(&self) -> Vec<u8> {
        self.emails.iter().map(|e| e.label).collect()
    }

    pub fn phishing_count(&self) -> usize {
        self.emails.iter().filter(|e| e.label == 1).count()
    }
}

fn parse_label(value: &str) -> Option<u8> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Some(1),
        "0" | "0.0" | "false" => Some(0),
        _ => None,
    }
}
