use serde::{Deserialize, Serialize};
use std::fmt::Write;

const CLASS_NAMES: [&str; 2] = ["legitimate", "phishing"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut matrix = Self::default();
        for (&actual, &predicted) in y_true.iter().zip(y_pred) {
            match (actual, predicted) {
                (1, 1) => matrix.true_positives += 1,
                (1, _) => matrix.false_negatives += 1,
                (_, 1) => matrix.false_positives += 1,
                _ => matrix.true_negatives += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }

    /// (precision, recall, f1, support) for one class.
    fn class_scores(&self, class: u8) -> (f64, f64, f64, usize) {
        let (hits, false_alarms, misses) = if class == 1 {
            (self.true_positives, self.false_positives, self.false_negatives)
        } else {
            (self.true_negatives, self.false_negatives, self.false_positives)
        };
        let precision = ratio(hits, hits + false_alarms);
        let recall = ratio(hits, hits + misses);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        (precision, recall, f1, hits + misses)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Evaluation of a freshly trained model on its held-out split. Phishing is
/// the positive class; undefined ratios are reported as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub confusion: ConfusionMatrix,
    pub classification_report: String,
    pub train_size: usize,
    pub test_size: usize,
    pub feature_count: usize,
}

impl Metrics {
    pub fn evaluate(y_true: &[u8], y_pred: &[u8], train_size: usize, feature_count: usize) -> Self {
        let confusion = ConfusionMatrix::from_predictions(y_true, y_pred);
        let (precision, recall, f1_score, _) = confusion.class_scores(1);

        Self {
            accuracy: ratio(
                confusion.true_positives + confusion.true_negatives,
                confusion.total(),
            ),
            precision,
            recall,
            f1_score,
            classification_report: classification_report(&confusion),
            confusion,
            train_size,
            test_size: y_true.len(),
            feature_count,
        }
    }
}

/// Plain-text per-class table with accuracy, macro and weighted averages.
pub fn classification_report(confusion: &ConfusionMatrix) -> String {
    let width = CLASS_NAMES
        .iter()
        .map(|name| name.len())
        .chain(std::iter::once("weighted avg".len()))
        .max()
        .unwrap_or(12);

    let scores = [confusion.class_scores(0), confusion.class_scores(1)];
    let total = confusion.total();
    let mut report = String::new();

    let _ = writeln!(
        report,
        "{:>width$}  {:>9} {:>9} {:>9} {:>9}\n",
        "", "precision", "recall", "f1-score", "support"
    );

    for (name, (precision, recall, f1, support)) in CLASS_NAMES.iter().zip(scores) {
        let _ = writeln!(
            report,
            "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
            name, precision, recall, f1, support
        );
    }
    report.push('\n');

    let accuracy = ratio(confusion.true_positives + confusion.true_negatives, total);
    let _ = writeln!(
        report,
        "{:>width$}  {:>9} {:>9} {:>9.2} {:>9}",
        "accuracy", "", "", accuracy, total
    );

    let macro_avg = |pick: fn(&(f64, f64, f64, usize)) -> f64| {
        scores.iter().map(pick).sum::<f64>() / scores.len() as f64
    };
    let weighted_avg = |pick: fn(&(f64, f64, f64, usize)) -> f64| {
        if total == 0 {
            return 0.0;
        }
        scores.iter().map(|s| pick(s) * s.3 as f64).sum::<f64>() / total as f64
    };

    let _ = writeln!(
        report,
        "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
        "macro avg",
        macro_avg(|s| s.0),
        macro_avg(|s| s.1),
        macro_avg(|s| s.2),
        total
    );
    let _ = writeln!(
        report,
        "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
        "weighted avg",
        weighted_avg(|s| s.0),
        weighted_avg(|s| s.1),
        weighted_avg(|s| s.2),
        total
    );

    report
}
