use super::engine::Label;
use std::collections::{HashMap, HashSet};

const MAX_EXPLANATION_TERMS: usize = 5;

/// Importance weight per vocabulary term, kept in feature column order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureImportance {
    terms: Vec<(String, f64)>,
    lookup: HashMap<String, usize>,
}

impl FeatureImportance {
    pub fn new(terms: &[String], weights: &[f64]) -> Self {
        let terms: Vec<(String, f64)> = terms
            .iter()
            .cloned()
            .zip(weights.iter().copied())
            .collect();
        let lookup = terms
            .iter()
            .enumerate()
            .map(|(i, (t, _))| (t.clone(), i))
            .collect();
        Self { terms, lookup }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// (column, weight) of a term.
    pub fn get(&self, term: &str) -> Option<(usize, f64)> {
        self.lookup
            .get(term)
            .map(|&column| (column, self.terms[column].1))
    }

    /// Highest weighted terms, for reporting.
    pub fn top(&self, n: usize) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> =
            self.terms.iter().map(|(t, w)| (t.as_str(), *w)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        ranked
    }
}

/// Up to five distinct whitespace-separated words of `text` that are
/// vocabulary terms, strongest first.
pub fn key_terms<'a>(text: &str, importance: &'a FeatureImportance) -> Vec<&'a str> {
    let lowered = text.to_lowercase();
    let mut seen = HashSet::new();
    let mut matches: Vec<(usize, f64)> = lowered
        .split_whitespace()
        .filter(|word| seen.insert(*word))
        .filter_map(|word| importance.get(word))
        .collect();

    matches.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    matches
        .into_iter()
        .take(MAX_EXPLANATION_TERMS)
        .map(|(column, _)| importance.terms[column].0.as_str())
        .collect()
}

pub fn explain(text: &str, label: Label, importance: Option<&FeatureImportance>) -> String {
    let Some(importance) = importance else {
        return "No feature importance available for explanation.".to_string();
    };

    let quoted = key_terms(text, importance)
        .iter()
        .map(|term| format!("\"{}\"", term))
        .collect::<Vec<_>>();

    match label {
        Label::Phishing => format!(
            "This email was classified as phishing because it contains suspicious elements such as: {}",
            quoted.join(", ")
        ),
        Label::Legitimate if quoted.is_empty() => {
            "This email was classified as legitimate. ".to_string()
        }
        Label::Legitimate => format!(
            "This email was classified as legitimate. Key words that indicate legitimacy: {}",
            quoted.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn importance() -> FeatureImportance {
        let terms: Vec<String> = ["account", "invoice", "lunch", "password", "urgent", "verify"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        FeatureImportance::new(&terms, &[0.2, 0.05, 0.05, 0.3, 0.25, 0.15])
    }

    #[test]
    fn test_phishing_explanation() {
        let text = "URGENT: verify your password and account now";
        let explanation = explain(text, Label::Phishing, Some(&importance()));
        assert_eq!(
            explanation,
            "This email was classified as phishing because it contains suspicious elements \
             such as: \"password\", \"account\", \"verify\""
        );
    }

    #[test]
    fn test_phishing_without_matching_terms() {
        let explanation = explain("hello there", Label::Phishing, Some(&importance()));
        assert_eq!(
            explanation,
            "This email was classified as phishing because it contains suspicious elements such as: "
        );
    }

    #[test]
    fn test_legitimate_explanation() {
        let imp = importance();
        assert_eq!(
            explain("Lunch and invoice lunch", Label::Legitimate, Some(&imp)),
            "This email was classified as legitimate. Key words that indicate legitimacy: \
             \"invoice\", \"lunch\""
        );
        assert_eq!(
            explain("nothing relevant", Label::Legitimate, Some(&imp)),
            "This email was classified as legitimate. "
        );
    }

    #[test]
    fn test_no_importance() {
        assert_eq!(
            explain("anything", Label::Phishing, None),
            "No feature importance available for explanation."
        );
    }

    #[test]
    fn test_lookup() {
        let imp = importance();
        assert_eq!(imp.get("urgent"), Some((4, 0.25)));
        assert_eq!(imp.get("missing"), None);
        assert_eq!(imp.top(2), vec![("password", 0.3), ("urgent", 0.25)]);
    }

    #[test]
    fn test_at_most_five_terms_all_from_input() {
        let terms: Vec<String> = (0..10).map(|i| format!("term{}", i)).collect();
        let weights: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let imp = FeatureImportance::new(&terms, &weights);

        let text = "term1 term3 term5 term7 term9 term8 term2 absent";
        let found = key_terms(text, &imp);
        assert_eq!(found, vec!["term9", "term8", "term7", "term5", "term3"]);
        for term in &found {
            assert!(text.split_whitespace().any(|w| w == *term));
        }
    }
}
