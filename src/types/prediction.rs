//! Prediction and summary data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Display label assigned to one scored claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// 1-based data row number in the upload
    pub row: usize,
    /// Source claim identifier
    pub patient_id: String,
    /// Display label after renaming
    pub label: String,
}

/// Aggregate counts of one scored upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Owning hospital
    pub hospital_id: i64,
    /// Upload timestamp
    pub uploaded_at: DateTime<Utc>,
    /// Rows that were scored
    pub total_cases: u64,
    /// Scored rows with a fraud label
    pub fraud_count: u64,
    /// Scored rows with the non-fraud label
    pub non_fraud_count: u64,
    /// Rows excluded from scoring
    pub rejected_count: u64,
}

impl DatasetSummary {
    /// Build a summary from final labels.
    pub fn from_predictions(
        hospital_id: i64,
        uploaded_at: DateTime<Utc>,
        predictions: &[PredictionResult],
        rejected_count: usize,
        non_fraud_label: &str,
    ) -> Self {
        let total_cases = predictions.len() as u64;
        let fraud_count = predictions
            .iter()
            .filter(|p| p.label != non_fraud_label)
            .count() as u64;

        Self {
            hospital_id,
            uploaded_at,
            total_cases,
            fraud_count,
            non_fraud_count: total_cases - fraud_count,
            rejected_count: rejected_count as u64,
        }
    }

    /// Share of scored rows labelled as fraud, in percent
    pub fn fraud_rate(&self) -> f64 {
        if self.total_cases > 0 {
            (self.fraud_count as f64 / self.total_cases as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Count of rows per label, largest first
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LabelBreakdown {
    pub counts: Vec<(String, u64)>,
}

impl LabelBreakdown {
    /// Tally labels; ties are ordered by label name.
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let mut tally: HashMap<&str, u64> = HashMap::new();
        for label in labels {
            *tally.entry(label).or_insert(0) += 1;
        }

        let mut counts: Vec<(String, u64)> = tally
            .into_iter()
            .map(|(label, count)| (label.to_string(), count))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Self { counts }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|(_, c)| c).sum()
    }

    /// Rows whose label is anything but `non_fraud_label`
    pub fn fraud_count(&self, non_fraud_label: &str) -> u64 {
        self.counts
            .iter()
            .filter(|(label, _)| label != non_fraud_label)
            .map(|(_, c)| c)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
