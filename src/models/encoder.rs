//! Fitted categorical encoders, numeric scaler, and the adapter that
//! applies them to raw feature rows.

use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::PreprocessingConfig;
use crate::error::PipelineError;
use crate::feature_extractor::{RawFeatures, LENGTH_OF_STAY, RAW_FEATURE_COLUMNS};
use crate::schema::{AGE, AMOUNT_BILLED};
use crate::types::frame::FeatureFrame;

/// Numeric columns standardized with fit-time statistics, in fit order
pub const NUMERIC_COLUMNS: [&str; 3] = [AGE, AMOUNT_BILLED, LENGTH_OF_STAY];

/// Category <-> integer code mapping fitted at training time.
pub trait CategoricalEncoder: Send + Sync {
    /// Code of a known category, `None` when unseen
    fn encode(&self, value: &str) -> Option<i64>;
    /// Category of a code, `None` when out of range
    fn decode(&self, code: i64) -> Option<&str>;
    /// Known vocabulary in code order
    fn classes(&self) -> &[String];
}

/// Column-wise numeric transform fitted at training time.
pub trait FeatureScaler: Send + Sync {
    /// Transform one value, `None` when the column was not fitted
    fn scale(&self, column: &str, value: f64) -> Option<f64>;
    /// Fitted columns
    fn columns(&self) -> &[String];
}

/// On-disk shape of a label encoder artifact
#[derive(Debug, Deserialize)]
pub struct LabelEncoderFile {
    pub classes: Vec<String>,
}

/// Encoder whose codes are positions in the fitted class list.
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    classes: Vec<String>,
    index: HashMap<String, i64>,
    folded: HashMap<String, i64>,
}

impl LabelEncoder {
    /// Build from a class list; classes must be non-empty and unique.
    pub fn new(classes: Vec<String>) -> Result<Self, String> {
        if classes.is_empty() {
            return Err("class list is empty".to_string());
        }

        let mut index = HashMap::with_capacity(classes.len());
        let mut folded = HashMap::with_capacity(classes.len());
        for (code, class) in classes.iter().enumerate() {
            if index.insert(class.clone(), code as i64).is_some() {
                return Err(format!("duplicate class '{}'", class));
            }
            folded
                .entry(class.trim().to_lowercase())
                .or_insert(code as i64);
        }

        Ok(Self {
            classes,
            index,
            folded,
        })
    }
}

impl CategoricalEncoder for LabelEncoder {
    fn encode(&self, value: &str) -> Option<i64> {
        self.index
            .get(value)
            .or_else(|| self.folded.get(&value.trim().to_lowercase()))
            .copied()
    }

    fn decode(&self, code: i64) -> Option<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| self.classes.get(idx))
            .map(String::as_str)
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }
}

fn default_scaler_columns() -> Vec<String> {
    NUMERIC_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// On-disk shape of a standard scaler artifact
#[derive(Debug, Deserialize)]
pub struct StandardScalerFile {
    #[serde(default = "default_scaler_columns")]
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Standardization `(x - mean) / scale` with fit-time statistics.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    columns: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(columns: Vec<String>, mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, String> {
        if columns.len() != mean.len() || columns.len() != scale.len() {
            return Err(format!(
                "{} columns but {} means and {} scales",
                columns.len(),
                mean.len(),
                scale.len()
            ));
        }
        if mean.iter().chain(scale.iter()).any(|v| !v.is_finite()) {
            return Err("statistics contain non-finite values".to_string());
        }

        // Zero-variance columns are left unscaled
        let scale = scale
            .into_iter()
            .map(|s| if s == 0.0 { 1.0 } else { s })
            .collect();

        Ok(Self {
            columns,
            mean,
            scale,
        })
    }
}

impl TryFrom<StandardScalerFile> for StandardScaler {
    type Error = String;

    fn try_from(file: StandardScalerFile) -> Result<Self, Self::Error> {
        Self::new(file.feature_names, file.mean, file.scale)
    }
}

impl FeatureScaler for StandardScaler {
    fn scale(&self, column: &str, value: f64) -> Option<f64> {
        let idx = self.columns.iter().position(|c| c == column)?;
        Some((value - self.mean[idx]) / self.scale[idx])
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Outcome of encoding one diagnosis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosisCode {
    Known(i64),
    /// Not in the vocabulary; carries the fallback code
    Unseen(i64),
}

impl DiagnosisCode {
    pub fn code(&self) -> i64 {
        match self {
            DiagnosisCode::Known(code) | DiagnosisCode::Unseen(code) => *code,
        }
    }
}

/// Encoded and scaled feature frame
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub frame: FeatureFrame,
    /// Rows whose diagnosis fell back to the unseen-category code
    pub unseen_diagnoses: usize,
}

/// Applies the fitted diagnosis encoder and numeric scaler to raw rows.
pub struct EncoderScalerAdapter<'a> {
    diagnosis: &'a dyn CategoricalEncoder,
    scaler: &'a dyn FeatureScaler,
    unseen_code: i64,
}

impl<'a> EncoderScalerAdapter<'a> {
    /// Resolve the unseen-diagnosis code: the fallback category when the
    /// vocabulary has one, otherwise the sentinel code.
    pub fn new(
        diagnosis: &'a dyn CategoricalEncoder,
        scaler: &'a dyn FeatureScaler,
        config: &PreprocessingConfig,
    ) -> Result<Self, PipelineError> {
        if let Some(missing) = NUMERIC_COLUMNS
            .iter()
            .find(|c| !scaler.columns().iter().any(|s| s == *c))
        {
            return Err(PipelineError::IncompatibleArtifact {
                artifact: "scaler".to_string(),
                reason: format!("no statistics for column '{}'", missing),
            });
        }

        let unseen_code = diagnosis
            .encode(&config.diagnosis_fallback)
            .unwrap_or(config.diagnosis_sentinel_code);

        Ok(Self {
            diagnosis,
            scaler,
            unseen_code,
        })
    }

    pub fn unseen_code(&self) -> i64 {
        self.unseen_code
    }

    pub fn encode_diagnosis(&self, value: &str) -> DiagnosisCode {
        match self.diagnosis.encode(value) {
            Some(code) => DiagnosisCode::Known(code),
            None => DiagnosisCode::Unseen(self.unseen_code),
        }
    }

    fn scale(&self, column: &str, value: f64) -> Result<f32, PipelineError> {
        self.scaler
            .scale(column, value)
            .map(|v| v as f32)
            .ok_or_else(|| PipelineError::IncompatibleArtifact {
                artifact: "scaler".to_string(),
                reason: format!("no statistics for column '{}'", column),
            })
    }

    /// Encode and scale rows into a frame with columns
    /// `Age, Gender, Diagnosis, Amount Billed, Length of Stay`.
    pub fn transform(&self, rows: &[RawFeatures]) -> Result<EncodedFrame, PipelineError> {
        let mut frame = FeatureFrame::new(RAW_FEATURE_COLUMNS);
        let mut unseen_diagnoses = 0;

        for features in rows {
            let diagnosis = self.encode_diagnosis(&features.diagnosis);
            if let DiagnosisCode::Unseen(code) = diagnosis {
                unseen_diagnoses += 1;
                debug!(
                    row = features.row,
                    diagnosis = %features.diagnosis,
                    code = code,
                    "Unseen diagnosis mapped to fallback code"
                );
            }

            frame.push_row(vec![
                self.scale(AGE, features.age)?,
                features.gender.code(),
                diagnosis.code() as f32,
                self.scale(AMOUNT_BILLED, features.amount_billed)?,
                self.scale(LENGTH_OF_STAY, features.length_of_stay)?,
            ]);
        }

        if unseen_diagnoses > 0 {
            warn!(
                count = unseen_diagnoses,
                fallback_code = self.unseen_code,
                "Diagnoses outside the encoder vocabulary were scored with the fallback code"
            );
        }

        Ok(EncodedFrame {
            frame,
            unseen_diagnoses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::claim::Gender;

    fn encoder(classes: &[&str]) -> LabelEncoder {
        LabelEncoder::new(classes.iter().map(|c| c.to_string()).collect()).unwrap()
    }

    fn scaler() -> StandardScaler {
        StandardScaler::new(default_scaler_columns(), vec![40.0, 40000.0, 3.0], vec![10.0, 10000.0, 0.0])
            .unwrap()
    }

    fn raw(row: usize, diagnosis: &str) -> RawFeatures {
        RawFeatures {
            row,
            patient_id: format!("P{:03}", row),
            age: 45.0,
            gender: Gender::Male,
            diagnosis: diagnosis.to_string(),
            amount_billed: 50000.0,
            length_of_stay: 4.0,
        }
    }

    #[test]
    fn test_known_vocabulary_round_trip() {
        let encoder = encoder(&["Cholera", "Malaria", "Typhoid"]);
        for class in encoder.classes() {
            let code = encoder.encode(class).unwrap();
            assert_eq!(encoder.decode(code), Some(class.as_str()));
        }
        assert_eq!(encoder.encode("malaria "), Some(1));
        assert_eq!(encoder.decode(3), None);
        assert_eq!(encoder.decode(-1), None);
    }

    #[test]
    fn test_encoder_rejects_bad_vocabulary() {
        assert!(LabelEncoder::new(vec![]).is_err());
        assert!(LabelEncoder::new(vec!["A".to_string(), "A".to_string()]).is_err());
    }

    #[test]
    fn test_scaler_validation() {
        assert!(StandardScaler::new(default_scaler_columns(), vec![1.0], vec![1.0]).is_err());
        assert!(StandardScaler::new(vec!["Age".to_string()], vec![f64::NAN], vec![1.0]).is_err());
    }

    #[test]
    fn test_zero_scale_left_unscaled() {
        let scaler = scaler();
        assert_eq!(scaler.scale(LENGTH_OF_STAY, 4.0), Some(1.0));
        assert_eq!(scaler.scale(AGE, 50.0), Some(1.0));
        assert_eq!(scaler.scale("Unknown", 1.0), None);
    }

    #[test]
    fn test_unseen_diagnosis_uses_fallback_bucket() {
        let encoder = encoder(&["Malaria", "Other", "Typhoid"]);
        let scaler = scaler();
        let adapter =
            EncoderScalerAdapter::new(&encoder, &scaler, &PreprocessingConfig::default()).unwrap();

        assert_eq!(adapter.unseen_code(), 1);
        assert_eq!(adapter.encode_diagnosis("Ebola"), DiagnosisCode::Unseen(1));
        assert_eq!(adapter.encode_diagnosis("Typhoid"), DiagnosisCode::Known(2));
    }

    #[test]
    fn test_unseen_diagnosis_uses_sentinel_without_bucket() {
        let encoder = encoder(&["Malaria", "Typhoid"]);
        let scaler = scaler();
        let adapter =
            EncoderScalerAdapter::new(&encoder, &scaler, &PreprocessingConfig::default()).unwrap();

        let encoded = adapter.transform(&[raw(1, "Malaria"), raw(2, "Ebola")]).unwrap();
        assert_eq!(encoded.unseen_diagnoses, 1);
        assert_eq!(encoded.frame.column("Diagnosis"), Some(vec![0.0, -1.0]));
    }

    #[test]
    fn test_transform_scales_numeric_columns() {
        let encoder = encoder(&["Malaria"]);
        let scaler = scaler();
        let adapter =
            EncoderScalerAdapter::new(&encoder, &scaler, &PreprocessingConfig::default()).unwrap();

        let encoded = adapter.transform(&[raw(1, "Malaria")]).unwrap();
        assert_eq!(encoded.frame.columns(), RAW_FEATURE_COLUMNS);
        assert_eq!(encoded.frame.rows()[0], vec![0.5, 1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_scaler_missing_numeric_column_is_incompatible() {
        let encoder = encoder(&["Malaria"]);
        let scaler = StandardScaler::new(vec![AGE.to_string()], vec![0.0], vec![1.0]).unwrap();
        let result = EncoderScalerAdapter::new(&encoder, &scaler, &PreprocessingConfig::default());
        assert!(matches!(result, Err(PipelineError::IncompatibleArtifact { .. })));
    }
}
