//! Feature building for claim fraud model inference.
//!
//! Derives length of stay, normalizes gender and assembles the raw
//! (pre-encoding) feature rows in the column order used at training time.

use tracing::debug;

use crate::config::{PreprocessingConfig, UnknownGenderPolicy};
use crate::error::{PipelineError, RowRejection};
use crate::schema::{AGE, AMOUNT_BILLED, DIAGNOSIS, GENDER};
use crate::types::claim::{ClaimRecord, Gender};

/// Derived column holding discharge minus admission in days
pub const LENGTH_OF_STAY: &str = "Length of Stay";

/// Feature columns before encoding and scaling, in training order.
pub const RAW_FEATURE_COLUMNS: [&str; 5] = [AGE, GENDER, DIAGNOSIS, AMOUNT_BILLED, LENGTH_OF_STAY];

/// One claim reduced to model inputs, diagnosis still as text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeatures {
    pub row: usize,
    pub patient_id: String,
    pub age: f64,
    pub gender: Gender,
    pub diagnosis: String,
    pub amount_billed: f64,
    pub length_of_stay: f64,
}

/// Raw features for the accepted claims plus claims rejected here.
#[derive(Debug, Default)]
pub struct BuiltFeatures {
    pub rows: Vec<RawFeatures>,
    pub rejected: Vec<RowRejection>,
}

/// Feature builder that turns validated claims into raw model inputs.
pub struct FeatureExtractor {
    unknown_gender: UnknownGenderPolicy,
    unknown_gender_default: Gender,
}

impl FeatureExtractor {
    /// Create a new feature builder.
    pub fn new(config: &PreprocessingConfig) -> Self {
        Self {
            unknown_gender: config.unknown_gender,
            unknown_gender_default: config.unknown_gender_default,
        }
    }

    /// Map a submitted gender onto the canonical domain.
    ///
    /// Canonical values map to themselves, so normalizing twice is a no-op.
    pub fn normalize_gender(&self, row: usize, raw: &str) -> Result<Gender, PipelineError> {
        match Gender::from_alias(raw) {
            Some(gender) => Ok(gender),
            None => match self.unknown_gender {
                UnknownGenderPolicy::Default => {
                    debug!(row = row, value = %raw, default = %self.unknown_gender_default, "Unknown gender, using default");
                    Ok(self.unknown_gender_default)
                }
                UnknownGenderPolicy::Reject => Err(PipelineError::UnknownCategory {
                    row,
                    column: GENDER.to_string(),
                    value: raw.to_string(),
                }),
            },
        }
    }

    /// Extract raw features from one claim.
    pub fn extract(&self, claim: &ClaimRecord) -> Result<RawFeatures, PipelineError> {
        let gender = self.normalize_gender(claim.row, &claim.gender)?;

        Ok(RawFeatures {
            row: claim.row,
            patient_id: claim.patient_id.clone(),
            age: claim.age,
            gender,
            diagnosis: claim.diagnosis.clone(),
            amount_billed: claim.amount_billed,
            length_of_stay: claim.stay_days() as f64,
        })
    }

    /// Extract raw features from every claim, collecting row rejections.
    pub fn build(&self, claims: &[ClaimRecord]) -> BuiltFeatures {
        let mut built = BuiltFeatures::default();

        for claim in claims {
            match self.extract(claim) {
                Ok(features) => built.rows.push(features),
                Err(reason) => built.rejected.push(RowRejection {
                    row: claim.row,
                    patient_id: claim.patient_id.clone(),
                    reason,
                }),
            }
        }

        built
    }

    /// Get the number of raw features produced.
    pub fn feature_count(&self) -> usize {
        RAW_FEATURE_COLUMNS.len()
    }

    /// Get raw feature names (matching training order).
    pub fn feature_names(&self) -> Vec<&'static str> {
        RAW_FEATURE_COLUMNS.to_vec()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(&PreprocessingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn claim(row: usize, gender: &str, admitted: (u32, u32), discharged: (u32, u32)) -> ClaimRecord {
        let at = |(m, d): (u32, u32)| {
            NaiveDate::from_ymd_opt(2025, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        ClaimRecord {
            row,
            patient_id: format!("P{:03}", row),
            admitted: at(admitted),
            discharged: at(discharged),
            age: 45.0,
            gender: gender.to_string(),
            diagnosis: "Malaria".to_string(),
            amount_billed: 50000.0,
        }
    }

    #[test]
    fn test_feature_extraction() {
        let extractor = FeatureExtractor::default();
        let features = extractor.extract(&claim(1, "male", (8, 1), (8, 5))).unwrap();

        assert_eq!(features.gender, Gender::Male);
        assert_eq!(features.length_of_stay, 4.0);
        assert_eq!(features.age, 45.0);
        assert_eq!(features.diagnosis, "Malaria");
    }

    #[test]
    fn test_gender_normalization_is_idempotent() {
        let extractor = FeatureExtractor::default();
        for raw in ["m", "MALE", "f", "Female", " woman "] {
            let once = extractor.normalize_gender(1, raw).unwrap();
            let twice = extractor.normalize_gender(1, once.as_str()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_unknown_gender_rejected_by_default() {
        let extractor = FeatureExtractor::default();
        let built = extractor.build(&[claim(1, "Male", (8, 1), (8, 2)), claim(2, "X", (8, 1), (8, 2))]);

        assert_eq!(built.rows.len(), 1);
        assert_eq!(built.rejected.len(), 1);
        assert!(matches!(
            built.rejected[0].reason,
            PipelineError::UnknownCategory { row: 2, .. }
        ));
    }

    #[test]
    fn test_unknown_gender_default_policy() {
        let config = PreprocessingConfig {
            unknown_gender: UnknownGenderPolicy::Default,
            unknown_gender_default: Gender::Male,
            ..PreprocessingConfig::default()
        };
        let extractor = FeatureExtractor::new(&config);
        assert_eq!(extractor.normalize_gender(4, "unspecified").unwrap(), Gender::Male);
    }

    #[test]
    fn test_feature_count() {
        let extractor = FeatureExtractor::default();
        assert_eq!(extractor.feature_count(), 5);
        assert_eq!(extractor.feature_names()[4], LENGTH_OF_STAY);
    }
}
