//! Configuration management for the claims fraud pipeline

use anyhow::{Context, Result};
use config::{Config, File};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::claim::Gender;

/// What to do with a gender value outside the known alias set
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownGenderPolicy {
    /// Reject the row with an unknown-category error
    #[default]
    Reject,
    /// Substitute `unknown_gender_default` and keep the row
    Default,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub preprocessing: PreprocessingConfig,
    #[serde(default)]
    pub labels: LabelsConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Locations of the fitted model artifacts
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory containing all artifact files
    pub models_dir: String,
    /// ONNX classifier
    #[serde(default = "default_classifier_file")]
    pub classifier: String,
    /// Target-label encoder
    #[serde(default = "default_label_encoder_file")]
    pub label_encoder: String,
    /// Diagnosis encoder
    #[serde(default = "default_diagnosis_encoder_file")]
    pub diagnosis_encoder: String,
    /// Numeric scaler
    #[serde(default = "default_scaler_file")]
    pub scaler: String,
    /// Feature contract (optional at runtime)
    #[serde(default = "default_feature_names_file")]
    pub feature_names: String,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_classifier_file() -> String {
    "fraud_detection_model.onnx".to_string()
}

fn default_label_encoder_file() -> String {
    "fraud_encoder.json".to_string()
}

fn default_diagnosis_encoder_file() -> String {
    "diagnosis_encoder.json".to_string()
}

fn default_scaler_file() -> String {
    "scaler.json".to_string()
}

fn default_feature_names_file() -> String {
    "feature_names.json".to_string()
}

fn default_onnx_threads() -> usize {
    1
}

impl ArtifactsConfig {
    /// Resolve an artifact file name against `models_dir`.
    pub fn path_of(&self, file: &str) -> PathBuf {
        Path::new(&self.models_dir).join(file)
    }
}

/// Row preprocessing rules
#[derive(Debug, Clone, Deserialize)]
pub struct PreprocessingConfig {
    /// Primary date format for admission/discharge dates
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Formats tried in order when the primary one fails
    #[serde(default = "default_fallback_date_formats")]
    pub fallback_date_formats: Vec<String>,
    /// Policy for gender values outside the alias set
    #[serde(default)]
    pub unknown_gender: UnknownGenderPolicy,
    /// Gender substituted under the `default` policy
    #[serde(default = "default_unknown_gender_value")]
    pub unknown_gender_default: Gender,
    /// Encoder category used for unseen diagnoses, when the vocabulary has it
    #[serde(default = "default_diagnosis_fallback")]
    pub diagnosis_fallback: String,
    /// Code used for unseen diagnoses when the fallback category is absent
    #[serde(default = "default_diagnosis_sentinel")]
    pub diagnosis_sentinel_code: i64,
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_fallback_date_formats() -> Vec<String> {
    [
        "%Y/%m/%d",
        "%d/%m/%Y",
        "%d-%m-%Y",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%d %b %Y",
    ]
    .iter()
    .map(|f| f.to_string())
    .collect()
}

fn default_unknown_gender_value() -> Gender {
    Gender::Female
}

fn default_diagnosis_fallback() -> String {
    "Other".to_string()
}

fn default_diagnosis_sentinel() -> i64 {
    -1
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            date_format: default_date_format(),
            fallback_date_formats: default_fallback_date_formats(),
            unknown_gender: UnknownGenderPolicy::Reject,
            unknown_gender_default: default_unknown_gender_value(),
            diagnosis_fallback: default_diagnosis_fallback(),
            diagnosis_sentinel_code: default_diagnosis_sentinel(),
        }
    }
}

/// Display label configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LabelsConfig {
    /// Raw label -> display label, read from `[[labels.renames]]` entries
    #[serde(default = "default_label_renames", deserialize_with = "deserialize_renames")]
    pub renames: HashMap<String, String>,
    /// Display label that counts as "not fraud"
    #[serde(default = "default_non_fraud_label")]
    pub non_fraud_label: String,
}

/// One `[[labels.renames]]` entry. Map keys lose their case when loaded,
/// so raw labels are carried as values.
#[derive(Debug, Deserialize)]
struct LabelRename {
    raw: String,
    display: String,
}

fn deserialize_renames<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<LabelRename>::deserialize(deserializer)?;
    Ok(entries.into_iter().map(|r| (r.raw, r.display)).collect())
}

fn default_label_renames() -> HashMap<String, String> {
    let mut renames = HashMap::new();
    renames.insert("None".to_string(), "No Fraud".to_string());
    renames
}

fn default_non_fraud_label() -> String {
    "No Fraud".to_string()
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            renames: default_label_renames(),
            non_fraud_label: default_non_fraud_label(),
        }
    }
}

/// Result store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file
    pub database_path: String,
    /// Archive directory for original uploads
    pub data_dir: String,
    /// Archive directory for prediction files
    pub results_dir: String,
    /// SQLite busy timeout in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Write attempts while the database is locked
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Delay between locked-write retries in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Name of the bootstrap administrator
    #[serde(default = "default_admin_name")]
    pub default_admin_name: String,
    /// Password of the bootstrap administrator
    #[serde(default = "default_admin_password")]
    pub default_admin_password: String,
}

fn default_busy_timeout_ms() -> u64 {
    3000
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_admin_name() -> String {
    "admin".to_string()
}

fn default_admin_password() -> String {
    "admin123".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            artifacts: ArtifactsConfig {
                models_dir: "models".to_string(),
                classifier: default_classifier_file(),
                label_encoder: default_label_encoder_file(),
                diagnosis_encoder: default_diagnosis_encoder_file(),
                scaler: default_scaler_file(),
                feature_names: default_feature_names_file(),
                onnx_threads: 1,
            },
            preprocessing: PreprocessingConfig::default(),
            labels: LabelsConfig::default(),
            store: StoreConfig {
                database_path: "nhis.db".to_string(),
                data_dir: "data".to_string(),
                results_dir: "results".to_string(),
                busy_timeout_ms: default_busy_timeout_ms(),
                retry_attempts: default_retry_attempts(),
                retry_delay_ms: default_retry_delay_ms(),
                default_admin_name: default_admin_name(),
                default_admin_password: default_admin_password(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.artifacts.models_dir, "models");
        assert_eq!(config.preprocessing.date_format, "%Y-%m-%d");
        assert_eq!(config.preprocessing.unknown_gender, UnknownGenderPolicy::Reject);
        assert_eq!(config.labels.non_fraud_label, "No Fraud");
        assert_eq!(config.store.retry_attempts, 5);
    }

    #[test]
    fn test_default_label_renames() {
        let renames = default_label_renames();
        assert_eq!(renames.len(), 1);
        assert_eq!(renames.get("None").map(String::as_str), Some("No Fraud"));
    }

    #[test]
    fn test_artifact_paths() {
        let config = AppConfig::default();
        let path = config.artifacts.path_of(&config.artifacts.feature_names);
        assert_eq!(path, Path::new("models").join("feature_names.json"));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let shipped = AppConfig::load().unwrap();
        let defaults = AppConfig::default();

        assert_eq!(shipped.artifacts.classifier, defaults.artifacts.classifier);
        assert_eq!(
            shipped.preprocessing.fallback_date_formats,
            defaults.preprocessing.fallback_date_formats
        );
        assert_eq!(shipped.labels.renames, defaults.labels.renames);
        assert_eq!(shipped.store.database_path, defaults.store.database_path);
        assert_eq!(shipped.logging.format, defaults.logging.format);
    }

    #[test]
    fn test_load_from_path_applies_section_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[artifacts]
models_dir = "artifacts"

[preprocessing]
unknown_gender = "default"
unknown_gender_default = "Male"

[store]
database_path = "test.db"
data_dir = "d"
results_dir = "r"

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.artifacts.models_dir, "artifacts");
        assert_eq!(config.artifacts.scaler, "scaler.json");
        assert_eq!(config.preprocessing.unknown_gender, UnknownGenderPolicy::Default);
        assert_eq!(config.preprocessing.unknown_gender_default, Gender::Male);
        assert_eq!(config.preprocessing.diagnosis_sentinel_code, -1);
        assert_eq!(config.labels.non_fraud_label, "No Fraud");
        assert_eq!(config.store.busy_timeout_ms, 3000);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_label_renames_keep_raw_case() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[artifacts]
models_dir = "models"

[labels]
non_fraud_label = "Clean"

[[labels.renames]]
raw = "None"
display = "Clean"

[[labels.renames]]
raw = "Upcoding"
display = "Upcoded Bill"

[store]
database_path = "test.db"
data_dir = "d"
results_dir = "r"

[logging]
level = "info"
format = "pretty"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        let renames = &config.labels.renames;
        assert_eq!(renames.len(), 2);
        assert_eq!(renames.get("None").map(String::as_str), Some("Clean"));
        assert_eq!(renames.get("Upcoding").map(String::as_str), Some("Upcoded Bill"));
        assert!(renames.get("none").is_none());
        assert_eq!(config.labels.non_fraud_label, "Clean");
    }
}
