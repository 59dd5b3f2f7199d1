//! Artifact loader: encoders, scaler and feature contract from JSON, the
//! classifier from ONNX.

use ort::session::{builder::GraphOptimizationLevel, Session};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{info, warn};

use crate::config::ArtifactsConfig;
use crate::error::PipelineError;
use crate::models::aligner::FeatureContract;
use crate::models::encoder::{
    CategoricalEncoder, FeatureScaler, LabelEncoder, LabelEncoderFile, StandardScaler,
    StandardScalerFile, NUMERIC_COLUMNS,
};
use crate::models::inference::{Classifier, OnnxClassifier};

const CLASSIFIER: &str = "classifier";
const LABEL_ENCODER: &str = "label encoder";
const DIAGNOSIS_ENCODER: &str = "diagnosis encoder";
const SCALER: &str = "scaler";
const FEATURE_CONTRACT: &str = "feature contract";

/// Fitted artifacts, loaded once and shared read-only by every run.
pub struct ArtifactSet {
    pub classifier: Box<dyn Classifier>,
    pub label_encoder: Box<dyn CategoricalEncoder>,
    pub diagnosis_encoder: Box<dyn CategoricalEncoder>,
    pub scaler: Box<dyn FeatureScaler>,
    /// Absent when the contract file is missing; runs are then degraded
    pub contract: Option<FeatureContract>,
}

/// Loader for model artifacts
pub struct ArtifactLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ArtifactLoader {
    /// Create a new artifact loader with default settings (1 thread)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a new artifact loader with specified number of ONNX threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self { onnx_threads }
    }

    /// Load every artifact named in the configuration.
    pub fn load_all(&self, config: &ArtifactsConfig) -> Result<ArtifactSet, PipelineError> {
        let label_encoder = self.load_label_encoder(
            config.path_of(&config.label_encoder),
            LABEL_ENCODER,
        )?;
        let diagnosis_encoder = self.load_label_encoder(
            config.path_of(&config.diagnosis_encoder),
            DIAGNOSIS_ENCODER,
        )?;
        let scaler = self.load_scaler(config.path_of(&config.scaler))?;
        let contract = self.load_feature_contract(config.path_of(&config.feature_names))?;
        let classifier = self.load_classifier(config.path_of(&config.classifier))?;

        info!(
            labels = label_encoder.classes().len(),
            diagnoses = diagnosis_encoder.classes().len(),
            contract_columns = contract.as_ref().map(FeatureContract::len),
            "Loaded {} artifacts from {}",
            if contract.is_some() { 5 } else { 4 },
            config.models_dir
        );

        Ok(ArtifactSet {
            classifier: Box::new(classifier),
            label_encoder: Box::new(label_encoder),
            diagnosis_encoder: Box::new(diagnosis_encoder),
            scaler: Box::new(scaler),
            contract,
        })
    }

    /// Load a label encoder (`{"classes": [...]}`)
    pub fn load_label_encoder<P: AsRef<Path>>(
        &self,
        path: P,
        artifact: &str,
    ) -> Result<LabelEncoder, PipelineError> {
        let path = path.as_ref();
        let file: LabelEncoderFile = read_json(path, artifact)?;
        LabelEncoder::new(file.classes)
            .map_err(|reason| PipelineError::artifact_corrupt(artifact, path, reason))
    }

    /// Load a standard scaler (`{"feature_names": [...], "mean": [...], "scale": [...]}`)
    pub fn load_scaler<P: AsRef<Path>>(&self, path: P) -> Result<StandardScaler, PipelineError> {
        let path = path.as_ref();
        let file: StandardScalerFile = read_json(path, SCALER)?;
        let scaler = StandardScaler::try_from(file)
            .map_err(|reason| PipelineError::artifact_corrupt(SCALER, path, reason))?;

        if let Some(missing) = NUMERIC_COLUMNS
            .iter()
            .find(|c| !scaler.columns().iter().any(|s| s == *c))
        {
            return Err(PipelineError::artifact_corrupt(
                SCALER,
                path,
                format!("no statistics for column '{}'", missing),
            ));
        }
        Ok(scaler)
    }

    /// Load the feature contract; a missing file is not an error.
    pub fn load_feature_contract<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<Option<FeatureContract>, PipelineError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                path = %path.display(),
                "Feature contract not found, column order will not be enforced"
            );
            return Ok(None);
        }

        let columns: Vec<String> = read_json(path, FEATURE_CONTRACT)?;
        if columns.is_empty() {
            return Err(PipelineError::artifact_corrupt(
                FEATURE_CONTRACT,
                path,
                "column list is empty",
            ));
        }
        Ok(Some(FeatureContract::new(columns)))
    }

    /// Load the ONNX classifier
    pub fn load_classifier<P: AsRef<Path>>(&self, path: P) -> Result<OnnxClassifier, PipelineError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::artifact_missing(CLASSIFIER, path));
        }

        info!(path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let corrupt = |e: String| PipelineError::artifact_corrupt(CLASSIFIER, path, e);
        let session = Session::builder()
            .map_err(|e| corrupt(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| corrupt(e.to_string()))?
            .with_intra_threads(self.onnx_threads)
            .map_err(|e| corrupt(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| corrupt(e.to_string()))?;

        let classifier = OnnxClassifier::new(session);
        info!(
            path = %path.display(),
            input = %classifier.input_name(),
            "Model loaded successfully"
        );
        Ok(classifier)
    }
}

impl Default for ArtifactLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Read and deserialize a JSON artifact, telling absent from unreadable.
fn read_json<T: DeserializeOwned>(path: &Path, artifact: &str) -> Result<T, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::artifact_missing(artifact, path));
    }

    let bytes = std::fs::read(path)
        .map_err(|e| PipelineError::artifact_corrupt(artifact, path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| PipelineError::artifact_corrupt(artifact, path, e))
}
