//! End-to-end scoring of one claim upload.
//!
//! validate → build features → encode/scale → align → score. Row-level
//! problems are collected and the remaining rows still get scored; schema,
//! artifact and inference failures abort the run.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, LabelsConfig, PreprocessingConfig};
use crate::error::{PipelineError, RowRejection};
use crate::feature_extractor::{FeatureExtractor, RawFeatures};
use crate::metrics::{RunMetrics, Stage};
use crate::models::aligner::ColumnAligner;
use crate::models::encoder::EncoderScalerAdapter;
use crate::models::inference::{LabelMap, Scorer};
use crate::models::loader::{ArtifactLoader, ArtifactSet};
use crate::schema::{ClaimUpload, SchemaValidator};
use crate::types::prediction::{DatasetSummary, PredictionResult};

/// Outcome of scoring one upload
#[derive(Debug)]
pub struct ScoringRun {
    /// Identifier for log correlation
    pub run_id: Uuid,
    /// One prediction per scored row, in upload order
    pub predictions: Vec<PredictionResult>,
    /// Pre-encoding features of the scored rows, parallel to `predictions`
    pub features: Vec<RawFeatures>,
    /// Rows excluded from scoring, in upload order
    pub rejected: Vec<RowRejection>,
    /// False when no feature contract was available (degraded mode)
    pub column_order_guaranteed: bool,
    /// Scored rows whose diagnosis fell back to the unseen-category code
    pub unseen_diagnoses: usize,
    pub metrics: RunMetrics,
    non_fraud_label: String,
}

impl ScoringRun {
    pub fn fraud_count(&self) -> usize {
        self.predictions
            .iter()
            .filter(|p| p.label != self.non_fraud_label)
            .count()
    }

    /// Display label that counts as "not fraud"
    pub fn non_fraud_label(&self) -> &str {
        &self.non_fraud_label
    }

    /// Summary to persist for a hospital's upload
    pub fn summary(&self, hospital_id: i64, uploaded_at: DateTime<Utc>) -> DatasetSummary {
        DatasetSummary::from_predictions(
            hospital_id,
            uploaded_at,
            &self.predictions,
            self.rejected.len(),
            &self.non_fraud_label,
        )
    }
}

/// Scores uploads against an immutable set of fitted artifacts.
pub struct InferencePipeline {
    artifacts: Arc<ArtifactSet>,
    preprocessing: PreprocessingConfig,
    labels: LabelMap,
    non_fraud_label: String,
}

impl InferencePipeline {
    pub fn new(
        artifacts: Arc<ArtifactSet>,
        preprocessing: PreprocessingConfig,
        labels: &LabelsConfig,
    ) -> Self {
        Self {
            artifacts,
            preprocessing,
            labels: LabelMap::new(labels.renames.clone()),
            non_fraud_label: labels.non_fraud_label.clone(),
        }
    }

    /// Load artifacts from the configured directory and build a pipeline.
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let loader = ArtifactLoader::with_threads(config.artifacts.onnx_threads);
        let artifacts = loader.load_all(&config.artifacts)?;
        Ok(Self::new(
            Arc::new(artifacts),
            config.preprocessing.clone(),
            &config.labels,
        ))
    }

    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    /// Score every valid row of an upload.
    pub fn run(&self, upload: &ClaimUpload) -> Result<ScoringRun, PipelineError> {
        let run_id = Uuid::new_v4();
        let mut metrics = RunMetrics::new();
        metrics.rows_read = upload.row_count() as u64;

        let start = Instant::now();
        let validated = SchemaValidator::new(&self.preprocessing).validate(upload)?;
        metrics.record_stage(Stage::Validate, start.elapsed());

        let start = Instant::now();
        let built = FeatureExtractor::new(&self.preprocessing).build(&validated.records);
        metrics.record_stage(Stage::BuildFeatures, start.elapsed());

        let mut rejected = validated.rejected;
        rejected.extend(built.rejected);
        rejected.sort_by_key(|r| r.row);
        metrics.rows_rejected = rejected.len() as u64;
        for rejection in &rejected {
            warn!(
                run_id = %run_id,
                row = rejection.row,
                patient_id = %rejection.patient_id,
                error = %rejection.reason,
                "Row excluded from scoring"
            );
        }

        let column_order_guaranteed;
        let mut unseen_diagnoses = 0;
        let labels = if built.rows.is_empty() {
            warn!(run_id = %run_id, "No valid rows to score");
            column_order_guaranteed = self.artifacts.contract.is_some();
            Vec::new()
        } else {
            let start = Instant::now();
            let adapter = EncoderScalerAdapter::new(
                self.artifacts.diagnosis_encoder.as_ref(),
                self.artifacts.scaler.as_ref(),
                &self.preprocessing,
            )?;
            let encoded = adapter.transform(&built.rows)?;
            unseen_diagnoses = encoded.unseen_diagnoses;
            metrics.record_stage(Stage::EncodeScale, start.elapsed());

            let start = Instant::now();
            let aligned = ColumnAligner::new(self.artifacts.contract.as_ref()).align(encoded.frame);
            column_order_guaranteed = aligned.column_order_guaranteed;
            metrics.record_stage(Stage::Align, start.elapsed());

            let start = Instant::now();
            let scorer = Scorer::new(
                self.artifacts.classifier.as_ref(),
                self.artifacts.label_encoder.as_ref(),
                &self.labels,
            );
            let labels = scorer.score(&aligned.frame)?;
            metrics.record_stage(Stage::Score, start.elapsed());
            labels
        };

        metrics.unseen_diagnoses = unseen_diagnoses as u64;
        metrics.record_labels(&labels, &self.non_fraud_label);

        let predictions: Vec<PredictionResult> = built
            .rows
            .iter()
            .zip(labels)
            .map(|(features, label)| PredictionResult {
                row: features.row,
                patient_id: features.patient_id.clone(),
                label,
            })
            .collect();

        info!(
            run_id = %run_id,
            scored = predictions.len(),
            rejected = rejected.len(),
            fraud = metrics.fraud_count,
            column_order_guaranteed = column_order_guaranteed,
            "Scoring run complete"
        );

        Ok(ScoringRun {
            run_id,
            predictions,
            features: built.rows,
            rejected,
            column_order_guaranteed,
            unseen_diagnoses,
            metrics,
            non_fraud_label: self.non_fraud_label.clone(),
        })
    }
}
