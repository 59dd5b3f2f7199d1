//! Claims Fraud Detection Library
//!
//! Validates hospital claim uploads, turns them into model features with
//! fitted encoders and a scaler, and scores them with an ONNX classifier.
//! Scored uploads are archived and summarised in a SQLite result store.

pub mod analytics;
pub mod auth;
pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod schema;
pub mod store;
pub mod types;

pub use analytics::Analytics;
pub use auth::Authenticator;
pub use config::AppConfig;
pub use error::{PipelineError, RowRejection, StoreError};
pub use feature_extractor::FeatureExtractor;
pub use pipeline::{InferencePipeline, ScoringRun};
pub use schema::ClaimUpload;
pub use store::{Archive, ResultStore};
pub use types::{ClaimRecord, DatasetSummary, FeatureFrame, PredictionResult};
