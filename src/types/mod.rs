//! Type definitions for the claims fraud pipeline

pub mod claim;
pub mod frame;
pub mod prediction;

pub use claim::{ClaimRecord, Gender};
pub use frame::FeatureFrame;
pub use prediction::{DatasetSummary, LabelBreakdown, PredictionResult};
