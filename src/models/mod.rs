//! Model artifacts and the inference stages that use them

pub mod aligner;
pub mod encoder;
pub mod inference;
pub mod loader;

pub use aligner::{AlignedFrame, ColumnAligner, FeatureContract};
pub use encoder::{CategoricalEncoder, EncoderScalerAdapter, FeatureScaler, LabelEncoder, StandardScaler};
pub use inference::{Classifier, LabelMap, OnnxClassifier, Scorer};
pub use loader::{ArtifactLoader, ArtifactSet};
