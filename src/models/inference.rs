//! Classifier invocation and label decoding

use ort::session::Session;
use ort::value::Tensor;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::models::encoder::CategoricalEncoder;
use crate::types::frame::FeatureFrame;

/// Opaque trained model returning encoded class predictions, one per row.
pub trait Classifier: Send + Sync {
    fn predict(&self, features: &FeatureFrame) -> Result<Vec<i64>, PipelineError>;
}

/// Classifier backed by an ONNX Runtime session
pub struct OnnxClassifier {
    /// ONNX Runtime session (runs need exclusive access)
    session: Mutex<Session>,
    /// Input name for the feature matrix
    input_name: String,
    /// Output holding encoded labels, if the graph exposes one
    label_output: Option<String>,
    /// Output holding class probabilities, used when no label output exists
    probability_output: Option<String>,
}

impl OnnxClassifier {
    pub fn new(session: Session) -> Self {
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let label_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .map(|o| o.name.clone());

        let probability_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .map(|o| o.name.clone());

        debug!(
            input = %input_name,
            label_output = ?label_output,
            probability_output = ?probability_output,
            "ONNX classifier ready"
        );

        Self {
            session: Mutex::new(session),
            input_name,
            label_output,
            probability_output,
        }
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }
}

impl fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("input_name", &self.input_name)
            .field("label_output", &self.label_output)
            .field("probability_output", &self.probability_output)
            .finish_non_exhaustive()
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, features: &FeatureFrame) -> Result<Vec<i64>, PipelineError> {
        let rows = features.row_count();
        // Prepare input tensor - shape [rows, columns]
        let shape = vec![rows as i64, features.column_count() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_flat()))
            .map_err(|e| PipelineError::ModelInference(format!("failed to create input tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| PipelineError::ModelInference(format!("lock error: {}", e)))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_tensor])
            .map_err(|e| PipelineError::ModelInference(e.to_string()))?;

        if let Some(name) = &self.label_output {
            if let Some(output) = outputs.get(name.as_str()) {
                if let Ok((_, data)) = output.try_extract_tensor::<i64>() {
                    return Ok(data.to_vec());
                }
                warn!(output = %name, "Label output is not an int64 tensor, trying probabilities");
            }
        }

        let name = self.probability_output.as_deref().ok_or_else(|| {
            PipelineError::ModelInference("model exposes neither labels nor probabilities".to_string())
        })?;
        let output = outputs.get(name).ok_or_else(|| {
            PipelineError::ModelInference(format!("output '{}' missing from model results", name))
        })?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::ModelInference(format!("cannot read '{}': {}", name, e)))?;

        argmax_rows(data, rows)
    }
}

/// Pick the most probable class per row from a row-major probability matrix.
fn argmax_rows(data: &[f32], rows: usize) -> Result<Vec<i64>, PipelineError> {
    if rows == 0 || data.len() % rows != 0 || data.len() / rows == 0 {
        return Err(PipelineError::ModelInference(format!(
            "probability output of length {} does not split into {} rows",
            data.len(),
            rows
        )));
    }

    Ok(data
        .chunks(data.len() / rows)
        .map(|probs| {
            probs
                .iter()
                .enumerate()
                .fold((0usize, f32::MIN), |best, (idx, &p)| if p > best.1 { (idx, p) } else { best })
                .0 as i64
        })
        .collect())
}

/// Raw label -> display label lookup
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    renames: HashMap<String, String>,
}

impl LabelMap {
    pub fn new(renames: HashMap<String, String>) -> Self {
        Self { renames }
    }

    /// Display form of a raw label; unknown labels pass through.
    pub fn display(&self, raw: &str) -> String {
        self.renames
            .get(raw)
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }
}

/// Runs the classifier and turns its codes into display labels.
pub struct Scorer<'a> {
    classifier: &'a dyn Classifier,
    label_encoder: &'a dyn CategoricalEncoder,
    labels: &'a LabelMap,
}

impl<'a> Scorer<'a> {
    pub fn new(
        classifier: &'a dyn Classifier,
        label_encoder: &'a dyn CategoricalEncoder,
        labels: &'a LabelMap,
    ) -> Self {
        Self {
            classifier,
            label_encoder,
            labels,
        }
    }

    /// Score every row of an aligned frame, returning display labels in row order.
    pub fn score(&self, features: &FeatureFrame) -> Result<Vec<String>, PipelineError> {
        if features.is_empty() {
            return Ok(Vec::new());
        }

        let codes = self.classifier.predict(features)?;
        if codes.len() != features.row_count() {
            return Err(PipelineError::ModelInference(format!(
                "model returned {} predictions for {} rows",
                codes.len(),
                features.row_count()
            )));
        }

        codes
            .into_iter()
            .map(|code| {
                self.label_encoder
                    .decode(code)
                    .map(|raw| self.labels.display(raw))
                    .ok_or_else(|| {
                        PipelineError::ModelInference(format!(
                            "model produced class code {} outside the label vocabulary",
                            code
                        ))
                    })
            })
            .collect()
    }
}
