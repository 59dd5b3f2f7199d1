//! Column alignment against the model's feature contract

use tracing::{debug, warn};

use crate::types::frame::FeatureFrame;

/// Ordered column names the classifier was fit on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureContract {
    columns: Vec<String>,
}

impl FeatureContract {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Frame ready for the classifier
#[derive(Debug, Clone)]
pub struct AlignedFrame {
    pub frame: FeatureFrame,
    /// False when no contract was available and the frame passed through as-is
    pub column_order_guaranteed: bool,
}

/// Reorders, zero-pads and drops columns to match a feature contract.
pub struct ColumnAligner<'a> {
    contract: Option<&'a FeatureContract>,
}

impl<'a> ColumnAligner<'a> {
    pub fn new(contract: Option<&'a FeatureContract>) -> Self {
        Self { contract }
    }

    /// Align a transformed frame.
    ///
    /// With a contract the output has exactly the contract's columns in
    /// order: missing ones are zero-filled, extra ones dropped. Without one
    /// the frame is returned unchanged and flagged as degraded.
    pub fn align(&self, frame: FeatureFrame) -> AlignedFrame {
        let Some(contract) = self.contract else {
            warn!(
                columns = ?frame.columns(),
                "No feature contract loaded, scoring columns in pipeline order"
            );
            return AlignedFrame {
                frame,
                column_order_guaranteed: false,
            };
        };

        let sources: Vec<Option<usize>> = contract
            .columns()
            .iter()
            .map(|name| frame.column_index(name))
            .collect();

        let padded: Vec<&str> = contract
            .columns()
            .iter()
            .zip(&sources)
            .filter(|(_, src)| src.is_none())
            .map(|(name, _)| name.as_str())
            .collect();
        let dropped: Vec<&str> = frame
            .columns()
            .iter()
            .filter(|c| !contract.columns().contains(*c))
            .map(String::as_str)
            .collect();

        if !padded.is_empty() || !dropped.is_empty() {
            debug!(padded = ?padded, dropped = ?dropped, "Aligned frame to feature contract");
        }

        let mut aligned = FeatureFrame::new(contract.columns().iter().cloned());
        for row in frame.rows() {
            aligned.push_row(
                sources
                    .iter()
                    .map(|src| src.map(|idx| row[idx]).unwrap_or(0.0))
                    .collect(),
            );
        }

        AlignedFrame {
            frame: aligned,
            column_order_guaranteed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FeatureFrame {
        let mut frame = FeatureFrame::new(["Age", "Gender", "Diagnosis", "Extra"]);
        frame.push_row(vec![0.5, 1.0, 2.0, 9.0]);
        frame.push_row(vec![-0.5, 0.0, 1.0, 9.0]);
        frame
    }

    fn contract(columns: &[&str]) -> FeatureContract {
        FeatureContract::new(columns.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn test_output_matches_contract_exactly() {
        let contract = contract(&["Diagnosis", "Length of Stay", "Age", "Gender"]);
        let aligned = ColumnAligner::new(Some(&contract)).align(frame());

        assert!(aligned.column_order_guaranteed);
        assert_eq!(aligned.frame.columns(), contract.columns());
        assert_eq!(aligned.frame.rows()[0], vec![2.0, 0.0, 0.5, 1.0]);
        assert_eq!(aligned.frame.rows()[1], vec![1.0, 0.0, -0.5, 0.0]);
    }

    #[test]
    fn test_contract_with_no_overlap() {
        let contract = contract(&["A", "B"]);
        let aligned = ColumnAligner::new(Some(&contract)).align(frame());

        assert_eq!(aligned.frame.columns(), contract.columns());
        assert!(aligned.frame.rows().iter().all(|r| r == &vec![0.0, 0.0]));
        assert_eq!(aligned.frame.row_count(), 2);
    }

    #[test]
    fn test_missing_contract_is_degraded_passthrough() {
        let original = frame();
        let aligned = ColumnAligner::new(None).align(original.clone());

        assert!(!aligned.column_order_guaranteed);
        assert_eq!(aligned.frame, original);
    }
}
