//! Named numeric feature frame passed between pipeline stages

/// Row-major matrix with named, ordered columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureFrame {
    columns: Vec<String>,
    rows: Vec<Vec<f32>>,
}

impl FeatureFrame {
    /// Create an empty frame with the given columns.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; its length must match the column count.
    pub fn push_row(&mut self, row: Vec<f32>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row width mismatch");
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<f32>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Mutable access to one cell
    pub fn cell_mut(&mut self, row: usize, column: usize) -> Option<&mut f32> {
        self.rows.get_mut(row)?.get_mut(column)
    }

    /// Row-major flattening, the layout expected by tensor constructors
    pub fn to_flat(&self) -> Vec<f32> {
        self.rows.iter().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_access() {
        let mut frame = FeatureFrame::new(["Age", "Gender"]);
        frame.push_row(vec![45.0, 1.0]);
        frame.push_row(vec![30.0, 0.0]);

        assert_eq!(frame.row_count(), 2);
        assert_eq!(frame.column_index("Gender"), Some(1));
        assert_eq!(frame.column("Age"), Some(vec![45.0, 30.0]));
        assert_eq!(frame.column("Diagnosis"), None);
        assert_eq!(frame.to_flat(), vec![45.0, 1.0, 30.0, 0.0]);
    }

    #[test]
    fn test_cell_mut() {
        let mut frame = FeatureFrame::new(["Age"]);
        frame.push_row(vec![45.0]);
        *frame.cell_mut(0, 0).unwrap() = 0.5;
        assert_eq!(frame.rows()[0][0], 0.5);
        assert!(frame.cell_mut(1, 0).is_none());
    }
}
