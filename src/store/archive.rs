//! On-disk copies of uploads and their predictions

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Writer};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::pipeline::ScoringRun;
use crate::schema::ClaimUpload;

/// Column appended to uploads in prediction files
pub const PREDICTION_COLUMN: &str = "Prediction";

/// Where an upload and its predictions were written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedPaths {
    pub data_path: String,
    pub predictions_path: String,
}

/// Writes uploads to `data_dir` and predictions to `results_dir`.
pub struct Archive {
    data_dir: PathBuf,
    results_dir: PathBuf,
}

impl Archive {
    pub fn new(data_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            results_dir: results_dir.into(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.data_dir, &config.results_dir)
    }

    /// Write `<hospital>_<timestamp>.csv` into both directories.
    pub fn store(
        &self,
        hospital_id: i64,
        uploaded_at: DateTime<Utc>,
        upload: &ClaimUpload,
        run: &ScoringRun,
    ) -> Result<ArchivedPaths, StoreError> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.results_dir)?;

        let file_name = format!("{}_{}.csv", hospital_id, uploaded_at.format("%Y%m%d%H%M%S"));
        let data_path = self.data_dir.join(&file_name);
        let predictions_path = self.results_dir.join(&file_name);

        fs::write(&data_path, upload.raw())?;
        write_predictions(upload, run, File::create(&predictions_path)?)?;

        info!(
            data_path = %data_path.display(),
            predictions_path = %predictions_path.display(),
            "Upload archived"
        );

        Ok(ArchivedPaths {
            data_path: data_path.to_string_lossy().into_owned(),
            predictions_path: predictions_path.to_string_lossy().into_owned(),
        })
    }
}

impl ArchivedPaths {
    /// Remove both archived files, e.g. when recording the upload failed.
    /// Files already gone are ignored.
    pub fn discard(&self) -> Result<(), StoreError> {
        for path in [&self.data_path, &self.predictions_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        warn!(
            data_path = %self.data_path,
            predictions_path = %self.predictions_path,
            "Archived upload discarded"
        );
        Ok(())
    }
}

/// Write the scored rows of an upload with a trailing prediction column.
/// Rejected rows are left out.
pub fn write_predictions<W: Write>(
    upload: &ClaimUpload,
    run: &ScoringRun,
    writer: W,
) -> Result<(), StoreError> {
    let mut writer = Writer::from_writer(writer);

    let mut header = upload.headers().clone();
    header.push_field(PREDICTION_COLUMN);
    writer.write_record(&header)?;

    for prediction in &run.predictions {
        let mut record = upload
            .record(prediction.row)
            .cloned()
            .unwrap_or_else(StringRecord::new);
        record.push_field(&prediction.label);
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// A predictions file read back for analytics
#[derive(Debug, Clone, Default)]
pub struct PredictionsFile {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    prediction_index: Option<usize>,
}

impl PredictionsFile {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|r| r.map(|record| record.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, csv::Error>>()?;
        let prediction_index = headers.iter().position(|h| h == PREDICTION_COLUMN);

        Ok(Self {
            headers,
            rows,
            prediction_index,
        })
    }

    /// Whether the file carries a prediction column at all
    pub fn has_predictions(&self) -> bool {
        self.prediction_index.is_some()
    }

    /// Prediction label of every row, empty without a prediction column
    pub fn labels(&self) -> Vec<&str> {
        match self.prediction_index {
            Some(idx) => self
                .rows
                .iter()
                .map(|r| r.get(idx).map(String::as_str).unwrap_or(""))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Rows whose label differs from `non_fraud_label`
    pub fn fraud_rows(&self, non_fraud_label: &str) -> Vec<&Vec<String>> {
        match self.prediction_index {
            Some(idx) => self
                .rows
                .iter()
                .filter(|r| r.get(idx).map(String::as_str) != Some(non_fraud_label))
                .collect(),
            None => Vec::new(),
        }
    }
}
