//! Per-hospital and national views over stored predictions.
//!
//! Hospitals see only their own uploads; national figures and the
//! cross-hospital case list are restricted to administrators.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{Dataset, Hospital, HospitalOverview, PredictionsFile, ResultStore};
use crate::types::prediction::{DatasetSummary, LabelBreakdown};

/// A dataset with its stored summary
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub dataset: Dataset,
    pub summary: Option<DatasetSummary>,
}

/// Summary and label breakdown of one dataset
#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub dataset: Dataset,
    pub summary: Option<DatasetSummary>,
    /// `None` when the predictions file is gone
    pub breakdown: Option<LabelBreakdown>,
}

/// Totals across every stored predictions file
#[derive(Debug, Clone, Default, Serialize)]
pub struct NationalOverview {
    pub total_cases: u64,
    pub fraud_cases: u64,
    pub non_fraud_cases: u64,
    pub breakdown: LabelBreakdown,
    pub files_read: usize,
    pub files_missing: usize,
}

/// One row labelled as fraud, with where it came from
#[derive(Debug, Clone, Serialize)]
pub struct FraudCase {
    pub hospital_id: i64,
    pub dataset_id: i64,
    pub fields: BTreeMap<String, String>,
}

/// Read-only reporting over the result store
pub struct Analytics<'a> {
    store: &'a ResultStore,
    non_fraud_label: String,
}

impl<'a> Analytics<'a> {
    pub fn new(store: &'a ResultStore, non_fraud_label: impl Into<String>) -> Self {
        Self {
            store,
            non_fraud_label: non_fraud_label.into(),
        }
    }

    fn require_admin(&self, viewer: &Hospital, resource: &str) -> Result<(), StoreError> {
        if viewer.is_admin {
            Ok(())
        } else {
            Err(StoreError::AccessDenied {
                viewer: viewer.name.clone(),
                resource: resource.to_string(),
            })
        }
    }

    /// The viewer's own uploads, oldest first
    pub fn hospital_history(&self, viewer: &Hospital) -> Result<Vec<HistoryEntry>, StoreError> {
        self.store
            .datasets_for_hospital(viewer.id)?
            .into_iter()
            .map(|dataset| {
                let summary = self.store.summary_for_dataset(dataset.id)?;
                Ok(HistoryEntry { dataset, summary })
            })
            .collect()
    }

    /// Summary and label breakdown of one dataset the viewer may see.
    pub fn dataset_report(
        &self,
        viewer: &Hospital,
        dataset_id: i64,
    ) -> Result<DatasetReport, StoreError> {
        let dataset = self
            .store
            .dataset(dataset_id)?
            .ok_or_else(|| StoreError::NotFound(format!("dataset #{}", dataset_id)))?;

        if dataset.hospital_id != viewer.id && !viewer.is_admin {
            return Err(StoreError::AccessDenied {
                viewer: viewer.name.clone(),
                resource: format!("dataset #{}", dataset_id),
            });
        }

        let summary = self.store.summary_for_dataset(dataset_id)?;
        let breakdown = read_if_present(&dataset.predictions_path)?
            .map(|file| LabelBreakdown::from_labels(file.labels()));

        Ok(DatasetReport {
            dataset,
            summary,
            breakdown,
        })
    }

    /// Totals and label breakdown over every hospital's predictions.
    pub fn national_overview(&self, viewer: &Hospital) -> Result<NationalOverview, StoreError> {
        self.require_admin(viewer, "national analytics")?;

        let mut overview = NationalOverview::default();
        let mut labels: Vec<String> = Vec::new();

        for dataset in self.store.all_datasets()? {
            match read_if_present(&dataset.predictions_path)? {
                Some(file) => {
                    overview.files_read += 1;
                    labels.extend(file.labels().into_iter().map(str::to_string));
                }
                None => overview.files_missing += 1,
            }
        }

        overview.breakdown = LabelBreakdown::from_labels(labels.iter().map(String::as_str));
        overview.total_cases = overview.breakdown.total();
        overview.fraud_cases = overview.breakdown.fraud_count(&self.non_fraud_label);
        overview.non_fraud_cases = overview.total_cases - overview.fraud_cases;

        debug!(
            files = overview.files_read,
            missing = overview.files_missing,
            total = overview.total_cases,
            "National overview computed"
        );
        Ok(overview)
    }

    /// Every fraud-labelled row across all hospitals.
    pub fn fraud_cases(&self, viewer: &Hospital) -> Result<Vec<FraudCase>, StoreError> {
        self.require_admin(viewer, "cross-hospital fraud cases")?;

        let mut cases = Vec::new();
        for dataset in self.store.all_datasets()? {
            let Some(file) = read_if_present(&dataset.predictions_path)? else {
                continue;
            };
            for row in file.fraud_rows(&self.non_fraud_label) {
                cases.push(FraudCase {
                    hospital_id: dataset.hospital_id,
                    dataset_id: dataset.id,
                    fields: file.headers.iter().cloned().zip(row.iter().cloned()).collect(),
                });
            }
        }
        Ok(cases)
    }

    /// Registered hospitals with upload counts
    pub fn hospitals(&self, viewer: &Hospital) -> Result<Vec<HospitalOverview>, StoreError> {
        self.require_admin(viewer, "hospital listing")?;
        self.store.list_hospitals()
    }
}

fn read_if_present(path: &str) -> Result<Option<PredictionsFile>, StoreError> {
    if path.is_empty() || !Path::new(path).exists() {
        warn!(path = %path, "Predictions file not found");
        return Ok(None);
    }
    PredictionsFile::read(path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ArchivedPaths;
    use chrono::Utc;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: ResultStore,
        admin: Hospital,
        a: Hospital,
        b: Hospital,
        a_dataset: i64,
    }

    fn hospital(store: &ResultStore, name: &str, is_admin: bool) -> Hospital {
        let id = store.insert_hospital(name, "hash", is_admin).unwrap();
        store.hospital_by_id(id).unwrap().unwrap()
    }

    fn upload(store: &ResultStore, dir: &Path, owner: &Hospital, tag: &str, labels: &[&str]) -> i64 {
        let path = dir.join(format!("{}.csv", tag));
        let mut body = String::from("Patient ID,Prediction\n");
        for (i, label) in labels.iter().enumerate() {
            body.push_str(&format!("{}{},{}\n", tag, i, label));
        }
        fs::write(&path, body).unwrap();

        let fraud = labels.iter().filter(|l| **l != "No Fraud").count() as u64;
        let summary = DatasetSummary {
            hospital_id: owner.id,
            uploaded_at: Utc::now(),
            total_cases: labels.len() as u64,
            fraud_count: fraud,
            non_fraud_count: labels.len() as u64 - fraud,
            rejected_count: 0,
        };
        store
            .record_upload(
                &summary,
                &ArchivedPaths {
                    data_path: String::new(),
                    predictions_path: path.to_string_lossy().into_owned(),
                },
            )
            .unwrap()
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open_in_memory().unwrap();
        let admin = hospital(&store, "admin", true);
        let a = hospital(&store, "A", false);
        let b = hospital(&store, "B", false);

        let a_dataset = upload(&store, dir.path(), &a, "a", &["No Fraud", "Upcoding", "No Fraud"]);
        upload(&store, dir.path(), &b, "b", &["Upcoding", "Phantom Billing"]);

        Fixture {
            _dir: dir,
            store,
            admin,
            a,
            b,
            a_dataset,
        }
    }

    #[test]
    fn test_hospital_history_is_scoped() {
        let f = fixture();
        let analytics = Analytics::new(&f.store, "No Fraud");

        let history = analytics.hospital_history(&f.a).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].summary.as_ref().unwrap().fraud_count, 1);
        assert!(analytics.hospital_history(&f.admin).unwrap().is_empty());
    }

    #[test]
    fn test_dataset_report_access() {
        let f = fixture();
        let analytics = Analytics::new(&f.store, "No Fraud");

        let report = analytics.dataset_report(&f.a, f.a_dataset).unwrap();
        let breakdown = report.breakdown.unwrap();
        assert_eq!(breakdown.counts[0], ("No Fraud".to_string(), 2));

        assert!(matches!(
            analytics.dataset_report(&f.b, f.a_dataset),
            Err(StoreError::AccessDenied { .. })
        ));
        assert!(analytics.dataset_report(&f.admin, f.a_dataset).is_ok());
        assert!(matches!(
            analytics.dataset_report(&f.a, 999),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_national_overview() {
        let f = fixture();
        let analytics = Analytics::new(&f.store, "No Fraud");

        let overview = analytics.national_overview(&f.admin).unwrap();
        assert_eq!(overview.total_cases, 5);
        assert_eq!(overview.fraud_cases, 3);
        assert_eq!(overview.non_fraud_cases, 2);
        assert_eq!(overview.files_read, 2);
        assert!(overview
            .breakdown
            .counts
            .contains(&("Upcoding".to_string(), 2)));
        assert_eq!(
            overview.breakdown.counts.last(),
            Some(&("Phantom Billing".to_string(), 1))
        );

        assert!(matches!(
            analytics.national_overview(&f.a),
            Err(StoreError::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_fraud_cases_across_hospitals() {
        let f = fixture();
        let analytics = Analytics::new(&f.store, "No Fraud");

        let cases = analytics.fraud_cases(&f.admin).unwrap();
        assert_eq!(cases.len(), 3);
        assert!(cases.iter().all(|c| c.fields["Prediction"] != "No Fraud"));
        assert_eq!(cases.iter().filter(|c| c.hospital_id == f.b.id).count(), 2);
        assert!(analytics.fraud_cases(&f.b).is_err());
    }

    #[test]
    fn test_missing_file_counted() {
        let f = fixture();
        let summary = DatasetSummary {
            hospital_id: f.a.id,
            uploaded_at: Utc::now(),
            total_cases: 1,
            fraud_count: 0,
            non_fraud_count: 1,
            rejected_count: 0,
        };
        let gone = f
            .store
            .record_upload(
                &summary,
                &ArchivedPaths {
                    data_path: String::new(),
                    predictions_path: "results/deleted.csv".to_string(),
                },
            )
            .unwrap();
        let analytics = Analytics::new(&f.store, "No Fraud");

        assert_eq!(analytics.national_overview(&f.admin).unwrap().files_missing, 1);
        assert!(analytics.dataset_report(&f.a, gone).unwrap().breakdown.is_none());
    }
}
