//! Upload parsing and schema validation.
//!
//! Checks the required column set, parses admission/discharge dates and
//! numeric fields, and splits rows into validated claims and rejections.

use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::config::PreprocessingConfig;
use crate::error::{PipelineError, RowRejection};
use crate::types::claim::ClaimRecord;

pub const PATIENT_ID: &str = "Patient ID";
pub const DATE_ADMITTED: &str = "Date Admitted";
pub const DATE_DISCHARGED: &str = "Date Discharged";
pub const AGE: &str = "Age";
pub const GENDER: &str = "Gender";
pub const DIAGNOSIS: &str = "Diagnosis";
pub const AMOUNT_BILLED: &str = "Amount Billed";

/// Columns every upload must carry, in reporting order
pub const REQUIRED_COLUMNS: [&str; 7] = [
    PATIENT_ID,
    DATE_ADMITTED,
    DATE_DISCHARGED,
    AGE,
    GENDER,
    DIAGNOSIS,
    AMOUNT_BILLED,
];

/// A parsed CSV upload, kept verbatim for archiving and output.
#[derive(Debug, Clone)]
pub struct ClaimUpload {
    raw: Vec<u8>,
    headers: StringRecord,
    records: Vec<StringRecord>,
}

impl ClaimUpload {
    /// Parse an upload held in memory.
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self, PipelineError> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .from_reader(raw.as_slice());

        let headers = reader.headers()?.clone();
        let records = reader
            .records()
            .collect::<Result<Vec<StringRecord>, csv::Error>>()?;

        debug!(
            columns = headers.len(),
            rows = records.len(),
            "Parsed claim upload"
        );

        Ok(Self {
            raw,
            headers,
            records,
        })
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, PipelineError> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        Self::from_bytes(raw)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        Self::from_bytes(std::fs::read(path)?)
    }

    /// The upload exactly as received
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    pub fn records(&self) -> &[StringRecord] {
        &self.records
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    /// Data record by 1-based row number
    pub fn record(&self, row: usize) -> Option<&StringRecord> {
        row.checked_sub(1).and_then(|idx| self.records.get(idx))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Result of validating an upload: scoreable claims and rejected rows.
#[derive(Debug, Default)]
pub struct ValidatedClaims {
    pub records: Vec<ClaimRecord>,
    pub rejected: Vec<RowRejection>,
}

/// Positions of the required columns in an upload
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    patient_id: usize,
    admitted: usize,
    discharged: usize,
    age: usize,
    gender: usize,
    diagnosis: usize,
    amount_billed: usize,
}

/// Validates uploads against the claim schema.
pub struct SchemaValidator<'a> {
    config: &'a PreprocessingConfig,
}

impl<'a> SchemaValidator<'a> {
    pub fn new(config: &'a PreprocessingConfig) -> Self {
        Self { config }
    }

    /// Fail with the first required column the upload lacks.
    pub fn check_columns(&self, upload: &ClaimUpload) -> Result<(), PipelineError> {
        self.column_map(upload).map(|_| ())
    }

    fn column_map(&self, upload: &ClaimUpload) -> Result<ColumnMap, PipelineError> {
        let find = |name: &str| {
            upload.column_index(name).ok_or_else(|| PipelineError::Schema {
                column: name.to_string(),
            })
        };

        Ok(ColumnMap {
            patient_id: find(PATIENT_ID)?,
            admitted: find(DATE_ADMITTED)?,
            discharged: find(DATE_DISCHARGED)?,
            age: find(AGE)?,
            gender: find(GENDER)?,
            diagnosis: find(DIAGNOSIS)?,
            amount_billed: find(AMOUNT_BILLED)?,
        })
    }

    /// Validate every row. Only a schema failure aborts; row problems are
    /// collected as rejections.
    pub fn validate(&self, upload: &ClaimUpload) -> Result<ValidatedClaims, PipelineError> {
        let columns = self.column_map(upload)?;
        let mut validated = ValidatedClaims::default();

        for (idx, record) in upload.records().iter().enumerate() {
            let row = idx + 1;
            match self.validate_row(row, record, &columns) {
                Ok(claim) => validated.records.push(claim),
                Err(reason) => {
                    debug!(row = row, error = %reason, "Row rejected");
                    validated.rejected.push(RowRejection {
                        row,
                        patient_id: field(record, columns.patient_id).to_string(),
                        reason,
                    });
                }
            }
        }

        info!(
            valid = validated.records.len(),
            rejected = validated.rejected.len(),
            "Schema validation complete"
        );

        Ok(validated)
    }

    fn validate_row(
        &self,
        row: usize,
        record: &StringRecord,
        columns: &ColumnMap,
    ) -> Result<ClaimRecord, PipelineError> {
        let admitted = self.parse_date_field(row, record, columns.admitted, DATE_ADMITTED)?;
        let discharged = self.parse_date_field(row, record, columns.discharged, DATE_DISCHARGED)?;

        if discharged < admitted {
            return Err(PipelineError::NegativeStay {
                row,
                admitted: field(record, columns.admitted).to_string(),
                discharged: field(record, columns.discharged).to_string(),
            });
        }

        Ok(ClaimRecord {
            row,
            patient_id: field(record, columns.patient_id).to_string(),
            admitted,
            discharged,
            age: parse_number(row, record, columns.age, AGE)?,
            gender: field(record, columns.gender).to_string(),
            diagnosis: field(record, columns.diagnosis).to_string(),
            amount_billed: parse_number(row, record, columns.amount_billed, AMOUNT_BILLED)?,
        })
    }

    fn parse_date_field(
        &self,
        row: usize,
        record: &StringRecord,
        idx: usize,
        column: &str,
    ) -> Result<NaiveDateTime, PipelineError> {
        let value = field(record, idx);
        parse_date(value, &self.config.date_format, &self.config.fallback_date_formats).ok_or_else(
            || PipelineError::Date {
                row,
                column: column.to_string(),
                value: value.to_string(),
            },
        )
    }
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("")
}

fn parse_number(
    row: usize,
    record: &StringRecord,
    idx: usize,
    column: &str,
) -> Result<f64, PipelineError> {
    let value = field(record, idx);
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| PipelineError::InvalidNumber {
            row,
            column: column.to_string(),
            value: value.to_string(),
        })
}

/// Parse a date or timestamp with the primary format, then each fallback.
/// Date-only values resolve to midnight.
pub fn parse_date(value: &str, primary: &str, fallbacks: &[String]) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    std::iter::once(primary)
        .chain(fallbacks.iter().map(String::as_str))
        .find_map(|format| {
            NaiveDateTime::parse_from_str(value, format).ok().or_else(|| {
                NaiveDate::parse_from_str(value, format)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "Patient ID,Date Admitted,Date Discharged,Age,Gender,Diagnosis,Amount Billed\n";

    fn upload(body: &str) -> ClaimUpload {
        ClaimUpload::from_bytes(format!("{}{}", HEADER, body).into_bytes()).unwrap()
    }

    #[test]
    fn test_missing_column_names_first_absent() {
        let config = PreprocessingConfig::default();
        let upload = ClaimUpload::from_bytes(
            b"Patient ID,Date Admitted,Age,Diagnosis\nP001,2025-08-01,45,Malaria\n".to_vec(),
        )
        .unwrap();

        let err = SchemaValidator::new(&config).validate(&upload).unwrap_err();
        match err {
            PipelineError::Schema { column } => assert_eq!(column, DATE_DISCHARGED),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_columns_in_any_order() {
        let config = PreprocessingConfig::default();
        let upload = ClaimUpload::from_bytes(
            b"Amount Billed,Diagnosis,Gender,Age,Date Discharged,Date Admitted,Patient ID,Ward\n\
              50000,Malaria,Male,45,2025-08-05,2025-08-01,P001,B2\n"
                .to_vec(),
        )
        .unwrap();

        let validated = SchemaValidator::new(&config).validate(&upload).unwrap();
        assert_eq!(validated.records.len(), 1);
        let claim = &validated.records[0];
        assert_eq!(claim.patient_id, "P001");
        assert_eq!(claim.stay_days(), 4);
        assert_eq!(claim.amount_billed, 50000.0);
    }

    #[test]
    fn test_negative_stay_rejected_siblings_kept() {
        let config = PreprocessingConfig::default();
        let upload = upload(
            "P001,2025-08-01,2025-08-05,45,Male,Malaria,50000\n\
             P002,2025-08-10,2025-08-04,30,Female,Typhoid,35000\n",
        );

        let validated = SchemaValidator::new(&config).validate(&upload).unwrap();
        assert_eq!(validated.records.len(), 1);
        assert_eq!(validated.rejected.len(), 1);
        let rejection = &validated.rejected[0];
        assert_eq!(rejection.row, 2);
        assert_eq!(rejection.patient_id, "P002");
        assert!(matches!(rejection.reason, PipelineError::NegativeStay { row: 2, .. }));
    }

    #[test]
    fn test_unparseable_date_is_row_scoped() {
        let config = PreprocessingConfig::default();
        let upload = upload("P001,sometime,2025-08-05,45,Male,Malaria,50000\n");

        let validated = SchemaValidator::new(&config).validate(&upload).unwrap();
        assert!(validated.records.is_empty());
        match &validated.rejected[0].reason {
            PipelineError::Date { row, column, value } => {
                assert_eq!(*row, 1);
                assert_eq!(column, DATE_ADMITTED);
                assert_eq!(value, "sometime");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_number_is_row_scoped() {
        let config = PreprocessingConfig::default();
        let upload = upload("P001,2025-08-01,2025-08-05,forty,Male,Malaria,50000\n");

        let validated = SchemaValidator::new(&config).validate(&upload).unwrap();
        assert!(matches!(
            validated.rejected[0].reason,
            PipelineError::InvalidNumber { ref column, .. } if column == AGE
        ));
    }

    #[test]
    fn test_fallback_date_formats() {
        let config = PreprocessingConfig::default();
        let primary = &config.date_format;
        let fallbacks = &config.fallback_date_formats;

        let iso = parse_date("2025-08-01", primary, fallbacks).unwrap();
        assert_eq!(parse_date("01/08/2025", primary, fallbacks), Some(iso));
        assert_eq!(parse_date("2025/08/01", primary, fallbacks), Some(iso));
        assert_eq!(parse_date("01 Aug 2025", primary, fallbacks), Some(iso));
        assert!(parse_date("2025-08-01 10:30:00", primary, fallbacks).is_some());
        assert_eq!(parse_date("", primary, fallbacks), None);
        assert_eq!(parse_date("13/13/2025", primary, fallbacks), None);
    }

    #[test]
    fn test_ragged_rows_abort() {
        let raw = format!("{}P001,2025-08-01\n", HEADER);
        assert!(matches!(
            ClaimUpload::from_bytes(raw.into_bytes()),
            Err(PipelineError::Csv(_))
        ));
    }

    #[test]
    fn test_record_lookup_by_row_number() {
        let upload = upload("P001,2025-08-01,2025-08-05,45,Male,Malaria,50000\n");
        assert_eq!(upload.record(1).and_then(|r| r.get(0)), Some("P001"));
        assert!(upload.record(0).is_none());
        assert!(upload.record(2).is_none());
    }
}
