//! Claim record data structures

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical gender domain the model was trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Match a raw value against the known aliases, ignoring case and
    /// surrounding whitespace.
    pub fn from_alias(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "m" | "male" | "man" => Some(Gender::Male),
            "f" | "female" | "woman" => Some(Gender::Female),
            _ => None,
        }
    }

    /// Canonical spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }

    /// Numeric encoding used at training time (Male = 1, Female = 0)
    pub fn code(&self) -> f32 {
        match self {
            Gender::Male => 1.0,
            Gender::Female => 0.0,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated inpatient billing entry
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimRecord {
    /// 1-based data row number in the upload
    pub row: usize,
    /// Patient identifier as submitted
    pub patient_id: String,
    /// Admission timestamp (midnight when only a date was given)
    pub admitted: NaiveDateTime,
    /// Discharge timestamp, never earlier than `admitted`
    pub discharged: NaiveDateTime,
    /// Age in years
    pub age: f64,
    /// Gender exactly as submitted
    pub gender: String,
    /// Diagnosis exactly as submitted
    pub diagnosis: String,
    /// Amount billed
    pub amount_billed: f64,
}

impl ClaimRecord {
    /// Length of stay in whole days
    pub fn stay_days(&self) -> i64 {
        (self.discharged - self.admitted).num_days()
    }
}
