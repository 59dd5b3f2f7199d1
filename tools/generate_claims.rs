//! Synthetic Claims Generator
//!
//! Writes a claims CSV for exercising the scoring pipeline. Most rows are
//! ordinary admissions, some look suspicious, and an optional share is
//! deliberately broken so row rejection can be seen end to end.

use anyhow::{bail, Context};
use chrono::{Duration, NaiveDate};
use rand::Rng;
use tracing::info;

const DIAGNOSES: &[&str] = &[
    "Malaria",
    "Typhoid",
    "Hypertension",
    "Diabetes",
    "Pneumonia",
    "Gastroenteritis",
    "Anaemia",
];

/// One row of the generated upload
struct Claim {
    patient_id: String,
    admitted: NaiveDate,
    discharged: NaiveDate,
    age: u32,
    gender: &'static str,
    diagnosis: String,
    amount_billed: f64,
}

/// Claim generator for testing
struct ClaimGenerator {
    rng: rand::rngs::ThreadRng,
    claim_counter: u64,
    base_date: NaiveDate,
}

impl ClaimGenerator {
    fn new(base_date: NaiveDate) -> Self {
        Self {
            rng: rand::thread_rng(),
            claim_counter: 0,
            base_date,
        }
    }

    fn next_id(&mut self) -> String {
        self.claim_counter += 1;
        format!("P{:05}", self.claim_counter)
    }

    fn admission(&mut self) -> NaiveDate {
        self.base_date + Duration::days(self.rng.gen_range(0..90))
    }

    /// Generate an ordinary admission
    fn generate_legitimate(&mut self) -> Claim {
        let admitted = self.admission();
        Claim {
            patient_id: self.next_id(),
            admitted,
            discharged: admitted + Duration::days(self.rng.gen_range(0..7)),
            age: self.rng.gen_range(1..90),
            gender: self.random_choice(&["Male", "Female", "M", "F"]),
            diagnosis: self.random_choice(DIAGNOSES).to_string(),
            amount_billed: self.rng.gen_range(5_000.0..60_000.0_f64).round(),
        }
    }

    /// Generate a claim with an inflated bill or an implausible stay
    fn generate_suspicious(&mut self) -> Claim {
        let admitted = self.admission();
        Claim {
            patient_id: self.next_id(),
            admitted,
            discharged: admitted + Duration::days(self.rng.gen_range(15..60)), // Long stay
            age: self.rng.gen_range(18..70),
            gender: self.random_choice(&["Male", "Female"]),
            diagnosis: self.random_choice(&["Malaria", "Typhoid"]).to_string(), // Routine diagnosis
            amount_billed: self.rng.gen_range(150_000.0..900_000.0_f64).round(), // High bill
        }
    }

    /// Generate a row the pipeline should reject or treat as unseen
    fn generate_invalid(&mut self) -> Claim {
        let mut claim = self.generate_legitimate();
        match self.rng.gen_range(0..3) {
            // Discharged before admission
            0 => claim.discharged = claim.admitted - Duration::days(self.rng.gen_range(1..5)),
            1 => claim.gender = "Unknown",
            _ => claim.diagnosis = "Rare Tropical Fever".to_string(),
        }
        claim
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

/// Parse a probability argument, which must lie in [0, 1].
fn parse_rate(arg: Option<&String>, name: &str, default: f64) -> anyhow::Result<f64> {
    let Some(raw) = arg else {
        return Ok(default);
    };
    let rate: f64 = raw
        .parse()
        .with_context(|| format!("{} '{}' is not a number", name, raw))?;
    if !(0.0..=1.0).contains(&rate) {
        bail!("{} must be between 0 and 1, got {}", name, rate);
    }
    Ok(rate)
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_claims=info".parse()?),
        )
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let output = args.get(1).map(|s| s.as_str()).unwrap_or("claims.csv");
    let count: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);
    let fraud_rate = parse_rate(args.get(3), "fraud rate", 0.1)?;
    let invalid_rate = parse_rate(args.get(4), "invalid rate", 0.02)?;

    info!(
        output = %output,
        count = count,
        fraud_rate = fraud_rate,
        invalid_rate = invalid_rate,
        "Configuration loaded"
    );

    let base_date = NaiveDate::from_ymd_opt(2025, 1, 1).context("invalid base date")?;
    let mut generator = ClaimGenerator::new(base_date);
    let mut rng = rand::thread_rng();
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output))?;

    writer.write_record([
        "Patient ID",
        "Date Admitted",
        "Date Discharged",
        "Age",
        "Gender",
        "Diagnosis",
        "Amount Billed",
    ])?;

    let mut legitimate_count = 0;
    let mut suspicious_count = 0;
    let mut invalid_count = 0;

    for _ in 0..count {
        let claim = if rng.gen_bool(invalid_rate) {
            invalid_count += 1;
            generator.generate_invalid()
        } else if rng.gen_bool(fraud_rate) {
            suspicious_count += 1;
            generator.generate_suspicious()
        } else {
            legitimate_count += 1;
            generator.generate_legitimate()
        };

        writer.write_record([
            claim.patient_id,
            claim.admitted.format("%Y-%m-%d").to_string(),
            claim.discharged.format("%Y-%m-%d").to_string(),
            claim.age.to_string(),
            claim.gender.to_string(),
            claim.diagnosis,
            format!("{:.0}", claim.amount_billed),
        ])?;
    }
    writer.flush()?;

    info!(
        "Completed! Wrote {} claims to {} ({} legitimate, {} suspicious, {} invalid)",
        count, output, legitimate_count, suspicious_count, invalid_count
    );

    Ok(())
}
