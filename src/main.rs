//! Claims Fraud Detection - Command Line Entry Point
//!
//! Hospital account management, scoring of claim uploads and the
//! per-hospital and national reports built on stored results.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use claims_fraud_detection::{
    analytics::Analytics,
    auth::Authenticator,
    config::{AppConfig, LoggingConfig},
    pipeline::{InferencePipeline, ScoringRun},
    schema::ClaimUpload,
    store::{archive::write_predictions, Archive, Hospital, ResultStore},
};
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "claims-fraud", version, about = "Score hospital claims for fraud")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "config/config.toml")]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Login of the hospital running the command
#[derive(Args)]
struct Credentials {
    /// Registered hospital name
    #[arg(long)]
    hospital: String,

    #[arg(long, env = "CLAIMS_FRAUD_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand)]
enum Command {
    /// Register a new hospital
    Register {
        #[arg(long)]
        name: String,
        #[arg(long, env = "CLAIMS_FRAUD_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
    },
    /// Create an administrator (admin only)
    AddAdmin {
        #[command(flatten)]
        login: Credentials,
        #[arg(long)]
        name: String,
        #[arg(long, env = "CLAIMS_FRAUD_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
    },
    /// Change the password of the logged-in hospital
    ChangePassword {
        #[command(flatten)]
        login: Credentials,
        #[arg(long, env = "CLAIMS_FRAUD_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
        #[arg(long)]
        confirm: String,
    },
    /// Score a claims CSV and store the results
    Score {
        #[command(flatten)]
        login: Credentials,
        /// Claims CSV to score
        #[arg(long)]
        input: PathBuf,
        /// Also write the predictions CSV here
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the logged-in hospital's uploads
    History {
        #[command(flatten)]
        login: Credentials,
    },
    /// Show one dataset's summary and label breakdown
    Report {
        #[command(flatten)]
        login: Credentials,
        #[arg(long)]
        id: i64,
    },
    /// List registered hospitals (admin only)
    Hospitals {
        #[command(flatten)]
        login: Credentials,
    },
    /// National totals across all hospitals (admin only)
    National {
        #[command(flatten)]
        login: Credentials,
    },
    /// Every fraud-labelled claim across hospitals (admin only)
    FraudCases {
        #[command(flatten)]
        login: Credentials,
    },
    /// Delete all hospitals, datasets and summaries (admin only)
    Purge {
        #[command(flatten)]
        login: Credentials,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        AppConfig::load_from_path(&cli.config)
            .with_context(|| format!("Failed to load {}", cli.config.display()))?
    } else {
        AppConfig::default()
    };
    init_tracing(&config.logging)?;
    if !cli.config.exists() {
        warn!(path = %cli.config.display(), "Configuration file not found, using defaults");
    }

    let store = ResultStore::open(&config.store).context("Failed to open result store")?;
    let auth = Authenticator::new(&store);
    auth.ensure_default_admin(
        &config.store.default_admin_name,
        &config.store.default_admin_password,
    )?;
    let analytics = Analytics::new(&store, config.labels.non_fraud_label.clone());

    match cli.command {
        Command::Register { name, new_password } => {
            let hospital = auth.register(&name, &new_password)?;
            emit(cli.json, &json!({ "id": hospital.id, "name": hospital.name }), || {
                println!("Registered hospital '{}' (#{})", hospital.name, hospital.id);
            })?;
        }
        Command::AddAdmin {
            login,
            name,
            new_password,
        } => {
            require_admin(&auth.login(&login.hospital, &login.password)?)?;
            let admin = auth.add_admin(&name, &new_password)?;
            emit(cli.json, &json!({ "id": admin.id, "name": admin.name }), || {
                println!("Administrator '{}' created (#{})", admin.name, admin.id);
            })?;
        }
        Command::ChangePassword {
            login,
            new_password,
            confirm,
        } => {
            let hospital = auth.login(&login.hospital, &login.password)?;
            auth.change_password(&hospital, &login.password, &new_password, &confirm)?;
            emit(cli.json, &json!({ "updated": true }), || {
                println!("Password updated for '{}'", hospital.name);
            })?;
        }
        Command::Score {
            login,
            input,
            output,
        } => {
            let hospital = auth.login(&login.hospital, &login.password)?;
            score(&config, &store, &hospital, input, output, cli.json)?;
        }
        Command::History { login } => {
            let hospital = auth.login(&login.hospital, &login.password)?;
            let history = analytics.hospital_history(&hospital)?;
            emit(cli.json, &history, || {
                if history.is_empty() {
                    println!("No uploads yet");
                }
                for entry in &history {
                    let d = &entry.dataset;
                    match &entry.summary {
                        Some(s) => println!(
                            "#{:<5} {}  total {:>6}  fraud {:>6} ({:.1}%)  rejected {:>4}",
                            d.id,
                            d.uploaded_at.format("%Y-%m-%d %H:%M:%S"),
                            s.total_cases,
                            s.fraud_count,
                            s.fraud_rate(),
                            s.rejected_count
                        ),
                        None => println!(
                            "#{:<5} {}  (no summary)",
                            d.id,
                            d.uploaded_at.format("%Y-%m-%d %H:%M:%S")
                        ),
                    }
                }
            })?;
        }
        Command::Report { login, id } => {
            let hospital = auth.login(&login.hospital, &login.password)?;
            let report = analytics.dataset_report(&hospital, id)?;
            emit(cli.json, &report, || {
                println!("Dataset #{} uploaded {}", report.dataset.id, report.dataset.uploaded_at);
                if let Some(s) = &report.summary {
                    println!(
                        "  Total {}  Fraud {}  Non-fraud {}  Rejected {}",
                        s.total_cases, s.fraud_count, s.non_fraud_count, s.rejected_count
                    );
                }
                match &report.breakdown {
                    Some(breakdown) => {
                        for (label, count) in &breakdown.counts {
                            println!("  {:24} {:>6}", label, count);
                        }
                    }
                    None => println!("  Predictions file missing: {}", report.dataset.predictions_path),
                }
            })?;
        }
        Command::Hospitals { login } => {
            let viewer = auth.login(&login.hospital, &login.password)?;
            let hospitals = analytics.hospitals(&viewer)?;
            emit(cli.json, &hospitals, || {
                for h in &hospitals {
                    println!(
                        "#{:<5} {:30} {}  uploads {:>4}{}",
                        h.id,
                        h.name,
                        h.registered_at.format("%Y-%m-%d"),
                        h.dataset_count,
                        if h.is_admin { "  [admin]" } else { "" }
                    );
                }
            })?;
        }
        Command::National { login } => {
            let viewer = auth.login(&login.hospital, &login.password)?;
            let overview = analytics.national_overview(&viewer)?;
            emit(cli.json, &overview, || {
                println!(
                    "Total cases {}  Fraud {}  Non-fraud {}",
                    overview.total_cases, overview.fraud_cases, overview.non_fraud_cases
                );
                for (label, count) in &overview.breakdown.counts {
                    println!("  {:24} {:>8}", label, count);
                }
                if overview.files_missing > 0 {
                    println!("  ({} predictions files missing)", overview.files_missing);
                }
            })?;
        }
        Command::FraudCases { login } => {
            let viewer = auth.login(&login.hospital, &login.password)?;
            let cases = analytics.fraud_cases(&viewer)?;
            emit(cli.json, &cases, || {
                for case in &cases {
                    let field = |name: &str| case.fields.get(name).map(String::as_str).unwrap_or("");
                    println!(
                        "hospital #{:<4} dataset #{:<5} {:12} {:20} {}",
                        case.hospital_id,
                        case.dataset_id,
                        field("Patient ID"),
                        field("Diagnosis"),
                        field("Prediction")
                    );
                }
                println!("{} fraud cases", cases.len());
            })?;
        }
        Command::Purge { login, yes } => {
            require_admin(&auth.login(&login.hospital, &login.password)?)?;
            if !yes {
                bail!("refusing to purge without --yes");
            }
            store.purge()?;
            emit(cli.json, &json!({ "purged": true }), || {
                println!("Result store emptied");
            })?;
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("claims_fraud_detection={}", logging.level).parse()?)
        .add_directive(format!("claims_fraud={}", logging.level).parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

fn require_admin(hospital: &Hospital) -> Result<()> {
    if !hospital.is_admin {
        bail!("'{}' is not an administrator", hospital.name);
    }
    Ok(())
}

/// Print `value` as JSON, or run the human-readable printer.
fn emit<T: Serialize>(as_json: bool, value: &T, human: impl FnOnce()) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human();
    }
    Ok(())
}

fn score(
    config: &AppConfig,
    store: &ResultStore,
    hospital: &Hospital,
    input: PathBuf,
    output: Option<PathBuf>,
    as_json: bool,
) -> Result<()> {
    let pipeline = InferencePipeline::from_config(config).context("Failed to load model artifacts")?;
    let upload = ClaimUpload::from_path(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    info!(hospital = %hospital.name, input = %input.display(), rows = upload.row_count(), "Scoring upload");

    let run = pipeline.run(&upload)?;
    if !run.column_order_guaranteed {
        warn!("Feature contract unavailable, column order not guaranteed");
    }

    let uploaded_at = Utc::now();
    let paths = Archive::from_config(&config.store).store(hospital.id, uploaded_at, &upload, &run)?;
    let summary = run.summary(hospital.id, uploaded_at);
    let dataset_id = match store.record_upload(&summary, &paths) {
        Ok(id) => id,
        Err(e) => {
            if let Err(cleanup) = paths.discard() {
                warn!(error = %cleanup, "Failed to remove archived files");
            }
            return Err(e).context("Failed to record upload");
        }
    };

    if let Some(output) = &output {
        write_predictions(&upload, &run, File::create(output)?)?;
        info!(path = %output.display(), "Predictions written");
    }

    let report = json!({
        "run_id": run.run_id,
        "dataset_id": dataset_id,
        "summary": summary,
        "column_order_guaranteed": run.column_order_guaranteed,
        "unseen_diagnoses": run.unseen_diagnoses,
        "predictions": run.predictions,
        "rejected": rejections(&run),
        "predictions_path": paths.predictions_path,
    });
    emit(as_json, &report, || print_run(&run, dataset_id))?;

    run.metrics.print_summary();
    Ok(())
}

fn rejections(run: &ScoringRun) -> Vec<serde_json::Value> {
    run.rejected
        .iter()
        .map(|r| json!({ "row": r.row, "patient_id": r.patient_id, "reason": r.reason.to_string() }))
        .collect()
}

fn print_run(run: &ScoringRun, dataset_id: i64) {
    println!("{:12} {:>6} {:20} {}", "Patient ID", "Stay", "Diagnosis", "Prediction");
    for (prediction, features) in run.predictions.iter().zip(&run.features) {
        println!(
            "{:12} {:>6} {:20} {}",
            prediction.patient_id, features.length_of_stay, features.diagnosis, prediction.label
        );
    }
    for rejection in &run.rejected {
        println!("Rejected {} (row {}): {}", rejection.patient_id, rejection.row, rejection.reason);
    }
    if !run.column_order_guaranteed {
        println!("Warning: feature_names.json missing, column order not guaranteed");
    }
    println!(
        "Dataset #{}: {} scored, {} flagged as fraud, {} rejected",
        dataset_id,
        run.predictions.len(),
        run.fraud_count(),
        run.rejected.len()
    );
}
