//! Per-run statistics for the claims scoring pipeline.

use std::time::Duration;
use tracing::info;

use crate::types::prediction::LabelBreakdown;

/// Pipeline stages timed during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    BuildFeatures,
    EncodeScale,
    Align,
    Score,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::BuildFeatures => "build_features",
            Stage::EncodeScale => "encode_scale",
            Stage::Align => "align",
            Stage::Score => "score",
        }
    }
}

/// Counts and stage timings of one scoring run
#[derive(Debug, Default, Clone)]
pub struct RunMetrics {
    /// Data rows in the upload
    pub rows_read: u64,
    /// Rows excluded from scoring
    pub rows_rejected: u64,
    /// Rows given a prediction
    pub rows_scored: u64,
    /// Scored rows with a fraud label
    pub fraud_count: u64,
    /// Scored rows whose diagnosis was outside the encoder vocabulary
    pub unseen_diagnoses: u64,
    /// Stage durations in execution order
    stage_times: Vec<(Stage, Duration)>,
    /// Label distribution of scored rows
    labels: LabelBreakdown,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record how long a stage took
    pub fn record_stage(&mut self, stage: Stage, duration: Duration) {
        self.stage_times.push((stage, duration));
    }

    /// Record final labels and derived counts
    pub fn record_labels(&mut self, labels: &[String], non_fraud_label: &str) {
        self.labels = LabelBreakdown::from_labels(labels.iter().map(String::as_str));
        self.rows_scored = labels.len() as u64;
        self.fraud_count = self.labels.fraud_count(non_fraud_label);
    }

    pub fn stage_time(&self, stage: Stage) -> Option<Duration> {
        self.stage_times
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, d)| *d)
    }

    pub fn total_time(&self) -> Duration {
        self.stage_times.iter().map(|(_, d)| *d).sum()
    }

    pub fn labels(&self) -> &LabelBreakdown {
        &self.labels
    }

    /// Share of scored rows labelled as fraud, in percent
    pub fn fraud_rate(&self) -> f64 {
        if self.rows_scored > 0 {
            (self.fraud_count as f64 / self.rows_scored as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              CLAIMS FRAUD SCORING - RUN SUMMARY              ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Rows Read: {:>8}  │  Rejected: {:>8}  │  Scored: {:>8} ║",
            self.rows_read, self.rows_rejected, self.rows_scored
        );
        info!(
            "║ Fraud Labels: {:>8}  │  Fraud Rate: {:>6.1}%               ║",
            self.fraud_count,
            self.fraud_rate()
        );
        info!(
            "║ Unseen Diagnoses: {:>6}                                     ║",
            self.unseen_diagnoses
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Stage Times (μs):                                            ║");
        for (stage, duration) in &self.stage_times {
            info!("║   {:14}: {:>10}", stage.name(), duration.as_micros());
        }
        info!("║   {:14}: {:>10}", "total", self.total_time().as_micros());
        if !self.labels.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Labels:                                                      ║");
            for (label, count) in &self.labels.counts {
                let pct = if self.rows_scored > 0 {
                    (*count as f64 / self.rows_scored as f64) * 100.0
                } else {
                    0.0
                };
                let bar: String = "█".repeat(((pct / 5.0) as usize).min(20));
                info!("║   {:20}: {:>6} ({:>5.1}%) {}", label, count, pct, bar);
            }
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}
