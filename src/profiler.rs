//! Stage timing for optimization requests.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::balance::round_to;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTiming {
    pub component: String,
    pub time_seconds: f64,
    pub percentage: f64,
}

/// Stages sorted slowest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub total_time_seconds: f64,
    pub breakdown: Vec<StageTiming>,
}

/// Records how long labelled stages take. A disabled profiler still runs
/// the stages but records nothing.
#[derive(Debug, Clone, Default)]
pub struct Profiler {
    enabled: bool,
    timings: Vec<(String, Duration)>,
}

impl Profiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timings: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Run `stage`, timing it under `label`. Re-using a label overwrites it.
    pub fn profile<T>(&mut self, label: &str, stage: impl FnOnce() -> T) -> T {
        if !self.enabled {
            return stage();
        }

        let started = Instant::now();
        let output = stage();
        self.record(label, started.elapsed());
        output
    }

    pub fn record(&mut self, label: &str, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        debug!(stage = label, elapsed_ms = elapsed.as_millis() as u64, "stage finished");
        match self.timings.iter_mut().find(|(existing, _)| existing == label) {
            Some((_, slot)) => *slot = elapsed,
            None => self.timings.push((label.to_string(), elapsed)),
        }
    }

    /// `None` when profiling is disabled.
    pub fn summary(&self) -> Option<ProfileSummary> {
        if !self.enabled {
            return None;
        }

        let total: f64 = self.timings.iter().map(|(_, elapsed)| elapsed.as_secs_f64()).sum();
        let mut breakdown: Vec<StageTiming> = self
            .timings
            .iter()
            .map(|(label, elapsed)| {
                let seconds = elapsed.as_secs_f64();
                let percentage = if total > 0.0 { seconds / total * 100.0 } else { 0.0 };
                StageTiming {
                    component: label.clone(),
                    time_seconds: round_to(seconds, 3),
                    percentage: round_to(percentage, 1),
                }
            })
            .collect();
        breakdown.sort_by(|a, b| b.time_seconds.total_cmp(&a.time_seconds));

        Some(ProfileSummary {
            total_time_seconds: round_to(total, 3),
            breakdown,
        })
    }

    pub fn log_summary(&self) {
        let Some(summary) = self.summary() else {
            return;
        };
        info!(total_s = summary.total_time_seconds, "performance summary");
        for stage in &summary.breakdown {
            info!(
                stage = %stage.component,
                seconds = stage.time_seconds,
                percentage = stage.percentage,
                "stage timing"
            );
        }
    }
}
