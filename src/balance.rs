//! Load balance across multi-vehicle routes.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BalanceStatus {
    Excellent,
    Good,
    Fair,
    Poor,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl BalanceStatus {
    /// Classify a coefficient of variation.
    pub fn from_cv(cv: f64) -> Self {
        if cv < 0.15 {
            BalanceStatus::Excellent
        } else if cv < 0.25 {
            BalanceStatus::Good
        } else if cv < 0.40 {
            BalanceStatus::Fair
        } else {
            BalanceStatus::Poor
        }
    }
}

impl fmt::Display for BalanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BalanceStatus::Excellent => "Excellent",
            BalanceStatus::Good => "Good",
            BalanceStatus::Fair => "Fair",
            BalanceStatus::Poor => "Poor",
            BalanceStatus::NotApplicable => "N/A",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalanceStats {
    /// Population standard deviation over mean, three decimals.
    pub coefficient_of_variation: f64,
    pub status: BalanceStatus,
    /// Two decimals.
    pub avg_load: f64,
    pub max_load: u64,
    pub min_load: u64,
}

/// Balance statistics for per-route loads.
pub fn analyze(loads: &[u64]) -> BalanceStats {
    let (Some(&max_load), Some(&min_load)) = (loads.iter().max(), loads.iter().min()) else {
        return BalanceStats {
            coefficient_of_variation: 0.0,
            status: BalanceStatus::NotApplicable,
            avg_load: 0.0,
            max_load: 0,
            min_load: 0,
        };
    };

    let n = loads.len() as f64;
    let mean = loads.iter().map(|&load| load as f64).sum::<f64>() / n;
    let cv = if mean > 0.0 {
        let variance = loads
            .iter()
            .map(|&load| (load as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        variance.sqrt() / mean
    } else {
        0.0
    };

    BalanceStats {
        coefficient_of_variation: round_to(cv, 3),
        status: BalanceStatus::from_cv(cv),
        avg_load: round_to(mean, 2),
        max_load,
        min_load,
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
