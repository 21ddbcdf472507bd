//! Weighted combination of distance and duration into solver arc costs.

use serde::Serialize;

use crate::error::ValidationError;
use crate::matrix::Matrix;
use crate::traits::CostLookup;

const WEIGHT_TOLERANCE: f64 = 0.01;

/// Distance/duration weights, summing to 1.0 (±0.01).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostWeights {
    distance: f64,
    duration: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            distance: 0.5,
            duration: 0.5,
        }
    }
}

impl CostWeights {
    pub fn new(distance: f64, duration: f64) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidWeights { distance, duration };
        if !distance.is_finite() || !duration.is_finite() || distance < 0.0 || duration < 0.0 {
            return Err(invalid());
        }
        if (distance + duration - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(invalid());
        }
        Ok(Self { distance, duration })
    }

    /// Only distance counts.
    pub const fn distance_only() -> Self {
        Self {
            distance: 1.0,
            duration: 0.0,
        }
    }

    pub const fn distance(&self) -> f64 {
        self.distance
    }

    pub const fn duration(&self) -> f64 {
        self.duration
    }

    /// `round(wd × km × 100 + wt × min × 100)`.
    pub fn cost(&self, meters: i64, seconds: i64) -> i64 {
        let km = meters as f64 / 1000.0;
        let minutes = seconds as f64 / 60.0;
        (self.distance * km * 100.0 + self.duration * minutes * 100.0).round() as i64
    }
}

/// Integer arc costs, same shape as the source matrices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostMatrix(Matrix);

impl CostMatrix {
    pub fn rows(&self) -> &Matrix {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl CostLookup for CostMatrix {
    fn cost(&self, from: usize, to: usize) -> i64 {
        self.0[from][to]
    }
}

fn shape(matrix: &Matrix) -> (usize, usize) {
    (matrix.len(), matrix.first().map_or(0, Vec::len))
}

fn is_rectangular(matrix: &Matrix) -> bool {
    let (_, cols) = shape(matrix);
    matrix.iter().all(|row| row.len() == cols)
}

/// Combine distance (m) and duration (s) matrices into costs.
pub fn combine(
    distances: &Matrix,
    durations: &Matrix,
    weights: CostWeights,
) -> Result<CostMatrix, ValidationError> {
    if shape(distances) != shape(durations) || !is_rectangular(distances) || !is_rectangular(durations) {
        return Err(ValidationError::MatrixShape {
            distances: shape(distances),
            durations: shape(durations),
        });
    }

    let rows = distances
        .iter()
        .zip(durations)
        .map(|(distance_row, duration_row)| {
            distance_row
                .iter()
                .zip(duration_row)
                .map(|(&meters, &seconds)| weights.cost(meters, seconds))
                .collect()
        })
        .collect();
    Ok(CostMatrix(rows))
}
