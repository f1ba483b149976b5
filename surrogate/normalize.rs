//! # Min/Max Normalization
//!
//! Per-column affine scaling of ensemble matrices onto the interval `[-1, 1]`.
//! Inputs and outputs of the surrogate each get their own scaler, fitted once on
//! the small ensemble and then applied, never refitted, to every other matrix.

use itertools::izip;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::model::SurrogateError;

/// Target interval of the scaled columns.
pub const FEATURE_RANGE: (f64, f64) = (-1.0, 1.0);

/// Value assigned to every entry of a column that had no spread when fitted.
pub const DEGENERATE_FILL: f64 = 0.0;

/// Affine per-column scaler mapping each fitted column's `[min, max]` onto the
/// target range [`FEATURE_RANGE`].
///
/// A column whose fitted minimum equals its maximum is degenerate. It
/// transforms to [`DEGENERATE_FILL`], the midpoint of the target range, and
/// inverse-transforms back to the constant seen during fitting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    mins: Vec<f64>,
    maxs: Vec<f64>,
}

impl MinMaxScaler {
    /// Records the minimum and maximum of every column of `data`.
    pub fn fit(data: ArrayView2<f64>) -> Result<Self, SurrogateError> {
        let (rows, cols) = data.dim();
        if rows == 0 || cols == 0 {
            return Err(SurrogateError::EmptyInput { rows, cols });
        }

        let (mins, maxs) = data
            .axis_iter(Axis(1))
            .map(|column| {
                column
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                        (lo.min(v), hi.max(v))
                    })
            })
            .unzip();

        Ok(Self { mins, maxs })
    }

    pub fn n_columns(&self) -> usize {
        self.mins.len()
    }

    pub fn data_min(&self) -> &[f64] {
        &self.mins
    }

    pub fn data_max(&self) -> &[f64] {
        &self.maxs
    }

    pub fn transform(&self, data: ArrayView2<f64>) -> Result<Array2<f64>, SurrogateError> {
        self.check_columns("MinMaxScaler::transform", data)?;
        let (a, b) = FEATURE_RANGE;
        let mut scaled = data.to_owned();

        for (mut column, &lo, &hi) in izip!(scaled.axis_iter_mut(Axis(1)), &self.mins, &self.maxs) {
            let range = hi - lo;
            if range == 0.0 {
                column.fill(DEGENERATE_FILL);
            } else {
                column.mapv_inplace(|v| a + (v - lo) * (b - a) / range);
            }
        }

        Ok(scaled)
    }

    pub fn inverse_transform(&self, data: ArrayView2<f64>) -> Result<Array2<f64>, SurrogateError> {
        self.check_columns("MinMaxScaler::inverse_transform", data)?;
        let (a, b) = FEATURE_RANGE;
        let mut restored = data.to_owned();

        for (mut column, &lo, &hi) in
            izip!(restored.axis_iter_mut(Axis(1)), &self.mins, &self.maxs)
        {
            let range = hi - lo;
            if range == 0.0 {
                column.fill(lo);
            } else {
                column.mapv_inplace(|v| lo + (v - a) * range / (b - a));
            }
        }

        Ok(restored)
    }

    fn check_columns(
        &self,
        context: &'static str,
        data: ArrayView2<f64>,
    ) -> Result<(), SurrogateError> {
        if data.ncols() != self.n_columns() {
            return Err(SurrogateError::ColumnMismatch {
                context,
                expected: self.n_columns(),
                found: data.ncols(),
            });
        }
        Ok(())
    }
}
