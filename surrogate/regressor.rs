//! # Regressor Capability
//!
//! The surrogate only needs two things from a regression model: fit on a
//! normalized `(samples × features)` input against a normalized
//! `(samples × outputs)` target, then predict on new inputs. Concrete families
//! plug in behind [`Regressor`] / [`FittedRegressor`] and are selected at run time
//! through [`RegressorConfig`].
//!
//! Families that only model a single target column implement
//! [`SingleOutputRegressor`] and are lifted to multi-output by
//! [`PerOutputRegressor`], which trains one independent model per output column
//! on the rayon pool.

use std::fmt;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::boosting::{BoostingParams, GradientBoosting};
use crate::kernel::{KernelRidge, KernelRidgeParams};
use crate::model::SurrogateError;

/// A regression model that has been fitted and can be evaluated.
pub trait FittedRegressor: Send + Sync + fmt::Debug {
    fn n_features(&self) -> usize;
    fn n_outputs(&self) -> usize;
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, SurrogateError>;
}

/// A multi-output regression family.
pub trait Regressor: Send + Sync {
    fn fit(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
    ) -> Result<Box<dyn FittedRegressor>, SurrogateError>;
}

/// A regression family that models one target column at a time.
pub trait SingleOutputRegressor: Send + Sync {
    type Fitted: SingleOutputModel + 'static;

    fn fit_column(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<Self::Fitted, SurrogateError>;
}

pub trait SingleOutputModel: Send + Sync + fmt::Debug {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64;
}

/// Fits one clone of the base family per output column.
///
/// Every output model is trained with the same base configuration, seed
/// included, so the result does not depend on how rayon schedules the columns.
pub struct PerOutputRegressor<R> {
    base: R,
}

impl<R> PerOutputRegressor<R> {
    pub fn new(base: R) -> Self {
        Self { base }
    }
}

impl<R: SingleOutputRegressor> Regressor for PerOutputRegressor<R> {
    fn fit(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
    ) -> Result<Box<dyn FittedRegressor>, SurrogateError> {
        check_training_shapes("PerOutputRegressor::fit", x, y)?;

        let estimators = (0..y.ncols())
            .into_par_iter()
            .map(|output| self.base.fit_column(x, y.column(output)))
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "Fitted {} single-output models on {} features",
            estimators.len(),
            x.ncols()
        );
        Ok(Box::new(PerOutputModel {
            n_features: x.ncols(),
            estimators,
        }))
    }
}

#[derive(Debug)]
pub struct PerOutputModel<M> {
    n_features: usize,
    estimators: Vec<M>,
}

impl<M: SingleOutputModel> FittedRegressor for PerOutputModel<M> {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_outputs(&self) -> usize {
        self.estimators.len()
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, SurrogateError> {
        if x.ncols() != self.n_features {
            return Err(SurrogateError::ColumnMismatch {
                context: "PerOutputModel::predict",
                expected: self.n_features,
                found: x.ncols(),
            });
        }

        let columns: Vec<Array1<f64>> = self
            .estimators
            .par_iter()
            .map(|estimator| {
                x.rows()
                    .into_iter()
                    .map(|row| estimator.predict_row(row))
                    .collect()
            })
            .collect();

        let mut predictions = Array2::zeros((x.nrows(), self.estimators.len()));
        for (mut target, values) in predictions.axis_iter_mut(Axis(1)).zip(&columns) {
            target.assign(values);
        }
        Ok(predictions)
    }
}

/// Checks that a training pair is non-empty and sample-aligned.
pub fn check_training_shapes(
    context: &'static str,
    x: ArrayView2<f64>,
    y: ArrayView2<f64>,
) -> Result<(), SurrogateError> {
    if x.nrows() != y.nrows() {
        return Err(SurrogateError::RowMismatch {
            context,
            x_rows: x.nrows(),
            y_rows: y.nrows(),
        });
    }
    for (rows, cols) in [x.dim(), y.dim()] {
        if rows == 0 || cols == 0 {
            return Err(SurrogateError::EmptyInput { rows, cols });
        }
    }
    Ok(())
}

/// Root-mean-squared error of each output column, averaged uniformly across
/// outputs.
pub fn uniform_rmse(y_true: ArrayView2<f64>, y_pred: ArrayView2<f64>) -> f64 {
    let n_outputs = y_true.ncols();
    if n_outputs == 0 || y_true.nrows() == 0 {
        return 0.0;
    }
    let n_samples = y_true.nrows() as f64;

    let total: f64 = y_true
        .axis_iter(Axis(1))
        .zip(y_pred.axis_iter(Axis(1)))
        .map(|(truth, pred)| {
            let mut squared = 0.0;
            Zip::from(&truth)
                .and(&pred)
                .for_each(|&t, &p| squared += (t - p) * (t - p));
            (squared / n_samples).sqrt()
        })
        .sum();
    total / n_outputs as f64
}

/// Regression family used by the surrogate, read from the `[regressor]` table
/// of the configuration file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressorConfig {
    GradientBoosting(BoostingParams),
    KernelRidge(KernelRidgeParams),
}

impl Default for RegressorConfig {
    fn default() -> Self {
        Self::GradientBoosting(BoostingParams::default())
    }
}

impl RegressorConfig {
    pub fn build(&self) -> Box<dyn Regressor> {
        match self {
            Self::GradientBoosting(params) => Box::new(PerOutputRegressor::new(
                GradientBoosting::new(params.clone()),
            )),
            Self::KernelRidge(params) => Box::new(KernelRidge::new(params.clone())),
        }
    }

    pub fn validate(&self) -> Result<(), SurrogateError> {
        match self {
            Self::GradientBoosting(params) => params.validate(),
            Self::KernelRidge(params) => params.validate(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::GradientBoosting(params) => format!(
                "gradient boosting ({} rounds, learning rate {})",
                params.n_estimators, params.learning_rate
            ),
            Self::KernelRidge(params) => {
                format!("kernel ridge ({}, alpha {:e})", params.kernel, params.alpha)
            }
        }
    }
}
