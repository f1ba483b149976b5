//! # Kernel Ridge Regression
//!
//! Dual-form ridge regression, `(K + alpha I) A = Y`, solved once for every
//! output column through a Cholesky factorization. Predictions are
//! `k(x, X_train) A`.

use std::fmt;

use faer::Side;
use ndarray::{Array2, ArrayView1, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::linalg::FaerCholesky;
use crate::model::SurrogateError;
use crate::regressor::{FittedRegressor, Regressor, check_training_shapes};

fn default_degree() -> u32 {
    2
}

fn default_coef0() -> f64 {
    1.0
}

/// Kernel function, read from the `[regressor.kernel]` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelSpec {
    /// `x·x' + 1`
    Linear,
    /// `exp(-gamma |x - x'|²)`; `gamma` defaults to `1 / n_features`.
    Rbf {
        #[serde(default)]
        gamma: Option<f64>,
    },
    /// `(x·x' + coef0)^degree`
    Polynomial {
        #[serde(default = "default_degree")]
        degree: u32,
        #[serde(default = "default_coef0")]
        coef0: f64,
    },
}

impl Default for KernelSpec {
    fn default() -> Self {
        Self::Rbf { gamma: None }
    }
}

impl fmt::Display for KernelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => f.write_str("linear kernel"),
            Self::Rbf { gamma: Some(gamma) } => write!(f, "rbf kernel, gamma {gamma}"),
            Self::Rbf { gamma: None } => f.write_str("rbf kernel, gamma 1/n_features"),
            Self::Polynomial { degree, coef0 } => {
                write!(f, "polynomial kernel, degree {degree}, coef0 {coef0}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelRidgeParams {
    pub kernel: KernelSpec,
    /// Ridge penalty added to the diagonal of the Gram matrix.
    pub alpha: f64,
}

impl Default for KernelRidgeParams {
    fn default() -> Self {
        Self {
            kernel: KernelSpec::default(),
            alpha: 1e-6,
        }
    }
}

impl KernelRidgeParams {
    pub fn validate(&self) -> Result<(), SurrogateError> {
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(SurrogateError::InvalidSetting(format!(
                "alpha must be positive and finite, got {}",
                self.alpha
            )));
        }
        match self.kernel {
            KernelSpec::Rbf { gamma: Some(gamma) } if !(gamma.is_finite() && gamma > 0.0) => Err(
                SurrogateError::InvalidSetting(format!("rbf gamma must be positive, got {gamma}")),
            ),
            KernelSpec::Polynomial { degree: 0, .. } => Err(SurrogateError::InvalidSetting(
                "polynomial degree must be at least 1".to_string(),
            )),
            KernelSpec::Polynomial { coef0, .. } if !coef0.is_finite() => Err(
                SurrogateError::InvalidSetting(format!("polynomial coef0 must be finite, got {coef0}")),
            ),
            _ => Ok(()),
        }
    }
}

/// Kernel with every default resolved against the training data.
#[derive(Clone, Copy, Debug)]
enum Kernel {
    Linear,
    Rbf { gamma: f64 },
    Polynomial { degree: i32, coef0: f64 },
}

impl Kernel {
    fn resolve(spec: &KernelSpec, n_features: usize) -> Self {
        match *spec {
            KernelSpec::Linear => Self::Linear,
            KernelSpec::Rbf { gamma } => Self::Rbf {
                gamma: gamma.unwrap_or(1.0 / n_features as f64),
            },
            KernelSpec::Polynomial { degree, coef0 } => Self::Polynomial {
                degree: degree.min(i32::MAX as u32) as i32,
                coef0,
            },
        }
    }

    fn eval(self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            Self::Linear => a.dot(&b) + 1.0,
            Self::Rbf { gamma } => {
                let mut squared = 0.0;
                Zip::from(&a)
                    .and(&b)
                    .for_each(|&u, &v| squared += (u - v) * (u - v));
                (-gamma * squared).exp()
            }
            Self::Polynomial { degree, coef0 } => (a.dot(&b) + coef0).powi(degree),
        }
    }

    /// `out[i, j] = k(a_i, b_j)`
    fn matrix(self, a: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64> {
        Array2::from_shape_fn((a.nrows(), b.nrows()), |(i, j)| self.eval(a.row(i), b.row(j)))
    }
}

/// Natively multi-output: one factorization serves every target column.
pub struct KernelRidge {
    params: KernelRidgeParams,
}

impl KernelRidge {
    pub fn new(params: KernelRidgeParams) -> Self {
        Self { params }
    }
}

impl Regressor for KernelRidge {
    fn fit(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
    ) -> Result<Box<dyn FittedRegressor>, SurrogateError> {
        check_training_shapes("KernelRidge::fit", x, y)?;
        self.params.validate()?;

        let kernel = Kernel::resolve(&self.params.kernel, x.ncols());
        let mut gram = kernel.matrix(x, x);
        gram.diag_mut().mapv_inplace(|v| v + self.params.alpha);

        let factor = gram.cholesky(Side::Lower)?;
        let dual = factor.solve_mat(&y);
        log::debug!(
            "Kernel ridge solved a {n}x{n} system for {} outputs",
            dual.ncols(),
            n = gram.nrows()
        );

        Ok(Box::new(KernelRidgeModel {
            kernel,
            support: x.to_owned(),
            dual,
        }))
    }
}

#[derive(Debug)]
pub struct KernelRidgeModel {
    kernel: Kernel,
    support: Array2<f64>,
    dual: Array2<f64>,
}

impl FittedRegressor for KernelRidgeModel {
    fn n_features(&self) -> usize {
        self.support.ncols()
    }

    fn n_outputs(&self) -> usize {
        self.dual.ncols()
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, SurrogateError> {
        if x.ncols() != self.n_features() {
            return Err(SurrogateError::ColumnMismatch {
                context: "KernelRidgeModel::predict",
                expected: self.n_features(),
                found: x.ncols(),
            });
        }
        let cross = self.kernel.matrix(x, self.support.view());
        Ok(cross.dot(&self.dual))
    }
}
