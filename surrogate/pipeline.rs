//! # Pipeline Orchestration
//!
//! Two stateless entry points:
//!
//! 1. [`run_pipeline`] validates the small and super ensembles, trains the
//!    surrogate on the small ensemble and predicts the super-ensemble
//!    observations.
//! 2. [`super_ensemble_localization`] turns the super ensemble into a
//!    localization matrix. The weights are computed for the size of the small
//!    ensemble, since that is the ensemble whose sampling noise they damp.

use ndarray::{Array2, ArrayBase, ArrayView2, Data, Dimension, Ix2};
use thiserror::Error;

use crate::localize::{LocalizationError, calculate_localization_with_observer};
use crate::model::{SurrogateError, TrainedSurrogate};
use crate::progress::{NoopObserver, PipelineStage, StageObserver, timed};
use crate::regressor::RegressorConfig;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(
        "{left_name} and {right_name} must have the same number of {axis}. Got {left} and {right}."
    )]
    ShapeMismatch {
        left_name: &'static str,
        right_name: &'static str,
        axis: &'static str,
        left: usize,
        right: usize,
    },

    #[error("{name} must be 2-dimensional, but has {ndim} dimension(s).")]
    RankMismatch { name: &'static str, ndim: usize },

    #[error("{0} contains NaN or infinite values.")]
    NonFiniteInput(&'static str),

    #[error(transparent)]
    Surrogate(#[from] SurrogateError),

    #[error(transparent)]
    Localization(#[from] LocalizationError),
}

/// Output of [`run_pipeline`].
#[derive(Debug)]
pub struct PipelineOutput {
    pub surrogate: TrainedSurrogate,
    /// Predicted observations of the super ensemble, `(n_super × n_obs)`.
    pub y_super: Array2<f64>,
}

fn as_matrix<'a, S, D>(
    name: &'static str,
    array: &'a ArrayBase<S, D>,
) -> Result<ArrayView2<'a, f64>, PipelineError>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    array
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| PipelineError::RankMismatch {
            name,
            ndim: array.ndim(),
        })
}

/// Checks that the small and super ensembles can be combined: all three are
/// matrices, the small ensemble pairs up sample for sample, and both parameter
/// sets describe the same parameters. Non-finite entries are rejected last.
pub fn validate_matrix_compatibility<S1, S2, S3, D1, D2, D3>(
    x_train: &ArrayBase<S1, D1>,
    y_train: &ArrayBase<S2, D2>,
    x_super: &ArrayBase<S3, D3>,
) -> Result<(), PipelineError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    S3: Data<Elem = f64>,
    D1: Dimension,
    D2: Dimension,
    D3: Dimension,
{
    let x_train = as_matrix("X_train", x_train)?;
    let y_train = as_matrix("Y_train", y_train)?;
    let x_super = as_matrix("X_super", x_super)?;

    if x_train.nrows() != y_train.nrows() {
        return Err(PipelineError::ShapeMismatch {
            left_name: "X_train",
            right_name: "Y_train",
            axis: "samples",
            left: x_train.nrows(),
            right: y_train.nrows(),
        });
    }
    if x_train.ncols() != x_super.ncols() {
        return Err(PipelineError::ShapeMismatch {
            left_name: "X_train",
            right_name: "X_super",
            axis: "features",
            left: x_train.ncols(),
            right: x_super.ncols(),
        });
    }

    for (name, matrix) in [("X_train", x_train), ("Y_train", y_train), ("X_super", x_super)] {
        if !matrix.iter().all(|v| v.is_finite()) {
            return Err(PipelineError::NonFiniteInput(name));
        }
    }
    Ok(())
}

pub fn run_pipeline(
    x_train: ArrayView2<f64>,
    y_train: ArrayView2<f64>,
    x_super: ArrayView2<f64>,
    config: &RegressorConfig,
) -> Result<PipelineOutput, PipelineError> {
    run_pipeline_with_observer(x_train, y_train, x_super, config, &mut NoopObserver)
}

/// Validates the inputs, trains the surrogate on `(x_train, y_train)` and
/// predicts the observations of `x_super`.
pub fn run_pipeline_with_observer<O>(
    x_train: ArrayView2<f64>,
    y_train: ArrayView2<f64>,
    x_super: ArrayView2<f64>,
    config: &RegressorConfig,
    observer: &mut O,
) -> Result<PipelineOutput, PipelineError>
where
    O: StageObserver + ?Sized,
{
    timed(observer, PipelineStage::Validation, || {
        validate_matrix_compatibility(&x_train, &y_train, &x_super)
    })?;
    log::info!(
        "Small ensemble: {} samples, {} parameters, {} observations. Super ensemble: {} samples.",
        x_train.nrows(),
        x_train.ncols(),
        y_train.ncols(),
        x_super.nrows()
    );

    let surrogate = TrainedSurrogate::fit_with_observer(x_train, y_train, config, observer)?;
    let y_super = timed(observer, PipelineStage::Prediction, || {
        surrogate.predict(x_super)
    })?;

    Ok(PipelineOutput { surrogate, y_super })
}

pub fn super_ensemble_localization(
    x_train: ArrayView2<f64>,
    x_super: ArrayView2<f64>,
    y_super: ArrayView2<f64>,
    epsilon: f64,
) -> Result<Array2<f64>, PipelineError> {
    super_ensemble_localization_with_observer(x_train, x_super, y_super, epsilon, &mut NoopObserver)
}

/// Localization matrix `(n_params × n_obs)` of the super ensemble, computed for
/// an ensemble of `x_train.nrows()` members.
pub fn super_ensemble_localization_with_observer<O>(
    x_train: ArrayView2<f64>,
    x_super: ArrayView2<f64>,
    y_super: ArrayView2<f64>,
    epsilon: f64,
    observer: &mut O,
) -> Result<Array2<f64>, PipelineError>
where
    O: StageObserver + ?Sized,
{
    let ensemble_size = x_train.nrows();
    log::info!(
        "Localizing {} parameters against {} observations for an ensemble of {ensemble_size}",
        x_super.ncols(),
        y_super.ncols()
    );
    Ok(calculate_localization_with_observer(
        &x_super.t(),
        &y_super.t(),
        ensemble_size,
        epsilon,
        observer,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{KernelRidgeParams, KernelSpec};
    use crate::localize::DEFAULT_EPSILON;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array3, array};
    use std::time::Duration;

    #[derive(Default)]
    struct StageLog {
        finished: Vec<PipelineStage>,
    }

    impl StageObserver for StageLog {
        fn on_stage_finish(&mut self, stage: PipelineStage, elapsed: Duration) {
            assert!(elapsed >= Duration::ZERO);
            self.finished.push(stage);
        }
    }

    fn linear_ridge() -> RegressorConfig {
        RegressorConfig::KernelRidge(KernelRidgeParams {
            kernel: KernelSpec::Linear,
            alpha: 1e-10,
        })
    }

    #[test]
    fn sample_count_mismatch_names_both_counts() {
        let x_train = Array2::<f64>::zeros((5, 2));
        let y_train = Array2::<f64>::zeros((4, 3));
        let x_super = Array2::<f64>::zeros((10, 2));
        let err = validate_matrix_compatibility(&x_train, &y_train, &x_super).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ShapeMismatch {
                left: 5,
                right: 4,
                ..
            }
        ));
        let message = err.to_string();
        assert!(message.contains('5') && message.contains('4'), "{message}");
    }

    #[test]
    fn feature_count_mismatch_is_rejected() {
        let x_train = Array2::<f64>::zeros((5, 2));
        let y_train = Array2::<f64>::zeros((5, 3));
        let x_super = Array2::<f64>::zeros((10, 3));
        assert!(matches!(
            validate_matrix_compatibility(&x_train, &y_train, &x_super),
            Err(PipelineError::ShapeMismatch {
                right_name: "X_super",
                left: 2,
                right: 3,
                ..
            })
        ));
    }

    #[test]
    fn rank_is_checked_before_shapes() {
        let x_train = Array1::<f64>::zeros(5);
        let y_train = Array2::<f64>::zeros((4, 3));
        let x_super = Array3::<f64>::zeros((2, 2, 2));
        assert!(matches!(
            validate_matrix_compatibility(&x_train, &y_train, &x_super),
            Err(PipelineError::RankMismatch {
                name: "X_train",
                ndim: 1
            })
        ));
    }

    #[test]
    fn non_finite_inputs_are_rejected() {
        let x_train = array![[0.0], [1.0]];
        let y_train = array![[0.0], [f64::NAN]];
        let x_super = array![[0.5]];
        assert!(matches!(
            validate_matrix_compatibility(&x_train, &y_train, &x_super),
            Err(PipelineError::NonFiniteInput("Y_train"))
        ));
    }

    #[test]
    fn pipeline_reports_every_stage_in_order() {
        let x_train = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let y_train = array![[1.0], [3.0], [-2.0]];
        let x_super = array![[0.5, 0.5], [2.0, 1.0], [-1.0, 0.0], [0.25, 0.75]];

        let mut stages = StageLog::default();
        let output = run_pipeline_with_observer(
            x_train.view(),
            y_train.view(),
            x_super.view(),
            &linear_ridge(),
            &mut stages,
        )
        .unwrap();
        assert_eq!(output.y_super.dim(), (4, 1));
        assert_abs_diff_eq!(output.y_super[[1, 0]], 2.0, epsilon = 1e-6);

        let r = super_ensemble_localization_with_observer(
            x_train.view(),
            x_super.view(),
            output.y_super.view(),
            DEFAULT_EPSILON,
            &mut stages,
        )
        .unwrap();
        assert_eq!(r.dim(), (2, 1));

        assert_eq!(
            stages.finished,
            vec![
                PipelineStage::Validation,
                PipelineStage::Scaling,
                PipelineStage::Training,
                PipelineStage::Prediction,
                PipelineStage::CrossCovariance,
                PipelineStage::Localization,
            ]
        );
    }

    #[test]
    fn localization_uses_the_small_ensemble_size() {
        let x_super = array![[1.0, 0.0], [2.0, 1.0], [3.0, 1.0], [4.0, 3.0]];
        let y_super = array![[2.0], [4.5], [5.5], [8.0]];
        let small = Array2::<f64>::zeros((2, 2));
        let large = Array2::<f64>::zeros((2000, 2));

        let damped = super_ensemble_localization(
            small.view(),
            x_super.view(),
            y_super.view(),
            DEFAULT_EPSILON,
        )
        .unwrap();
        let sharp = super_ensemble_localization(
            large.view(),
            x_super.view(),
            y_super.view(),
            DEFAULT_EPSILON,
        )
        .unwrap();
        assert!(damped[[0, 0]] < sharp[[0, 0]]);
        assert!(sharp[[0, 0]] > 0.99);
    }
}
