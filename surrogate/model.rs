//! # Trained Surrogate
//!
//! A [`TrainedSurrogate`] bundles everything learned from the small ensemble: the
//! input scaler, the output scaler and the fitted multi-output regressor. It is
//! built once per pipeline run and then evaluated on the super ensemble.

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

use crate::linalg::FaerLinalgError;
use crate::normalize::MinMaxScaler;
use crate::progress::{NoopObserver, PipelineStage, StageObserver, timed};
use crate::regressor::{FittedRegressor, RegressorConfig, uniform_rmse};

/// Failures while scaling, fitting or evaluating the surrogate.
#[derive(Error, Debug)]
pub enum SurrogateError {
    #[error("Cannot fit on an empty matrix of shape ({rows}, {cols}).")]
    EmptyInput { rows: usize, cols: usize },

    #[error("{context}: expected {expected} columns but got {found}.")]
    ColumnMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{context}: inputs have {x_rows} rows but targets have {y_rows} rows.")]
    RowMismatch {
        context: &'static str,
        x_rows: usize,
        y_rows: usize,
    },

    #[error("Invalid regressor setting: {0}")]
    InvalidSetting(String),

    #[error("Linear algebra failure while fitting the surrogate: {0}")]
    Linalg(#[from] FaerLinalgError),
}

/// Scalers plus regressor, fitted on the small ensemble.
#[derive(Debug)]
pub struct TrainedSurrogate {
    input_scaler: MinMaxScaler,
    output_scaler: MinMaxScaler,
    model: Box<dyn FittedRegressor>,
    training_rmse: f64,
}

impl TrainedSurrogate {
    pub fn fit(
        x_train: ArrayView2<f64>,
        y_train: ArrayView2<f64>,
        config: &RegressorConfig,
    ) -> Result<Self, SurrogateError> {
        Self::fit_with_observer(x_train, y_train, config, &mut NoopObserver)
    }

    /// Scales the small ensemble, trains the configured regressor on it and
    /// reports the training error in scaled units.
    pub fn fit_with_observer<O>(
        x_train: ArrayView2<f64>,
        y_train: ArrayView2<f64>,
        config: &RegressorConfig,
        observer: &mut O,
    ) -> Result<Self, SurrogateError>
    where
        O: StageObserver + ?Sized,
    {
        config.validate()?;
        if x_train.nrows() != y_train.nrows() {
            return Err(SurrogateError::RowMismatch {
                context: "TrainedSurrogate::fit",
                x_rows: x_train.nrows(),
                y_rows: y_train.nrows(),
            });
        }

        let (input_scaler, output_scaler, x_scaled, y_scaled) =
            timed(observer, PipelineStage::Scaling, || {
                let input_scaler = MinMaxScaler::fit(x_train)?;
                let output_scaler = MinMaxScaler::fit(y_train)?;
                let x_scaled = input_scaler.transform(x_train)?;
                let y_scaled = output_scaler.transform(y_train)?;
                Ok::<_, SurrogateError>((input_scaler, output_scaler, x_scaled, y_scaled))
            })?;

        log::info!(
            "Training {} surrogate on {} samples ({} inputs -> {} outputs)",
            config.describe(),
            x_scaled.nrows(),
            x_scaled.ncols(),
            y_scaled.ncols()
        );
        let model = timed(observer, PipelineStage::Training, || {
            config.build().fit(x_scaled.view(), y_scaled.view())
        })?;

        let fitted = model.predict(x_scaled.view())?;
        let training_rmse = uniform_rmse(y_scaled.view(), fitted.view());
        observer.on_training_error(training_rmse);

        Ok(Self {
            input_scaler,
            output_scaler,
            model,
            training_rmse,
        })
    }

    /// Evaluates the surrogate in physical units:
    /// `output⁻¹(model(input(x)))`.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, SurrogateError> {
        let scaled = self.input_scaler.transform(x)?;
        let raw = self.model.predict(scaled.view())?;
        self.output_scaler.inverse_transform(raw.view())
    }

    pub fn input_scaler(&self) -> &MinMaxScaler {
        &self.input_scaler
    }

    pub fn output_scaler(&self) -> &MinMaxScaler {
        &self.output_scaler
    }

    /// Root-mean-squared training error in scaled units, averaged over outputs.
    pub fn training_rmse(&self) -> f64 {
        self.training_rmse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{KernelRidgeParams, KernelSpec};
    use crate::progress::Anomaly;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::time::Duration;

    fn linear_kernel_config() -> RegressorConfig {
        RegressorConfig::KernelRidge(KernelRidgeParams {
            kernel: KernelSpec::Linear,
            alpha: 1e-8,
        })
    }

    #[derive(Default)]
    struct Recorder {
        stages: Vec<PipelineStage>,
        rmse: Option<f64>,
    }

    impl StageObserver for Recorder {
        fn on_stage_finish(&mut self, stage: PipelineStage, elapsed: Duration) {
            assert!(elapsed >= Duration::ZERO);
            self.stages.push(stage);
        }
        fn on_training_error(&mut self, rmse: f64) {
            self.rmse = Some(rmse);
        }
        fn on_anomaly(&mut self, anomaly: Anomaly, count: usize) {
            panic!("unexpected anomaly {anomaly} x{count}");
        }
    }

    #[test]
    fn predictions_come_back_in_physical_units() {
        let x = array![[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [10.0, 10.0]];
        let y = array![[100.0], [120.0], [70.0], [90.0]];
        let surrogate = TrainedSurrogate::fit(x.view(), y.view(), &linear_kernel_config()).unwrap();

        let predicted = surrogate.predict(array![[5.0, 5.0], [20.0, 0.0]].view()).unwrap();
        assert_abs_diff_eq!(predicted[[0, 0]], 95.0, epsilon = 1e-4);
        assert_abs_diff_eq!(predicted[[1, 0]], 140.0, epsilon = 1e-4);
        assert!(surrogate.training_rmse() < 1e-6);
    }

    #[test]
    fn scalers_keep_the_fitted_ranges() {
        let x = array![[0.0, -2.0], [10.0, 4.0], [5.0, 1.0]];
        let y = array![[100.0], [120.0], [70.0]];
        let surrogate = TrainedSurrogate::fit(x.view(), y.view(), &linear_kernel_config()).unwrap();

        assert_eq!(surrogate.input_scaler().data_min(), &[0.0, -2.0]);
        assert_eq!(surrogate.input_scaler().data_max(), &[10.0, 4.0]);
        assert_eq!(surrogate.output_scaler().data_min(), &[70.0]);
        assert_eq!(surrogate.output_scaler().data_max(), &[120.0]);
    }

    #[test]
    fn observer_sees_scaling_training_and_rmse() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![[1.0], [3.0], [5.0]];
        let mut recorder = Recorder::default();
        TrainedSurrogate::fit_with_observer(
            x.view(),
            y.view(),
            &linear_kernel_config(),
            &mut recorder,
        )
        .unwrap();

        assert_eq!(
            recorder.stages,
            vec![PipelineStage::Scaling, PipelineStage::Training]
        );
        assert!(recorder.rmse.is_some_and(|rmse| rmse < 1e-6));
    }

    #[test]
    fn prediction_rejects_wrong_feature_count() {
        let x = array![[0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![[1.0], [2.0], [3.0]];
        let surrogate = TrainedSurrogate::fit(x.view(), y.view(), &linear_kernel_config()).unwrap();

        let err = surrogate.predict(array![[1.0, 2.0, 3.0]].view()).unwrap_err();
        assert!(matches!(
            err,
            SurrogateError::ColumnMismatch {
                expected: 2,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn mismatched_sample_counts_are_rejected() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![[1.0], [3.0]];
        assert!(matches!(
            TrainedSurrogate::fit(x.view(), y.view(), &RegressorConfig::default()),
            Err(SurrogateError::RowMismatch {
                x_rows: 3,
                y_rows: 2,
                ..
            })
        ));
    }
}
