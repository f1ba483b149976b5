//! # Localization Weights
//!
//! For a parameter `i` and an observation `j` with sample cross-covariance
//! `c = Cmd[i, j]` and sample variances `m_var[i]`, `d_var[j]`, the weight is
//!
//! ```text
//! R[i, j] = c² / (c² + (c² + m_var[i] d_var[j]) / Ne)
//! ```
//!
//! where `Ne` is the size of the ensemble the statistics are meant to localize.
//! Pairs whose correlation is indistinguishable from zero,
//! `|c| < epsilon sqrt(m_var[i] d_var[j])`, get exactly zero. Non-finite weights
//! are never raised as errors: NaN becomes 0 and ±∞ becomes 1.

use ndarray::{Array2, ArrayBase, ArrayView2, Data, Dimension, Zip};

use super::LocalizationError;
use super::covariance::{crosscov, named_variance};
use crate::progress::{Anomaly, NoopObserver, PipelineStage, StageObserver, timed};

/// Default relative correlation threshold below which a weight is zeroed.
pub const DEFAULT_EPSILON: f64 = 1e-3;

pub fn localize(
    cmd: ArrayView2<f64>,
    m_var: ArrayView2<f64>,
    d_var: ArrayView2<f64>,
    ensemble_size: usize,
    epsilon: f64,
) -> Result<Array2<f64>, LocalizationError> {
    localize_with_observer(cmd, m_var, d_var, ensemble_size, epsilon, &mut NoopObserver)
}

/// Computes the localization weights from precomputed statistics and reports
/// any replaced NaN/∞ entries to `observer`.
pub fn localize_with_observer<O>(
    cmd: ArrayView2<f64>,
    m_var: ArrayView2<f64>,
    d_var: ArrayView2<f64>,
    ensemble_size: usize,
    epsilon: f64,
    observer: &mut O,
) -> Result<Array2<f64>, LocalizationError>
where
    O: StageObserver + ?Sized,
{
    if ensemble_size == 0 {
        return Err(LocalizationError::InvalidEnsembleSize);
    }
    if !(epsilon.is_finite() && epsilon >= 0.0) {
        return Err(LocalizationError::InvalidEpsilon(epsilon));
    }
    let (p, q) = cmd.dim();
    if m_var.dim() != (p, 1) || d_var.dim() != (q, 1) {
        return Err(LocalizationError::ShapeMismatch {
            cmd: cmd.dim(),
            m_var: m_var.dim(),
            d_var: d_var.dim(),
        });
    }

    let (weights, nan_count, infinite_count) = timed(observer, PipelineStage::Localization, || {
        let mut weights = raw_weights(cmd, m_var, d_var, ensemble_size as f64, epsilon);
        let (nan_count, infinite_count) = replace_non_finite(&mut weights);
        (weights, nan_count, infinite_count)
    });

    if nan_count > 0 {
        observer.on_anomaly(Anomaly::NaN, nan_count);
    }
    if infinite_count > 0 {
        observer.on_anomaly(Anomaly::Infinite, infinite_count);
    }
    Ok(weights)
}

fn raw_weights(
    cmd: ArrayView2<f64>,
    m_var: ArrayView2<f64>,
    d_var: ArrayView2<f64>,
    ne: f64,
    epsilon: f64,
) -> Array2<f64> {
    let mut weights = Array2::<f64>::zeros(cmd.raw_dim());
    Zip::indexed(&mut weights)
        .and(&cmd)
        .par_for_each(|(i, j), weight, &c| {
            let cmd2 = c * c;
            let cmmdd = m_var[[i, 0]] * d_var[[j, 0]];
            *weight = if c.abs() < epsilon * cmmdd.sqrt() {
                0.0
            } else {
                cmd2 / (cmd2 + (cmd2 + cmmdd) / ne)
            };
        });
    weights
}

fn replace_non_finite(weights: &mut Array2<f64>) -> (usize, usize) {
    let mut nan_count = 0;
    let mut infinite_count = 0;
    for weight in weights.iter_mut() {
        if weight.is_nan() {
            nan_count += 1;
            *weight = Anomaly::NaN.replacement();
        } else if weight.is_infinite() {
            infinite_count += 1;
            *weight = Anomaly::Infinite.replacement();
        }
    }
    (nan_count, infinite_count)
}

/// Localization matrix for parameters `m` (p × s) and observations `d` (q × s),
/// both with variables as rows and samples as columns.
pub fn calculate_localization<S1, S2, D1, D2>(
    m: &ArrayBase<S1, D1>,
    d: &ArrayBase<S2, D2>,
    ensemble_size: usize,
    epsilon: f64,
) -> Result<Array2<f64>, LocalizationError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D1: Dimension,
    D2: Dimension,
{
    calculate_localization_with_observer(m, d, ensemble_size, epsilon, &mut NoopObserver)
}

pub fn calculate_localization_with_observer<S1, S2, D1, D2, O>(
    m: &ArrayBase<S1, D1>,
    d: &ArrayBase<S2, D2>,
    ensemble_size: usize,
    epsilon: f64,
    observer: &mut O,
) -> Result<Array2<f64>, LocalizationError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D1: Dimension,
    D2: Dimension,
    O: StageObserver + ?Sized,
{
    let (cmd, m_var, d_var) = timed(observer, PipelineStage::CrossCovariance, || {
        Ok::<_, LocalizationError>((
            crosscov(m, d)?,
            named_variance("M", m)?,
            named_variance("D", d)?,
        ))
    })?;
    log::debug!(
        "Cross-covariance of {} parameters and {} observations estimated",
        cmd.nrows(),
        cmd.ncols()
    );

    localize_with_observer(
        cmd.view(),
        m_var.view(),
        d_var.view(),
        ensemble_size,
        epsilon,
        observer,
    )
}
