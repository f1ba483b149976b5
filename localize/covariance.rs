use ndarray::{Array2, ArrayBase, ArrayView2, Axis, Data, Dimension, Ix2};

use super::LocalizationError;

/// Views `array` as a matrix, naming it in the error when it is not 2-D.
pub(crate) fn as_matrix<'a, S, D>(
    name: &'static str,
    array: &'a ArrayBase<S, D>,
) -> Result<ArrayView2<'a, f64>, LocalizationError>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    array
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| LocalizationError::RankMismatch {
            name,
            ndim: array.ndim(),
        })
}

fn require_samples(samples: usize) -> Result<(), LocalizationError> {
    if samples < 2 {
        return Err(LocalizationError::InsufficientSamples { samples });
    }
    Ok(())
}

/// Subtracts each row's mean. Rows holding a single repeated value center to
/// exact zeros, so their variance and every covariance they enter are exactly 0.
fn center_rows(a: ArrayView2<f64>) -> Array2<f64> {
    let mut centered = a.to_owned();
    for mut row in centered.rows_mut() {
        let Some(&first) = row.first() else {
            continue;
        };
        if row.iter().all(|&v| v == first) {
            row.fill(0.0);
        } else {
            let mean = row.sum() / row.len() as f64;
            row.mapv_inplace(|v| v - mean);
        }
    }
    centered
}

/// Sample cross-covariance between the rows of `m` (p × s) and the rows of `d`
/// (q × s), with Bessel's correction. Returns a (p × q) matrix.
pub fn crosscov<S1, S2, D1, D2>(
    m: &ArrayBase<S1, D1>,
    d: &ArrayBase<S2, D2>,
) -> Result<Array2<f64>, LocalizationError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D1: Dimension,
    D2: Dimension,
{
    let m = as_matrix("M", m)?;
    let d = as_matrix("D", d)?;
    if m.ncols() != d.ncols() {
        return Err(LocalizationError::SampleCountMismatch {
            m_samples: m.ncols(),
            d_samples: d.ncols(),
        });
    }
    let samples = m.ncols();
    require_samples(samples)?;

    let m_centered = center_rows(m);
    let d_centered = center_rows(d);
    Ok(m_centered.dot(&d_centered.t()) / (samples - 1) as f64)
}

/// Per-row sample variance (ddof = 1) of a (p × s) matrix, as a (p × 1) column.
pub fn variance<S, D>(m: &ArrayBase<S, D>) -> Result<Array2<f64>, LocalizationError>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    named_variance("M", m)
}

pub(crate) fn named_variance<S, D>(
    name: &'static str,
    m: &ArrayBase<S, D>,
) -> Result<Array2<f64>, LocalizationError>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let m = as_matrix(name, m)?;
    let samples = m.ncols();
    require_samples(samples)?;

    // centered exactly as in crosscov
    let squares = center_rows(m).mapv(|v| v * v).sum_axis(Axis(1));
    Ok((squares / (samples - 1) as f64).insert_axis(Axis(1)))
}
