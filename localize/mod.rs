//! Sample statistics of the super ensemble and the localization weights derived
//! from them.

use thiserror::Error;

pub mod covariance;
pub mod weights;

pub use covariance::{crosscov, variance};
pub use weights::{
    DEFAULT_EPSILON, calculate_localization, calculate_localization_with_observer, localize,
    localize_with_observer,
};

#[derive(Error, Debug)]
pub enum LocalizationError {
    #[error("Input matrix '{name}' must be 2-dimensional, but has {ndim} dimension(s).")]
    RankMismatch { name: &'static str, ndim: usize },

    #[error(
        "M and D must have the same number of samples (columns). Got {m_samples} and {d_samples}."
    )]
    SampleCountMismatch { m_samples: usize, d_samples: usize },

    #[error(
        "Incompatible shapes: Cmd {cmd:?}, m_var {m_var:?}, d_var {d_var:?}. Expected Cmd (p, q), m_var (p, 1) and d_var (q, 1)."
    )]
    ShapeMismatch {
        cmd: (usize, usize),
        m_var: (usize, usize),
        d_var: (usize, usize),
    },

    #[error("At least 2 samples are required to estimate covariances, got {samples}.")]
    InsufficientSamples { samples: usize },

    #[error("The original ensemble size must be positive.")]
    InvalidEnsembleSize,

    #[error("epsilon must be a non-negative number, got {0}.")]
    InvalidEpsilon(f64),
}
