#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod boosting;
pub mod config;
pub mod kernel;
pub mod linalg;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod regressor;
#[path = "../shared/matrix.rs"]
pub mod shared_matrix;
pub mod shared {
    pub use super::shared_matrix as matrix;
}

#[path = "../localize/mod.rs"]
pub mod localize;

pub use config::SuperlocConfig;
pub use model::{SurrogateError, TrainedSurrogate};
pub use pipeline::{
    PipelineError, PipelineOutput, run_pipeline, run_pipeline_with_observer,
    super_ensemble_localization, super_ensemble_localization_with_observer,
    validate_matrix_compatibility,
};
pub use regressor::RegressorConfig;
