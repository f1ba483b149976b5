//! Run configuration read from an optional TOML file.
//!
//! ```toml
//! [regressor]
//! kind = "gradient_boosting"
//! n_estimators = 200
//! learning_rate = 0.05
//!
//! [localization]
//! epsilon = 1e-3
//! ```
//!
//! Every table and key is optional; missing entries take their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::localize::DEFAULT_EPSILON;
use crate::regressor::RegressorConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationConfig {
    /// Weights whose cross-covariance magnitude falls below
    /// `epsilon * sqrt(var_m * var_d)` are set to zero.
    pub epsilon: f64,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperlocConfig {
    pub regressor: RegressorConfig,
    pub localization: LocalizationConfig,
}

impl SuperlocConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.regressor
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let epsilon = self.localization.epsilon;
        if !(epsilon.is_finite() && epsilon >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "localization epsilon must be a non-negative number, got {epsilon}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boosting::BoostingParams;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_file_yields_defaults() {
        let config: SuperlocConfig = toml::from_str("").unwrap();
        assert_eq!(config, SuperlocConfig::default());
        assert_eq!(config.localization.epsilon, 1e-3);
        assert!(matches!(
            config.regressor,
            RegressorConfig::GradientBoosting(_)
        ));
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[regressor]
kind = "gradient_boosting"
learning_rate = 0.05
subsample = 0.8

[localization]
epsilon = 0.01
"#
        )
        .unwrap();

        let config = SuperlocConfig::load(file.path()).unwrap();
        assert_eq!(config.localization.epsilon, 0.01);
        assert_eq!(
            config.regressor,
            RegressorConfig::GradientBoosting(BoostingParams {
                learning_rate: 0.05,
                subsample: 0.8,
                ..BoostingParams::default()
            })
        );
    }

    #[test]
    fn invalid_values_are_rejected_on_load() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[localization]\nepsilon = -1.0").unwrap();
        assert!(matches!(
            SuperlocConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[regressor]\nkind = \"gradient_boosting\"\nlearning_rate = 0.0").unwrap();
        assert!(matches!(
            SuperlocConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn unknown_regressor_kind_is_a_parse_error() {
        let parsed = toml::from_str::<SuperlocConfig>("[regressor]\nkind = \"neural_net\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = SuperlocConfig::load(Path::new("/nonexistent/superloc.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/superloc.toml"));
    }
}
