//! Errors raised while reading `hass_ai.yaml`

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid YAML: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("secret '{key}' not found in secrets.yaml")]
    SecretNotFound { key: String },

    #[error("environment variable '{var}' not set")]
    EnvVarNotFound { var: String },

    /// A setting is present but out of range or of the wrong shape
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}
