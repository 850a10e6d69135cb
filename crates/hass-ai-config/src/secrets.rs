//! `secrets.yaml` lookup

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_yaml::Value;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Secrets loaded from `secrets.yaml`; scalars are kept as strings
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: HashMap<String, String>,
}

impl Secrets {
    /// Load `secrets.yaml` from `dir`; a missing file yields no secrets
    pub fn load(dir: &Path) -> ConfigResult<Self> {
        let path = dir.join("secrets.yaml");
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "no secrets.yaml");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::ReadFile { path, source }),
        };

        let raw: HashMap<String, Value> =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::ParseYaml {
                path: path.clone(),
                source,
            })?;

        let values = raw
            .into_iter()
            .filter_map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((k, v))
            })
            .collect::<HashMap<_, _>>();

        debug!(count = values.len(), "loaded secrets");
        Ok(Self { values })
    }

    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> ConfigResult<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::SecretNotFound {
                key: key.to_string(),
            })
    }
}
