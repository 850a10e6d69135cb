//! YAML loading with `!secret` and `!env_var` substitution

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;

/// Loads YAML documents and resolves the supported custom tags
pub struct YamlLoader {
    secrets: Secrets,
}

impl YamlLoader {
    pub fn new(secrets: Secrets) -> Self {
        Self { secrets }
    }

    /// Loader whose secrets come from `secrets.yaml` next to `config_file`
    pub fn for_file(config_file: &Path) -> ConfigResult<Self> {
        let dir = config_file.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self::new(Secrets::load(dir)?))
    }

    pub fn load_file(&self, path: &Path) -> ConfigResult<Value> {
        debug!(?path, "loading YAML file");
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_str(&content, path)
    }

    pub fn load_str(&self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value =
            serde_yaml::from_str(content).map_err(|source| ConfigError::ParseYaml {
                path: PathBuf::from(source_path),
                source,
            })?;
        self.resolve(value)
    }

    fn resolve(&self, value: Value) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.resolve_tagged(*tagged),
            Value::Mapping(map) => {
                let mut out = Mapping::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(self.resolve(k)?, self.resolve(v)?);
                }
                Ok(Value::Mapping(out))
            }
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.resolve(v))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other),
        }
    }

    fn resolve_tagged(&self, tagged: TaggedValue) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!(%tag, "resolving tag");

        match tag.as_str() {
            "!secret" => {
                let key = tag_argument(&tag, tagged.value)?;
                Ok(Value::String(self.secrets.get(&key)?.to_string()))
            }
            "!env_var" => {
                let arg = tag_argument(&tag, tagged.value)?;
                let (var, default) = match arg.split_once(char::is_whitespace) {
                    Some((var, default)) => (var.to_string(), Some(default.trim().to_string())),
                    None => (arg, None),
                };
                match std::env::var(&var) {
                    Ok(v) => Ok(Value::String(v)),
                    Err(_) => default
                        .map(Value::String)
                        .ok_or(ConfigError::EnvVarNotFound { var }),
                }
            }
            _ => Ok(Value::Tagged(Box::new(TaggedValue {
                tag: tagged.tag,
                value: self.resolve(tagged.value)?,
            }))),
        }
    }
}

fn tag_argument(tag: &str, value: Value) -> ConfigResult<String> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(ConfigError::InvalidValue {
            key: tag.to_string(),
            reason: "argument must be a string".to_string(),
        }),
    }
}
