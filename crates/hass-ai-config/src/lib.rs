//! Configuration for the HASS AI service
//!
//! `hass_ai.yaml` is plain YAML with two Home Assistant tags:
//!
//! - `!secret key` - substitute from `secrets.yaml` next to the config file
//! - `!env_var NAME [default]` - substitute an environment variable
//!
//! ```ignore
//! use hass_ai_config::HassAiConfig;
//!
//! let config = HassAiConfig::load("/config/hass_ai.yaml")?;
//! let entry = config.integration.as_ref();
//! ```

mod error;
mod loader;
mod secrets;
mod settings;

pub use error::{ConfigError, ConfigResult};
pub use loader::YamlLoader;
pub use secrets::Secrets;
pub use settings::{
    check_batch_size, AlertSettings, ConfigEntry, HassAiConfig, HomeAssistantSettings,
    ScanSettings, ServerSettings, AUTO_AGENT,
};
