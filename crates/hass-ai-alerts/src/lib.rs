//! Alert monitoring for HASS AI
//!
//! Entities the scanner flags with the ALERTS category are watched against
//! per-level thresholds (WARNING, ALERT, CRITICAL). Each pass evaluates the
//! entities whose check interval has elapsed, applies per-level throttling
//! and sends a single cumulative notification, either through a `notify`
//! service or by writing an `input_text` entity.

pub mod config;
mod error;
mod level;
pub mod message;
mod monitor;
pub mod report;
pub mod threshold;
pub mod validity;

pub use config::{AlertConfigData, DeliverySettingsUpdate, MonitoredEntity};
pub use error::{AlertError, AlertResult};
pub use level::{check_interval, AlertLevel};
pub use message::{fallback_message, AlertDetail, MessagePrompts};
pub use monitor::{
    evaluate_entity, AlertMonitor, INPUT_TEXT_MAX_CHARS, MONITORING_SIGNAL, NOTIFICATION_TITLE,
};
pub use report::{AlertReport, AlertStatus, AlertSummary};
pub use threshold::{Direction, Observed, ThresholdValue, Thresholds};
pub use validity::{auto_thresholds, is_valid_alert_entity};
