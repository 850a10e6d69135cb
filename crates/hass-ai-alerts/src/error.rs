use thiserror::Error;

use crate::AlertLevel;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("{0} is not suitable for alert monitoring")]
    InvalidEntity(String),

    #[error("invalid {level} threshold: {value}")]
    InvalidThreshold { level: AlertLevel, value: String },

    #[error("no thresholds given for {0}")]
    NoThresholds(String),

    #[error("weight {0} is outside 1..=5")]
    InvalidWeight(u8),

    #[error("failed to deliver notification: {0}")]
    Delivery(#[from] hass_ai_core::ServiceCallError),

    #[error("invalid message template: {0}")]
    Template(String),

    #[error(transparent)]
    Storage(#[from] hass_ai_storage::StorageError),
}

pub type AlertResult<T> = Result<T, AlertError>;
