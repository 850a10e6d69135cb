//! Entity identifier (`domain.object_id`)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reasons an entity identifier is rejected
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id '{0}' is not of the form domain.object_id")]
    InvalidFormat(String),

    #[error("entity_id '{0}' has an invalid domain")]
    InvalidDomain(String),

    #[error("entity_id '{0}' has an invalid object_id")]
    InvalidObjectId(String),
}

/// A Home Assistant entity identifier such as `sensor.battery_1`
///
/// Both halves are lowercase ASCII alphanumerics and underscores, never
/// starting or ending with an underscore. The domain may not contain `__`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    full: String,
    dot: usize,
}

impl EntityId {
    pub fn domain(&self) -> &str {
        &self.full[..self.dot]
    }

    pub fn object_id(&self) -> &str {
        &self.full[self.dot + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }

    fn valid_part(part: &str) -> bool {
        !part.is_empty()
            && !part.starts_with('_')
            && !part.ends_with('_')
            && part
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    }
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (domain, object_id) = s
            .split_once('.')
            .ok_or_else(|| EntityIdError::InvalidFormat(s.to_string()))?;
        if object_id.contains('.') {
            return Err(EntityIdError::InvalidFormat(s.to_string()));
        }
        if !Self::valid_part(domain) || domain.contains("__") {
            return Err(EntityIdError::InvalidDomain(s.to_string()));
        }
        if !Self::valid_part(object_id) {
            return Err(EntityIdError::InvalidObjectId(s.to_string()));
        }
        Ok(Self {
            full: s.to_string(),
            dot: domain.len(),
        })
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.full
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.full
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts() {
        let id: EntityId = "sensor.battery_1".parse().unwrap();
        assert_eq!(id.domain(), "sensor");
        assert_eq!(id.object_id(), "battery_1");
        assert_eq!(id.as_str(), "sensor.battery_1");
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(matches!(
            "nodot".parse::<EntityId>(),
            Err(EntityIdError::InvalidFormat(_))
        ));
        assert!(matches!(
            "a.b.c".parse::<EntityId>(),
            Err(EntityIdError::InvalidFormat(_))
        ));
        assert!(matches!(
            ".x".parse::<EntityId>(),
            Err(EntityIdError::InvalidDomain(_))
        ));
        assert!(matches!(
            "light.".parse::<EntityId>(),
            Err(EntityIdError::InvalidObjectId(_))
        ));
        assert!(matches!(
            "Light.kitchen".parse::<EntityId>(),
            Err(EntityIdError::InvalidDomain(_))
        ));
        assert!(matches!(
            "my__light.kitchen".parse::<EntityId>(),
            Err(EntityIdError::InvalidDomain(_))
        ));
        assert!(matches!(
            "light._kitchen".parse::<EntityId>(),
            Err(EntityIdError::InvalidObjectId(_))
        ));
    }

    #[test]
    fn test_double_underscore_object_id_allowed() {
        assert!("light.my__room".parse::<EntityId>().is_ok());
    }

    #[test]
    fn test_serde_as_string() {
        let id: EntityId = "lock.front_door".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"lock.front_door\"");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<EntityId>("\"bad id\"").is_err());
    }
}
