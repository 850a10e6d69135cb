//! Threshold values and their evaluation against entity states
//!
//! A threshold is either a number or a boolean. Numbers carry an optional
//! direction: `"<= 15"` alerts when the value falls to 15 or below, `">30"`
//! when it rises to 30 or above. Without an explicit direction the monitor
//! infers one from the entity (see [`crate::validity::alerts_on_low`]).

use std::collections::BTreeMap;
use std::fmt;

use hass_ai_core::EntitySnapshot;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AlertError, AlertLevel, AlertResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdValue {
    Number {
        value: f64,
        direction: Option<Direction>,
    },
    Bool(bool),
}

const TRUE_WORDS: &[&str] = &["on", "true", "yes", "open", "detected"];
const FALSE_WORDS: &[&str] = &["off", "false", "no", "closed", "clear"];

impl ThresholdValue {
    pub fn number(value: f64) -> Self {
        ThresholdValue::Number {
            value,
            direction: None,
        }
    }

    /// Parse `"20"`, `"20%"`, `"<= 15"`, `">30 °C"`, `"on"`, `"false"`...
    pub fn parse_str(input: &str) -> Option<Self> {
        let s = input.trim().to_ascii_lowercase();
        if TRUE_WORDS.contains(&s.as_str()) {
            return Some(ThresholdValue::Bool(true));
        }
        if FALSE_WORDS.contains(&s.as_str()) {
            return Some(ThresholdValue::Bool(false));
        }

        let (direction, rest) = if let Some(rest) = s.strip_prefix('<') {
            (Some(Direction::Below), rest.trim_start_matches('='))
        } else if let Some(rest) = s.strip_prefix('>') {
            (Some(Direction::Above), rest.trim_start_matches('='))
        } else {
            (None, s.as_str())
        };

        let rest = rest.trim_start();
        let end = rest
            .char_indices()
            .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let value: f64 = rest[..end].parse().ok()?;
        value.is_finite().then_some(ThresholdValue::Number { value, direction })
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(ThresholdValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(ThresholdValue::number),
            Value::String(s) => Self::parse_str(s),
            _ => None,
        }
    }

    /// Whether `observed` trips this threshold
    pub fn is_met(&self, observed: Observed, alert_on_low: bool) -> bool {
        match (*self, observed) {
            (ThresholdValue::Bool(expected), Observed::Bool(actual)) => expected == actual,
            (ThresholdValue::Number { value, direction }, Observed::Number(actual)) => {
                let low = direction.map_or(alert_on_low, |d| d == Direction::Below);
                if low {
                    actual <= value
                } else {
                    actual >= value
                }
            }
            _ => false,
        }
    }
}

impl fmt::Display for ThresholdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdValue::Bool(b) => write!(f, "{b}"),
            ThresholdValue::Number {
                value,
                direction: None,
            } => write!(f, "{value}"),
            ThresholdValue::Number {
                value,
                direction: Some(Direction::Below),
            } => write!(f, "<{value}"),
            ThresholdValue::Number {
                value,
                direction: Some(Direction::Above),
            } => write!(f, ">{value}"),
        }
    }
}

impl Serialize for ThresholdValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ThresholdValue::Bool(b) => serializer.serialize_bool(*b),
            ThresholdValue::Number {
                value,
                direction: None,
            } => serializer.serialize_f64(*value),
            directed => serializer.serialize_str(&directed.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for ThresholdValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ThresholdValue::from_json(&value)
            .ok_or_else(|| de::Error::custom(format!("invalid threshold value: {value}")))
    }
}

/// Current value of an entity in a form thresholds can compare against
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observed {
    Number(f64),
    Bool(bool),
}

impl Observed {
    /// Binary sensors are `on`/not `on`; other entities are numeric, or
    /// boolean when their state is an on/off word
    pub fn from_snapshot(entity: &EntitySnapshot) -> Option<Self> {
        if entity.domain == "binary_sensor" {
            return Some(Observed::Bool(entity.state.eq_ignore_ascii_case("on")));
        }
        if let Some(n) = entity.numeric_state() {
            return Some(Observed::Number(n));
        }
        let state = entity.state.trim().to_ascii_lowercase();
        if TRUE_WORDS.contains(&state.as_str()) {
            Some(Observed::Bool(true))
        } else if FALSE_WORDS.contains(&state.as_str()) {
            Some(Observed::Bool(false))
        } else {
            None
        }
    }
}

/// Per-level thresholds of one entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Thresholds(BTreeMap<AlertLevel, ThresholdValue>);

impl Thresholds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, level: AlertLevel, value: ThresholdValue) -> Self {
        self.0.insert(level, value);
        self
    }

    pub fn uniform(value: ThresholdValue) -> Self {
        AlertLevel::BY_SEVERITY
            .into_iter()
            .fold(Self::new(), |t, level| t.with(level, value))
    }

    /// Parse a client-supplied object; level keys are case-insensitive and
    /// null values are skipped
    pub fn from_json(value: &Value) -> AlertResult<Self> {
        let Value::Object(map) = value else {
            return Err(AlertError::InvalidThreshold {
                level: AlertLevel::Warning,
                value: value.to_string(),
            });
        };
        let mut thresholds = Self::new();
        for (key, raw) in map {
            if raw.is_null() {
                continue;
            }
            let Some(level) = AlertLevel::parse(key) else {
                continue;
            };
            let parsed = ThresholdValue::from_json(raw).ok_or_else(|| AlertError::InvalidThreshold {
                level,
                value: raw.to_string(),
            })?;
            thresholds.0.insert(level, parsed);
        }
        Ok(thresholds)
    }

    pub fn get(&self, level: AlertLevel) -> Option<&ThresholdValue> {
        self.0.get(&level)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Most severe level whose threshold `observed` meets
    pub fn evaluate(&self, observed: Observed, alert_on_low: bool) -> Option<AlertLevel> {
        AlertLevel::BY_SEVERITY.into_iter().find(|level| {
            self.get(*level)
                .is_some_and(|t| t.is_met(observed, alert_on_low))
        })
    }
}
