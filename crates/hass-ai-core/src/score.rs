//! Importance score produced for one entity

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{EntityId, MAX_WEIGHT};

/// Functional category of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Data,
    Control,
    Alerts,
    Service,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Data,
        Category::Control,
        Category::Alerts,
        Category::Service,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Data => "DATA",
            Category::Control => "CONTROL",
            Category::Alerts => "ALERTS",
            Category::Service => "SERVICE",
        }
    }
}

impl FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DATA" => Ok(Category::Data),
            "CONTROL" => Ok(Category::Control),
            "ALERTS" => Ok(Category::Alerts),
            "SERVICE" => Ok(Category::Service),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-empty set of categories
///
/// Construction through [`CategorySet::from_labels`] or `FromIterator`
/// falls back to `{DATA}` when nothing valid is supplied, so an empty set
/// can never be observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CategorySet(BTreeSet<Category>);

impl CategorySet {
    pub fn single(category: Category) -> Self {
        Self(BTreeSet::from([category]))
    }

    /// Normalize free-form labels (`"data, alerts"`, `"CONTROL/SERVICE"`)
    /// into a set, dropping anything that is not a known category
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        labels
            .into_iter()
            .flat_map(|label| {
                label
                    .as_ref()
                    .split(|c: char| c == ',' || c == '/' || c == '|' || c.is_whitespace())
                    .filter_map(|part| part.parse::<Category>().ok())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn insert(&mut self, category: Category) {
        self.0.insert(category);
    }

    pub fn contains(&self, category: Category) -> bool {
        self.0.contains(&category)
    }

    pub fn iter(&self) -> impl Iterator<Item = Category> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with collections
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self::single(Category::Data)
    }
}

impl FromIterator<Category> for CategorySet {
    fn from_iter<I: IntoIterator<Item = Category>>(iter: I) -> Self {
        let set: BTreeSet<Category> = iter.into_iter().collect();
        if set.is_empty() {
            Self::default()
        } else {
            Self(set)
        }
    }
}

impl<'de> Deserialize<'de> for CategorySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Labels {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Option::<Labels>::deserialize(deserializer)? {
            Some(Labels::One(label)) => Self::from_labels([label]),
            Some(Labels::Many(labels)) => Self::from_labels(labels),
            None => Self::default(),
        })
    }
}

/// Who is expected to interact with an entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ManagementType {
    #[default]
    User,
    Service,
}

impl ManagementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagementType::User => "USER",
            ManagementType::Service => "SERVICE",
        }
    }
}

/// Anything other than "service" (any case) maps to USER
impl From<&str> for ManagementType {
    fn from(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("service") {
            ManagementType::Service
        } else {
            ManagementType::User
        }
    }
}

impl From<String> for ManagementType {
    fn from(s: String) -> Self {
        ManagementType::from(s.as_str())
    }
}

impl From<ManagementType> for String {
    fn from(m: ManagementType) -> String {
        m.as_str().to_string()
    }
}

/// How a result was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Ai,
    Fallback,
}

/// Importance score for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub entity_id: EntityId,
    #[serde(rename = "overall_weight")]
    pub weight: u8,
    #[serde(rename = "overall_reason")]
    pub reason: String,
    #[serde(rename = "category", default)]
    pub categories: CategorySet,
    #[serde(default)]
    pub management_type: ManagementType,
    #[serde(rename = "analysis_method")]
    pub method: Method,
    #[serde(default)]
    pub batch_number: u32,
}

impl ScoreResult {
    /// Build a result, clamping `weight` into `0..=5`
    pub fn new(
        entity_id: EntityId,
        weight: u8,
        reason: impl Into<String>,
        categories: CategorySet,
        management_type: ManagementType,
        method: Method,
        batch_number: u32,
    ) -> Self {
        Self {
            entity_id,
            weight: weight.min(MAX_WEIGHT),
            reason: reason.into(),
            categories,
            management_type,
            method,
            batch_number,
        }
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.categories.contains(category)
    }
}
