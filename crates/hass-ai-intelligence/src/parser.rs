//! Agent response parsing
//!
//! The raw text is first scanned for token-limit phrases, then stripped of
//! markdown fences and decoded as strict JSON. Each entity of the batch gets
//! either a [`ScoreResult`] or the reason it has to fall back.

use std::collections::HashMap;
use std::sync::OnceLock;

use hass_ai_core::{CategorySet, EntitySnapshot, ManagementType, Method, ScoreResult, MAX_WEIGHT};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ItemRejection, ParseFailure};

/// Substrings that mark a reply or error as a token or context limit
///
/// Matched case-insensitively anywhere in the text, so `"token"` also covers
/// `"tokens"`, `"max_tokens"` and `"token limit"`.
pub const TOKEN_LIMIT_KEYWORDS: &[&str] = &[
    "exceed",
    "token",
    "context length",
    "context_length",
    "context window",
    "quota",
    "resource_exhausted",
    "prompt is too long",
    "input is too long",
];

/// Outcome for one entity of a parsed batch
pub type ItemVerdict = Result<ScoreResult, ItemRejection>;

/// Case-insensitive scan for any token-limit phrase
pub fn mentions_token_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    TOKEN_LIMIT_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n?(.*?)\s*```\s*$").ok())
        .as_ref()
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_fences(raw: &str) -> &str {
    match fence_regex()
        .and_then(|re| re.captures(raw))
        .and_then(|c| c.get(1))
    {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    }
}

/// Parse one agent reply for `batch`
///
/// Items whose `entity_id` is not part of the batch are ignored. When an
/// entity appears more than once the last valid item wins.
pub fn parse_response(
    raw: &str,
    batch: &[EntitySnapshot],
    batch_number: u32,
) -> Result<Vec<(EntitySnapshot, ItemVerdict)>, ParseFailure> {
    if mentions_token_limit(raw) {
        return Err(ParseFailure::TokenLimit);
    }

    let body = strip_fences(raw);
    let value: Value =
        serde_json::from_str(body).map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("results").or_else(|| map.remove("entities")) {
            Some(Value::Array(items)) => items,
            _ => return Err(ParseFailure::NotAnArray),
        },
        _ => return Err(ParseFailure::NotAnArray),
    };

    let mut verdicts: HashMap<String, ItemVerdict> = HashMap::new();
    for item in &items {
        let Some(entity_id) = item.get("entity_id").and_then(Value::as_str) else {
            warn!(%item, "response item without entity_id");
            continue;
        };
        let Some(entity) = batch.iter().find(|e| e.entity_id.as_str() == entity_id) else {
            debug!(entity_id, "response item for entity outside the batch");
            continue;
        };

        let verdict = parse_item(item, entity, batch_number);
        let keep_previous = verdict.is_err()
            && verdicts
                .get(entity_id)
                .is_some_and(|previous| previous.is_ok());
        if !keep_previous {
            verdicts.insert(entity_id.to_string(), verdict);
        }
    }

    Ok(batch
        .iter()
        .map(|entity| {
            let verdict = verdicts
                .remove(entity.entity_id.as_str())
                .unwrap_or(Err(ItemRejection::Missing));
            (entity.clone(), verdict)
        })
        .collect())
}

fn parse_item(item: &Value, entity: &EntitySnapshot, batch_number: u32) -> ItemVerdict {
    let rating = item
        .get("rating")
        .ok_or(ItemRejection::MissingKey("rating"))?;
    let reason = item
        .get("reason")
        .and_then(Value::as_str)
        .ok_or(ItemRejection::MissingKey("reason"))?;

    let weight = parse_rating(rating)?;

    let categories = match item.get("category").or_else(|| item.get("categories")) {
        Some(Value::String(label)) => CategorySet::from_labels([label.as_str()]),
        Some(Value::Array(labels)) => {
            CategorySet::from_labels(labels.iter().filter_map(Value::as_str))
        }
        _ => CategorySet::default(),
    };

    let management_type = item
        .get("management_type")
        .and_then(Value::as_str)
        .map(ManagementType::from)
        .unwrap_or_default();

    Ok(ScoreResult::new(
        entity.entity_id.clone(),
        weight,
        reason.trim(),
        categories,
        management_type,
        Method::Ai,
        batch_number,
    ))
}

fn parse_rating(rating: &Value) -> Result<u8, ItemRejection> {
    let number = match rating {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 => f as i64,
                    _ => return Err(ItemRejection::RatingNotInteger(n.to_string())),
                }
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| ItemRejection::RatingNotInteger(s.clone()))?,
        other => return Err(ItemRejection::RatingNotInteger(other.to_string())),
    };

    u8::try_from(number)
        .ok()
        .filter(|w| *w <= MAX_WEIGHT)
        .ok_or_else(|| ItemRejection::RatingOutOfRange(number.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hass_ai_core::Category;
    use std::collections::HashMap as Map;

    fn entity(id: &str) -> EntitySnapshot {
        EntitySnapshot::new(id.parse().unwrap(), "on", Map::new())
    }

    #[test]
    fn test_fenced_json() {
        let raw = "```json\n[{\"entity_id\":\"light.x\",\"rating\":3,\"reason\":\"ok\"}]\n```";
        let parsed = parse_response(raw, &[entity("light.x")], 1).unwrap();
        let result = parsed[0].1.as_ref().unwrap();
        assert_eq!(result.weight, 3);
        assert_eq!(result.reason, "ok");
        assert_eq!(result.method, Method::Ai);
        assert_eq!(result.categories, CategorySet::single(Category::Data));
        assert_eq!(result.management_type, ManagementType::User);
    }

    #[test]
    fn test_token_limit_wins_over_json() {
        let batch = [entity("light.x")];
        assert_eq!(
            parse_response("Error: token limit exceeded", &batch, 1),
            Err(ParseFailure::TokenLimit)
        );
        let json_with_phrase = r#"[{"entity_id":"light.x","rating":3,"reason":"Token limit exceeded"}]"#;
        assert_eq!(
            parse_response(json_with_phrase, &batch, 1),
            Err(ParseFailure::TokenLimit)
        );
        assert!(mentions_token_limit("This model's maximum context length is 4096"));
        assert!(mentions_token_limit("You EXCEEDED YOUR CURRENT QUOTA"));
        assert!(!mentions_token_limit("all good"));
    }

    #[test]
    fn test_short_limit_phrasings() {
        for text in [
            "Request exceeds the model limit",
            "Quota reached for this agent, try later",
            "Too many input tokens for this model",
            "The prompt exceeded the allowed size",
            "CONTEXT LENGTH reached",
        ] {
            assert!(mentions_token_limit(text), "{text}");
        }
        assert_eq!(
            parse_response("Quota reached", &[entity("light.x")], 1),
            Err(ParseFailure::TokenLimit)
        );
        assert!(!mentions_token_limit("connection refused"));
    }

    #[test]
    fn test_invalid_json_and_non_array() {
        let batch = [entity("light.x")];
        assert!(matches!(
            parse_response("I think the light is important", &batch, 1),
            Err(ParseFailure::InvalidJson(_))
        ));
        assert_eq!(
            parse_response(r#"{"rating": 3}"#, &batch, 1),
            Err(ParseFailure::NotAnArray)
        );
        assert_eq!(parse_response("42", &batch, 1), Err(ParseFailure::NotAnArray));
    }

    #[test]
    fn test_wrapped_results_object() {
        let raw = r#"{"results": [{"entity_id":"light.x","rating":"4","reason":"used daily"}]}"#;
        let parsed = parse_response(raw, &[entity("light.x")], 2).unwrap();
        let result = parsed[0].1.as_ref().unwrap();
        assert_eq!(result.weight, 4);
        assert_eq!(result.batch_number, 2);
    }

    #[test]
    fn test_per_item_rejections() {
        let batch = [
            entity("light.a"),
            entity("light.b"),
            entity("light.c"),
            entity("light.d"),
            entity("light.e"),
        ];
        let raw = r#"[
            {"entity_id":"light.a","rating":7,"reason":"too high"},
            {"entity_id":"light.b","rating":2.5,"reason":"fraction"},
            {"entity_id":"light.c","reason":"no rating"},
            {"entity_id":"light.d","rating":1},
            {"entity_id":"light.zzz","rating":1,"reason":"not in batch"}
        ]"#;
        let parsed = parse_response(raw, &batch, 1).unwrap();
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[0].1, Err(ItemRejection::RatingOutOfRange("7".into())));
        assert!(matches!(parsed[1].1, Err(ItemRejection::RatingNotInteger(_))));
        assert_eq!(parsed[2].1, Err(ItemRejection::MissingKey("rating")));
        assert_eq!(parsed[3].1, Err(ItemRejection::MissingKey("reason")));
        assert_eq!(parsed[4].1, Err(ItemRejection::Missing));
    }

    #[test]
    fn test_negative_rating_rejected_and_float_integral_accepted() {
        let batch = [entity("light.a"), entity("light.b")];
        let raw = r#"[{"entity_id":"light.a","rating":-1,"reason":"x"},{"entity_id":"light.b","rating":5.0,"reason":"y"}]"#;
        let parsed = parse_response(raw, &batch, 1).unwrap();
        assert_eq!(parsed[0].1, Err(ItemRejection::RatingOutOfRange("-1".into())));
        assert_eq!(parsed[1].1.as_ref().unwrap().weight, 5);
    }

    #[test]
    fn test_categories_and_management_normalized() {
        let batch = [entity("lock.door"), entity("sensor.t")];
        let raw = r#"[
            {"entity_id":"lock.door","rating":5,"reason":"security","category":["control","SERVICE","HEALTH"],"management_type":"service"},
            {"entity_id":"sensor.t","rating":2,"reason":"temp","category":"DATA/ALERTS","management_type":"Robot"}
        ]"#;
        let parsed = parse_response(raw, &batch, 1).unwrap();

        let lock = parsed[0].1.as_ref().unwrap();
        assert_eq!(
            lock.categories.iter().collect::<Vec<_>>(),
            vec![Category::Control, Category::Service]
        );
        assert_eq!(lock.management_type, ManagementType::Service);

        let sensor = parsed[1].1.as_ref().unwrap();
        assert!(sensor.has_category(Category::Alerts));
        assert_eq!(sensor.management_type, ManagementType::User);
    }

    #[test]
    fn test_strip_fences_variants() {
        assert_eq!(strip_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_fences("  ```JSON [2] ```  "), "[2]");
        assert_eq!(strip_fences("  [3]\n"), "[3]");
    }
}
