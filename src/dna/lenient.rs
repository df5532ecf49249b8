//! Resilient JSON parsing for provider replies
//!
//! Text-generation providers return JSON wrapped in prose or code fences,
//! and occasionally truncated mid-object. This parser extracts the object,
//! repairs unterminated strings and brackets, and overlays the result on
//! documented defaults. It never fails; `used_defaults` says whether any
//! field fell back.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Parse outcome tagged with whether defaults were substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct Lenient<T> {
    pub value: T,
    pub used_defaults: bool,
    pub issues: Vec<String>,
}

/// Parse `text` into `T`, falling back field-by-field to `T::default()`.
pub fn parse_lenient<T>(text: &str) -> Lenient<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    let mut issues = Vec::new();
    let defaults = serde_json::to_value(T::default()).unwrap_or(Value::Null);

    let parsed = match extract_object(text) {
        Some(candidate) => match serde_json::from_str::<Value>(candidate) {
            Ok(v) => Some(v),
            Err(e) => {
                issues.push(format!("malformed json ({e}); attempting repair"));
                let repaired = repair_truncated(candidate);
                match serde_json::from_str::<Value>(&repaired) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        issues.push(format!("repair failed: {e}"));
                        None
                    }
                }
            }
        },
        None => {
            issues.push("no json object found in reply".to_string());
            None
        }
    };

    let found = match parsed {
        Some(Value::Object(map)) => map,
        other => {
            if other.is_some() {
                issues.push("reply was json but not an object".to_string());
            }
            return Lenient {
                value: T::default(),
                used_defaults: true,
                issues,
            };
        }
    };

    let mut used_defaults = false;
    let merged = match defaults {
        Value::Object(mut base) => {
            for key in base.keys() {
                if found.get(key).map_or(true, Value::is_null) {
                    issues.push(format!("field `{key}` missing; using default"));
                    used_defaults = true;
                }
            }
            overlay(&mut base, found);
            Value::Object(base)
        }
        _ => Value::Object(found),
    };

    match serde_json::from_value::<T>(merged.clone()) {
        Ok(value) => Lenient {
            value,
            used_defaults,
            issues,
        },
        Err(e) => {
            // A field had the wrong type: drop offending keys one by one.
            issues.push(format!("type mismatch ({e}); dropping bad fields"));
            let value = salvage::<T>(merged, &mut issues);
            Lenient {
                value,
                used_defaults: true,
                issues,
            }
        }
    }
}

/// Overlay non-null values from `found` onto `base`.
fn overlay(base: &mut Map<String, Value>, found: Map<String, Value>) {
    for (key, value) in found {
        if !value.is_null() {
            base.insert(key, value);
        }
    }
}

fn salvage<T>(merged: Value, issues: &mut Vec<String>) -> T
where
    T: DeserializeOwned + Serialize + Default,
{
    let Value::Object(mut map) = merged else {
        return T::default();
    };
    let defaults = match serde_json::to_value(T::default()) {
        Ok(Value::Object(d)) => d,
        _ => return T::default(),
    };
    let keys: Vec<String> = map.keys().cloned().collect();
    for key in keys {
        let mut probe = defaults.clone();
        if let Some(v) = map.get(&key) {
            probe.insert(key.clone(), v.clone());
        }
        if serde_json::from_value::<T>(Value::Object(probe)).is_err() {
            issues.push(format!("field `{key}` has wrong type; using default"));
            match defaults.get(&key) {
                Some(d) => {
                    map.insert(key, d.clone());
                }
                None => {
                    map.remove(&key);
                }
            }
        }
    }
    serde_json::from_value(Value::Object(map)).unwrap_or_default()
}

/// The outermost `{ ... }` region, tolerating a missing closing brace.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    match text.rfind('}') {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => Some(&text[start..]),
    }
}

/// Close unterminated strings and brackets left by a truncated reply.
fn repair_truncated(candidate: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in candidate.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut repaired = candidate.trim_end().to_string();
    if in_string {
        repaired.push('"');
    }
    // a dangling separator or key cannot be closed meaningfully
    loop {
        let trimmed = repaired.trim_end();
        let dangling_key = trimmed.ends_with(':');
        if !dangling_key && !trimmed.ends_with(',') {
            break;
        }
        let cut = trimmed.len() - 1;
        repaired.truncate(cut);
        if dangling_key {
            drop_dangling_key(&mut repaired);
        }
    }
    while let Some(close) = stack.pop() {
        repaired.push(close);
    }
    repaired
}

/// Remove a trailing `"key"` (and its leading comma) left without a value.
fn drop_dangling_key(repaired: &mut String) {
    let trimmed_len = repaired.trim_end().len();
    repaired.truncate(trimmed_len);
    if repaired.ends_with('"') {
        if let Some(open) = repaired[..repaired.len() - 1].rfind('"') {
            repaired.truncate(open);
            let trimmed_len = repaired.trim_end().len();
            repaired.truncate(trimmed_len);
            if repaired.ends_with(',') {
                repaired.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Proposal {
        style: String,
        floors: u32,
        materials: Vec<String>,
    }

    impl Default for Proposal {
        fn default() -> Self {
            Self {
                style: "contemporary".into(),
                floors: 1,
                materials: Vec::new(),
            }
        }
    }

    #[test]
    fn test_clean_json_inside_code_fence() {
        let text = "Here you go:\n```json\n{\"style\": \"tudor\", \"floors\": 2, \"materials\": [\"brick\"]}\n```";
        let parsed: Lenient<Proposal> = parse_lenient(text);
        assert!(!parsed.used_defaults);
        assert_eq!(parsed.value.style, "tudor");
        assert_eq!(parsed.value.floors, 2);
    }

    #[test]
    fn test_truncated_reply_is_repaired() {
        let text = r#"{"style": "tudor", "floors": 3, "materials": ["brick", "oak"#;
        let parsed: Lenient<Proposal> = parse_lenient(text);
        assert_eq!(parsed.value.floors, 3);
        assert_eq!(parsed.value.materials, vec!["brick", "oak"]);
    }

    #[test]
    fn test_truncated_after_key_drops_it() {
        let text = r#"{"style": "tudor", "floors":"#;
        let parsed: Lenient<Proposal> = parse_lenient(text);
        assert_eq!(parsed.value.style, "tudor");
        assert_eq!(parsed.value.floors, 1);
        assert!(parsed.used_defaults);
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let parsed: Lenient<Proposal> = parse_lenient("sorry, I cannot help with that");
        assert!(parsed.used_defaults);
        assert_eq!(parsed.value, Proposal::default());
        assert!(!parsed.issues.is_empty());
    }

    #[test]
    fn test_wrong_field_type_is_salvaged() {
        let parsed: Lenient<Proposal> =
            parse_lenient(r#"{"style": "barn", "floors": "many", "materials": ["timber"]}"#);
        assert!(parsed.used_defaults);
        assert_eq!(parsed.value.style, "barn");
        assert_eq!(parsed.value.floors, 1);
        assert_eq!(parsed.value.materials, vec!["timber"]);
    }
}
