//! Normalization of untrusted settings input.
//!
//! Nothing here fails: malformed values are coerced to defaults, unusable
//! entries are dropped, and the result always satisfies the snapshot
//! invariants (valid enums, unique non-empty shortcut ids, non-empty labels).

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::provider::{OpenMode, Provider};
use crate::settings::{PersistedSettings, SettingsSnapshot, ShortcutEntry};

pub const DERIVED_ID_MAX_CHARS: usize = 40;
pub const LEGACY_ORDER_CAP: usize = 256;
const FALLBACK_ID: &str = "item";

/// Raw storage text that cannot hold a snapshot: blank, the stringified
/// `undefined`/`null` sentinels, or anything not opening a JSON object or
/// array.
pub fn is_corrupted_raw(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty()
        || trimmed == "undefined"
        || trimmed == "null"
        || !(trimmed.starts_with('{') || trimmed.starts_with('['))
}

pub fn sanitize_provider(value: Option<&Value>) -> Provider {
    value
        .and_then(Value::as_str)
        .and_then(Provider::parse)
        .unwrap_or_default()
}

pub fn sanitize_open_mode(value: Option<&Value>) -> OpenMode {
    value
        .and_then(Value::as_str)
        .map(OpenMode::coerce)
        .unwrap_or_default()
}

/// Slug for an entry that arrived without an id.
pub fn derive_id(label: &str) -> String {
    let slug: String = label
        .to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(DERIVED_ID_MAX_CHARS)
        .collect();
    if slug.is_empty() {
        FALLBACK_ID.to_string()
    } else {
        slug
    }
}

fn build_entry(id: &str, label: &str, icon: &str, href: &str) -> ShortcutEntry {
    let label = label.trim();
    let mut id = id.trim().to_string();
    if id.is_empty() {
        id = derive_id(label);
    }
    let label = if label.is_empty() {
        id.clone()
    } else {
        label.to_string()
    };

    ShortcutEntry {
        id,
        label,
        icon: icon.trim().to_string(),
        href: href.trim().to_string(),
    }
}

fn string_field<'a>(object: &'a Map<String, Value>, key: &str) -> &'a str {
    object.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Normalizes one persisted entry; `None` for anything that is not a JSON
/// object.
pub fn normalize_shortcut_value(value: &Value) -> Option<ShortcutEntry> {
    let object = value.as_object()?;
    Some(build_entry(
        string_field(object, "id"),
        string_field(object, "label"),
        string_field(object, "icon"),
        string_field(object, "href"),
    ))
}

/// Normalizes an entry supplied by the user. Entries with neither an id nor
/// a label cannot be identified and are rejected.
pub fn normalize_shortcut(entry: &ShortcutEntry) -> Option<ShortcutEntry> {
    if entry.id.trim().is_empty() && entry.label.trim().is_empty() {
        return None;
    }
    Some(build_entry(&entry.id, &entry.label, &entry.icon, &entry.href))
}

/// Keeps the first entry for every id.
pub fn dedupe_shortcuts<I>(entries: I) -> Vec<ShortcutEntry>
where
    I: IntoIterator<Item = ShortcutEntry>,
{
    let mut seen = BTreeSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.id.clone()))
        .collect()
}

pub fn normalize_shortcuts(values: &[Value]) -> Vec<ShortcutEntry> {
    dedupe_shortcuts(values.iter().filter_map(normalize_shortcut_value))
}

pub fn normalize_shortcut_entries(entries: &[ShortcutEntry]) -> Vec<ShortcutEntry> {
    dedupe_shortcuts(entries.iter().filter_map(normalize_shortcut))
}

/// The bare id list written by the first settings schema: trimmed, unique,
/// non-empty strings, at most [`LEGACY_ORDER_CAP`] of them. `None` when
/// nothing usable remains.
pub fn sanitize_legacy_order(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for item in items {
        let Some(id) = item.as_str().map(str::trim) else {
            continue;
        };
        if id.is_empty() || !seen.insert(id.to_string()) {
            continue;
        }
        out.push(id.to_string());
        if out.len() >= LEGACY_ORDER_CAP {
            break;
        }
    }
    if out.is_empty() { None } else { Some(out) }
}

pub fn legacy_entries(order: &[String]) -> Vec<ShortcutEntry> {
    order
        .iter()
        .map(|id| ShortcutEntry {
            id: id.clone(),
            label: id.clone(),
            icon: String::new(),
            href: String::new(),
        })
        .collect()
}

/// Any value in, a well-formed current snapshot out.
pub fn sanitize_snapshot(value: &Value) -> SettingsSnapshot {
    PersistedSettings::from_value(value).into_current()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn provider_falls_back_for_malformed_values() {
        for value in [
            json!(null),
            json!(42),
            json!("google"),
            json!("Yahoo"),
            json!(["Bing"]),
        ] {
            assert_eq!(sanitize_provider(Some(&value)), Provider::Google);
        }
        assert_eq!(sanitize_provider(None), Provider::Google);
        assert_eq!(
            sanitize_provider(Some(&json!("Perplexity"))),
            Provider::Perplexity
        );
    }

    #[test]
    fn open_mode_accepts_only_new() {
        assert_eq!(sanitize_open_mode(Some(&json!("new"))), OpenMode::New);
        for value in [json!(true), json!("current"), json!(" new"), json!(null)] {
            assert_eq!(sanitize_open_mode(Some(&value)), OpenMode::Current);
        }
        assert_eq!(sanitize_open_mode(None), OpenMode::Current);
    }

    #[test]
    fn corrupted_raw_detection() {
        for raw in ["", "   ", "undefined", "null", " null ", "42", "\"text\"", "true"] {
            assert!(is_corrupted_raw(raw), "{raw:?} should be corrupted");
        }
        assert!(!is_corrupted_raw("{\"provider\":\"Bing\"}"));
        assert!(!is_corrupted_raw("  [1]"));
        assert!(!is_corrupted_raw("{not json"));
    }

    #[test]
    fn derive_id_slugs_and_truncates() {
        assert_eq!(derive_id("My Mail!"), "mymail");
        assert_eq!(derive_id("***"), "item");
        assert_eq!(derive_id(""), "item");
        let long = "a".repeat(60);
        assert_eq!(derive_id(&long).len(), DERIVED_ID_MAX_CHARS);
    }

    #[test]
    fn shortcut_values_are_trimmed_and_defaulted() {
        let entry = normalize_shortcut_value(&json!({
            "id": "  ",
            "label": "  Git Hub ",
            "icon": " github ",
            "href": 7
        }))
        .expect("object entry");
        assert_eq!(entry.id, "github");
        assert_eq!(entry.label, "Git Hub");
        assert_eq!(entry.icon, "github");
        assert_eq!(entry.href, "");

        let entry = normalize_shortcut_value(&json!({"id": "mail"})).expect("object entry");
        assert_eq!(entry.label, "mail");

        assert!(normalize_shortcut_value(&json!("mail")).is_none());
    }

    #[test]
    fn first_duplicate_wins() {
        let out = normalize_shortcuts(&[
            json!({"id": "a", "label": "A"}),
            json!(null),
            json!({"id": "a", "label": "B"}),
            json!({"label": "A"}),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "A");
    }

    #[test]
    fn unidentifiable_user_entry_is_rejected() {
        let blank = ShortcutEntry {
            id: " ".to_string(),
            label: String::new(),
            icon: "x".to_string(),
            href: "https://example.com".to_string(),
        };
        assert!(normalize_shortcut(&blank).is_none());
    }

    #[test]
    fn legacy_order_is_capped_and_unique() {
        let ids: Vec<Value> = (0..300).map(|i| json!(format!("id{i}"))).collect();
        let mut with_noise = vec![json!(" id0 "), json!(""), json!(5)];
        with_noise.extend(ids);
        let order = sanitize_legacy_order(Some(&Value::Array(with_noise))).expect("ids");
        assert_eq!(order.len(), LEGACY_ORDER_CAP);
        assert_eq!(order[0], "id0");
        assert_eq!(order[1], "id1");

        assert_eq!(sanitize_legacy_order(Some(&json!([" ", 1]))), None);
        assert_eq!(sanitize_legacy_order(Some(&json!("a"))), None);
    }
}
