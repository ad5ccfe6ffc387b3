//! Property tests for name normalisation

use proptest::prelude::*;
use serde_json::{json, Value};

use wilayah::crawler::fetcher::parse_listing;
use wilayah::utils::{normalize_text, normalize_value};

/// Text biased towards backslashes, quotes and the unicode escape fragments
fn escape_heavy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("\\".to_string()),
            Just("'".to_string()),
            Just("\"".to_string()),
            Just("/".to_string()),
            Just("u0027".to_string()),
            Just("u0022".to_string()),
            Just("u00".to_string()),
            "[A-Za-z ]{0,3}",
        ],
        0..24,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn normalize_is_idempotent(text in escape_heavy()) {
        let once = normalize_text(&text);
        prop_assert_eq!(normalize_text(&once), once);
    }

    #[test]
    fn normalize_is_idempotent_on_any_text(text in any::<String>()) {
        let once = normalize_text(&text);
        prop_assert_eq!(normalize_text(&once), once);
    }

    #[test]
    fn normalize_never_grows(text in escape_heavy()) {
        prop_assert!(normalize_text(&text).len() <= text.len());
    }

    #[test]
    fn text_without_backslash_is_untouched(text in "[^\\\\]*") {
        prop_assert_eq!(normalize_text(&text), text);
    }

    #[test]
    fn normalize_value_matches_text(text in escape_heavy()) {
        let value = normalize_value(json!({"a": [text.clone()]}));
        prop_assert_eq!(value, json!({"a": [normalize_text(&text)]}));
    }

    #[test]
    fn listing_keeps_every_code_in_order(names in prop::collection::vec(escape_heavy(), 1..12)) {
        let mut map = serde_json::Map::new();
        for (i, name) in names.iter().enumerate() {
            map.insert(format!("{:03}", i + 1), Value::String(name.clone()));
        }

        let listing = parse_listing(Value::Object(map)).unwrap();

        prop_assert_eq!(listing.len(), names.len());
        for (i, ((code, name), original)) in listing.iter().zip(&names).enumerate() {
            prop_assert_eq!(code, &format!("{:03}", i + 1));
            prop_assert_eq!(name, &normalize_text(original));
        }
    }
}
