//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;

use serde_json::Value;

/// Replace escape sequences left in upstream names with their literal character
///
/// Recognised sequences are backslash followed by `'`, `"`, `\` or `/`, and the
/// textual unicode escapes for the single and double quote (`u0027`, `u0022`
/// after a backslash). A single pass can expose a new sequence (`\\'` becomes
/// `\'`), so passes repeat until the text stops changing.
pub fn normalize_text(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = normalize_pass(&current);
        if next.len() == current.len() {
            return next;
        }
        current = next;
    }
}

/// One left-to-right replacement pass; every replacement shortens the text
fn normalize_pass(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (replacement, consumed) = match after.chars().next() {
            Some(c @ ('\'' | '"' | '\\' | '/')) => (Some(c), 1),
            Some('u') if after.starts_with("u0027") => (Some('\''), 5),
            Some('u') if after.starts_with("u0022") => (Some('"'), 5),
            _ => (None, 0),
        };

        match replacement {
            Some(c) => {
                out.push(c);
                rest = &after[consumed..];
            }
            None => {
                out.push('\\');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Normalise every string inside a decoded JSON value
///
/// Objects and arrays are walked recursively; keys are left untouched.
pub fn normalize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(normalize_text(&s)),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_value(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}

/// Format byte size as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return String::from("0 B");
    }

    let base: f64 = 1024.0;
    let exponent = (bytes as f64).log(base).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let value = bytes as f64 / base.powi(exponent as i32);

    format!("{value:.2} {}", UNITS[exponent])
}
