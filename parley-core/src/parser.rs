//! Resilient extraction of JSON from generated text
//!
//! Generated output may wrap the object we asked for in commentary, code
//! fences or quotes. Everything here is total: malformed input yields the
//! caller's fallback, never an error. [`Fields`] supplies per-field defaults
//! so one bad key does not discard the rest of an object.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

/// Parse generated text into `T`, returning `fallback` on any failure.
pub fn parse<T: DeserializeOwned>(raw: &str, fallback: T) -> T {
    parse_with(raw, fallback, |_| true)
}

/// Like [`parse`], but also rejects values failing `guard`.
pub fn parse_with<T, F>(raw: &str, fallback: T, guard: F) -> T
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool,
{
    let Some(value) = extract_json(raw) else {
        debug!(len = raw.len(), "No JSON found in generated text, using fallback");
        return fallback;
    };

    match serde_json::from_value::<T>(value) {
        Ok(parsed) if guard(&parsed) => parsed,
        Ok(_) => {
            debug!("Parsed value failed shape check, using fallback");
            fallback
        }
        Err(e) => {
            debug!(error = %e, "Extracted JSON did not match expected type, using fallback");
            fallback
        }
    }
}

/// Locate the first valid JSON object or array in `raw`.
pub fn extract_json(raw: &str) -> Option<Value> {
    let text = strip_wrappers(raw);

    // A JSON-encoded string holding the payload
    if text.starts_with('"')
        && let Ok(inner) = serde_json::from_str::<String>(text)
    {
        return extract_json(&inner);
    }

    if let Ok(value) = serde_json::from_str::<Value>(text)
        && (value.is_object() || value.is_array())
    {
        return Some(value);
    }

    for (start, c) in text.char_indices() {
        if c != '{' && c != '[' {
            continue;
        }
        let Some(end) = matching_close(text, start) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(&text[start..end]) {
            return Some(value);
        }
    }

    None
}

/// Trim whitespace, one pair of code fences and one pair of quotes.
fn strip_wrappers(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Drop a language tag such as `json`
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        text = rest[tag_len..].trim_start();
        if let Some(body) = text.strip_suffix("```") {
            text = body;
        }
        text = text.trim();
    }

    for quote in ['\'', '`'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            text = text[1..text.len() - 1].trim();
        }
    }

    text
}

/// Byte index one past the bracket closing the one at `start`.
///
/// Brackets inside string literals are ignored; mismatched nesting fails.
fn matching_close(text: &str, start: usize) -> Option<usize> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
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
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + offset + c.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// Read-only view over a JSON object with per-field defaults.
///
/// A non-object value behaves as an empty object.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self {
            map: value.as_object(),
        }
    }

    /// Raw field access.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.and_then(|m| m.get(key))
    }

    /// Nested object (empty view if absent or not an object).
    pub fn object(&self, key: &str) -> Fields<'a> {
        Fields {
            map: self.get(key).and_then(Value::as_object),
        }
    }

    /// Non-blank trimmed string, else `default`.
    pub fn str_or(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => default.to_string(),
        }
    }

    /// Score in 0..=100, from a number or numeric string, else `default`.
    ///
    /// Values are rounded then clamped. Strings like `"85%"` or `"85/100"`
    /// are accepted.
    pub fn score_or(&self, key: &str, default: u8) -> u8 {
        let number = match self.get(key) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => {
                let s = s.trim().trim_end_matches('%');
                let s = s.split('/').next().unwrap_or(s).trim();
                s.parse::<f64>().ok()
            }
            _ => None,
        };

        match number {
            Some(n) if n.is_finite() => n.round().clamp(0.0, 100.0) as u8,
            _ => default,
        }
    }

    /// Boolean from a bool, `"true"`/`"false"`, `"yes"`/`"no"` or 0/1.
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => true,
                "false" | "no" => false,
                _ => default,
            },
            Some(Value::Number(n)) => match n.as_i64() {
                Some(0) => false,
                Some(1) => true,
                _ => default,
            },
            _ => default,
        }
    }
}
