use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-instance data payload. Keys iterate in a stable order so rendering is
/// deterministic regardless of how the payload was assembled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record from any JSON object. Non-object values yield an
    /// empty record.
    pub fn from_value(value: Value) -> Self {
        let mut fields = BTreeMap::new();
        if let Value::Object(map) = value {
            for (key, value) in map {
                fields.insert(key, value);
            }
        }
        Self { fields }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String coercion used for substitution: strings pass through, numbers
    /// and booleans stringify, null/absent/containers resolve to `None`.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

pub type TransformFn = Arc<dyn Fn(&Value, &Record) -> String + Send + Sync>;

/// Per-key transform bindings applied during substitution.
#[derive(Clone, Default)]
pub struct Transforms {
    bindings: BTreeMap<String, TransformFn>,
}

impl Transforms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, key: impl Into<String>, transform: TransformFn) -> &mut Self {
        self.bindings.insert(key.into(), transform);
        self
    }

    pub fn get(&self, key: &str) -> Option<&TransformFn> {
        self.bindings.get(key)
    }
}

/// Substitutes every `{{key}}` token in `content`. Missing keys become the
/// empty string; a bound transform sees the raw value (or null) plus the
/// whole record. The output never contains a complete `{{...}}` token.
pub fn resolve(content: &str, record: &Record, transforms: &Transforms) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    loop {
        let Some(open) = rest.find("{{") else {
            out.push_str(rest);
            return out;
        };
        let Some(close) = rest[open + 2..].find("}}") else {
            // No closing marker: not a token, copy through.
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..open]);
        let key = rest[open + 2..open + 2 + close].trim();
        out.push_str(&resolve_key(key, record, transforms));
        rest = &rest[open + 2 + close + 2..];
    }
}

fn resolve_key(key: &str, record: &Record, transforms: &Transforms) -> String {
    if let Some(transform) = transforms.get(key) {
        let raw = record.get(key).cloned().unwrap_or(Value::Null);
        return transform(&raw, record);
    }
    record.text(key).unwrap_or_default()
}

/// `"Mon D, YYYY"` date formatting. Accepts ISO dates, RFC 3339 timestamps
/// and US-style `m/d/yyyy`; unparseable values pass through untouched.
pub fn long_date() -> TransformFn {
    Arc::new(|raw, _record| {
        let Value::String(text) = raw else {
            return coerce(raw);
        };
        let text = text.trim();
        let parsed = NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(text, "%m/%d/%Y"))
            .ok()
            .or_else(|| {
                chrono::DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|dt| dt.date_naive())
            });
        match parsed {
            Some(date) => date.format("%b %-d, %Y").to_string(),
            None => text.to_string(),
        }
    })
}

/// Concatenates first/middle/last name fields, uppercased. The bound key's
/// own value is ignored; the parts come from the record.
pub fn full_name_upper() -> TransformFn {
    Arc::new(|_raw, record| {
        let slots: [&[&str]; 3] = [
            &["firstName", "first"],
            &["middleName", "middle"],
            &["lastName", "last"],
        ];
        let mut parts = Vec::new();
        for aliases in slots {
            let part = aliases.iter().find_map(|key| record.text(key));
            if let Some(part) = part {
                let part = part.trim().to_string();
                if !part.is_empty() {
                    parts.push(part.to_uppercase());
                }
            }
        }
        parts.join(" ")
    })
}

/// Plain numeric stringification: integers stay integral, decimals keep
/// their JSON representation.
pub fn number_text() -> TransformFn {
    Arc::new(|raw, _record| coerce(raw))
}

fn coerce(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_value(value)
    }

    #[test]
    fn substitutes_known_keys() {
        let rec = record(json!({"studentName": "Ada", "licenseNo": 42}));
        let out = resolve(
            "Name: {{studentName}} / License: {{licenseNo}}",
            &rec,
            &Transforms::new(),
        );
        assert_eq!(out, "Name: Ada / License: 42");
    }

    #[test]
    fn missing_keys_become_empty_and_no_tokens_survive() {
        let rec = Record::new();
        let out = resolve("a {{missing}} b {{ also.gone }} c", &rec, &Transforms::new());
        assert_eq!(out, "a  b  c");
        assert!(!out.contains("{{"));
    }

    #[test]
    fn unterminated_token_passes_through() {
        let rec = record(json!({"x": "1"}));
        assert_eq!(resolve("{{x}} {{oops", &rec, &Transforms::new()), "1 {{oops");
    }

    #[test]
    fn long_date_formats_iso_and_us_styles() {
        let rec = record(json!({"d": "2024-03-05"}));
        let mut transforms = Transforms::new();
        transforms.bind("d", long_date());
        assert_eq!(resolve("{{d}}", &rec, &transforms), "Mar 5, 2024");

        let rec = record(json!({"d": "12/25/2023"}));
        assert_eq!(resolve("{{d}}", &rec, &transforms), "Dec 25, 2023");
    }

    #[test]
    fn long_date_passes_garbage_through() {
        let rec = record(json!({"d": "someday"}));
        let mut transforms = Transforms::new();
        transforms.bind("d", long_date());
        assert_eq!(resolve("{{d}}", &rec, &transforms), "someday");
    }

    #[test]
    fn full_name_concatenates_uppercased() {
        let rec = record(json!({"first": "john", "last": "doe"}));
        let mut transforms = Transforms::new();
        transforms.bind("studentName", full_name_upper());
        assert_eq!(resolve("{{studentName}}", &rec, &transforms), "JOHN DOE");
    }

    #[test]
    fn transform_receives_null_for_absent_key() {
        let mut transforms = Transforms::new();
        transforms.bind(
            "k",
            Arc::new(|raw: &Value, _: &Record| {
                if raw.is_null() { "N/A".to_string() } else { coerce(raw) }
            }),
        );
        assert_eq!(resolve("{{k}}", &Record::new(), &transforms), "N/A");
    }
}
