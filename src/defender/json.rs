//! Tolerant decoding of `ConvertTo-Json` output.
//!
//! The engine's JSON shape drifts between PowerShell versions: one result
//! comes back as an object instead of a one-element array, ids are numbers
//! or strings, lists are `null` or a bare scalar, and dates are either ISO
//! strings or `/Date(ms)/`. The helpers here accept all of those.

use crate::core::{CommandRunner, DefenderError, DefenderResult};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;

/// Wraps `command` so its result is printed as compact JSON.
pub(crate) fn json_script(command: &str) -> String {
    format!("{command} | ConvertTo-Json -Depth 10 -Compress")
}

/// Runs `command` and parses its JSON output. Empty output is `None`.
pub(crate) async fn query_json(
    runner: &dyn CommandRunner,
    name: &str,
    command: &str,
    timeout: Duration,
) -> DefenderResult<Option<Value>> {
    let output = runner.run(&json_script(command), timeout).await?;
    let text = output.trimmed().trim_start_matches('\u{feff}');
    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| DefenderError::decode(name, e.to_string()))
}

/// Decodes zero, one or many records.
pub(crate) fn decode_records<T: DeserializeOwned>(
    name: &str,
    value: Option<Value>,
) -> DefenderResult<Vec<T>> {
    let items = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    };
    items
        .into_iter()
        .filter(|item| !item.is_null())
        .map(|item| {
            serde_json::from_value(item).map_err(|e| DefenderError::decode(name, e.to_string()))
        })
        .collect()
}

/// Decodes exactly one record; an array yields its first element.
pub(crate) fn decode_one<T: DeserializeOwned>(
    name: &str,
    value: Option<Value>,
) -> DefenderResult<T> {
    let value = match value {
        Some(Value::Array(items)) => items.into_iter().find(|item| !item.is_null()),
        Some(Value::Null) | None => None,
        other => other,
    }
    .ok_or_else(|| DefenderError::decode(name, "command printed no result"))?;

    serde_json::from_value(value).map_err(|e| DefenderError::decode(name, e.to_string()))
}

/// Parses an engine timestamp.
///
/// Accepts RFC 3339, ISO without an offset (taken as UTC) and the
/// `/Date(ms)/` form, with or without a trailing `+hhmm`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(inner) = raw
        .strip_prefix("/Date(")
        .and_then(|rest| rest.strip_suffix(")/"))
    {
        // The offset only says how to display the instant; the millis are UTC.
        let millis_end = inner
            .char_indices()
            .skip(1)
            .find(|(_, c)| *c == '+' || *c == '-')
            .map_or(inner.len(), |(i, _)| i);
        let millis: i64 = inner[..millis_end].parse().ok()?;
        return Utc.timestamp_millis_opt(millis).single();
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// `serde(deserialize_with)` helpers.
pub(crate) mod lenient {
    use super::*;

    /// A string, number or bool as text; anything else is empty.
    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        })
    }

    /// An integer from a number or numeric string.
    pub fn opt_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_u64().map(|v| i64::try_from(v).unwrap_or(i64::MAX)))
                .or_else(|| n.as_f64().map(|v| v as i64)),
            Some(Value::String(s)) => s.trim().parse().ok(),
            Some(Value::Bool(b)) => Some(i64::from(b)),
            _ => None,
        })
    }

    /// Like [`opt_int`], defaulting to 0.
    pub fn int<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        opt_int(d).map(Option::unwrap_or_default)
    }

    /// A bool from a bool, number or `"true"`/`"false"`; anything else is `false`.
    pub fn bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Bool(b)) => b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        })
    }

    /// A list of strings from an array, a scalar or `null`.
    pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        fn text(value: Value) -> Option<String> {
            match value {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            }
        }

        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Array(items)) => items.into_iter().filter_map(text).collect(),
            Some(other) => text(other).into_iter().collect(),
            None => Vec::new(),
        })
    }

    /// A timestamp in any form [`parse_timestamp`] accepts.
    pub fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) => parse_timestamp(&s),
            // Windows PowerShell wraps some dates as {value, DisplayHint, DateTime}
            Some(Value::Object(map)) => map
                .get("value")
                .and_then(Value::as_str)
                .and_then(parse_timestamp),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        #[serde(rename = "Id", default, deserialize_with = "lenient::string")]
        id: String,
        #[serde(rename = "Level", default, deserialize_with = "lenient::int")]
        level: i64,
        #[serde(rename = "On", default, deserialize_with = "lenient::bool")]
        on: bool,
        #[serde(rename = "Items", default, deserialize_with = "lenient::string_list")]
        items: Vec<String>,
        #[serde(rename = "When", default, deserialize_with = "lenient::timestamp")]
        when: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_records_from_object_or_array() {
        let one: Vec<Sample> = decode_records("t", Some(json!({"Id": 5}))).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].id, "5");

        let many: Vec<Sample> =
            decode_records("t", Some(json!([{"Id": "a"}, null, {"Id": "b"}]))).unwrap();
        assert_eq!(many.len(), 2);

        let none: Vec<Sample> = decode_records("t", None).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_lenient_fields() {
        let sample: Sample = serde_json::from_value(json!({
            "Id": 2147519003u64,
            "Level": "4",
            "On": 1,
            "Items": "file:_C:\\x.exe",
            "When": "/Date(1700000000000)/"
        }))
        .unwrap();

        assert_eq!(sample.id, "2147519003");
        assert_eq!(sample.level, 4);
        assert!(sample.on);
        assert_eq!(sample.items, vec!["file:_C:\\x.exe"]);
        assert_eq!(sample.when.unwrap().timestamp_millis(), 1_700_000_000_000);

        let empty: Sample = serde_json::from_value(json!({
            "Id": null, "Level": null, "On": null, "Items": null, "When": null
        }))
        .unwrap();
        assert_eq!(empty.id, "");
        assert_eq!(empty.level, 0);
        assert!(!empty.on);
        assert!(empty.items.is_empty());
        assert!(empty.when.is_none());
    }

    #[test]
    fn test_decode_one() {
        let sample: Sample = decode_one("t", Some(json!([{"Id": "x"}]))).unwrap();
        assert_eq!(sample.id, "x");

        let err = decode_one::<Sample>("Get-Thing", None).unwrap_err();
        assert!(matches!(err, DefenderError::Decode { .. }));
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();

        assert_eq!(parse_timestamp("2023-11-14T22:13:20Z"), Some(expected));
        assert_eq!(parse_timestamp("2023-11-14T23:13:20+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-11-14T22:13:20.000"), Some(expected));
        assert_eq!(parse_timestamp("/Date(1700000000000)/"), Some(expected));
        assert_eq!(parse_timestamp("/Date(1700000000000+0100)/"), Some(expected));
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_json_script() {
        assert_eq!(
            json_script("Get-MpThreat"),
            "Get-MpThreat | ConvertTo-Json -Depth 10 -Compress"
        );
    }
}
