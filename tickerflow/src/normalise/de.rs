//! Lenient field coercion over provider-native JSON objects.
//!
//! Every accessor takes an ordered list of candidate field names and uses the first one that is
//! present. A field counts as present when it exists, is not `null`, and is not a blank string.
//! Values that are present but cannot be coerced fall back to a default and are counted as
//! anomalies; they never produce an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use smol_str::{SmolStr, ToSmolStr};

/// Epoch values at or above this magnitude are interpreted as milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

const NAIVE_DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Reader over one raw record that tallies coercion anomalies.
#[derive(Debug)]
pub struct FieldReader<'a> {
    object: &'a Map<String, Value>,
    anomalies: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(object: &'a Map<String, Value>) -> Self {
        Self {
            object,
            anomalies: 0,
        }
    }

    pub fn anomalies(&self) -> usize {
        self.anomalies
    }

    /// First present value among `keys`.
    pub fn first(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|key| self.object.get(*key))
            .find(|value| is_present(value))
    }

    /// First present value rendered as text. Numbers & booleans are stringified.
    pub fn text(&self, keys: &[&str]) -> Option<SmolStr> {
        match self.first(keys)? {
            Value::String(text) => Some(text.trim().to_smolstr()),
            Value::Number(number) => Some(number.to_smolstr()),
            Value::Bool(flag) => Some(flag.to_smolstr()),
            _ => None,
        }
    }

    /// First present value as a number, `0.0` when missing or unparsable.
    pub fn number(&mut self, keys: &[&str]) -> f64 {
        self.number_opt(keys).unwrap_or(0.0)
    }

    /// First present value as a number; `None` when missing or unparsable.
    pub fn number_opt(&mut self, keys: &[&str]) -> Option<f64> {
        let value = self.first(keys)?;
        let parsed = parse_number(value);
        if parsed.is_none() {
            self.anomalies += 1;
        }
        parsed
    }

    /// Monetary amount expressed in minor units (cents), converted to major units.
    pub fn minor_units(&mut self, keys: &[&str]) -> Option<f64> {
        self.number_opt(keys).map(|cents| cents / 100.0)
    }

    /// Token style amount in base units, scaled down by `10^decimals`.
    pub fn base_units(&mut self, amount_keys: &[&str], decimals_keys: &[&str]) -> Option<f64> {
        let amount = self.number_opt(amount_keys)?;
        let decimals = self.number_opt(decimals_keys).unwrap_or(0.0);
        if !(0.0..=36.0).contains(&decimals) || decimals.fract() != 0.0 {
            self.anomalies += 1;
            return Some(amount);
        }
        Some(amount / 10f64.powi(decimals as i32))
    }

    /// First present value coerced to a UTC timestamp.
    pub fn datetime(&mut self, keys: &[&str]) -> Option<DateTime<Utc>> {
        let value = self.first(keys)?;
        let parsed = parse_datetime(value);
        if parsed.is_none() {
            self.anomalies += 1;
        }
        parsed
    }

    /// First present value coerced to a calendar date.
    pub fn date(&mut self, keys: &[&str]) -> Option<NaiveDate> {
        self.datetime(keys).map(|datetime| datetime.date_naive())
    }

    /// First present value as a boolean. Accepts `true`/`false`, `1`/`0`, `"yes"`/`"no"`.
    pub fn flag(&self, keys: &[&str]) -> Option<bool> {
        match self.first(keys)? {
            Value::Bool(flag) => Some(*flag),
            Value::Number(number) => number.as_f64().map(|n| n != 0.0),
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Some(true),
                "false" | "no" | "n" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Tags from an array of strings or a comma separated string, across every listed field.
    pub fn tags(&self, keys: &[&str]) -> Vec<SmolStr> {
        let mut tags = Vec::new();
        for value in keys.iter().filter_map(|key| self.object.get(*key)) {
            match value {
                Value::Array(items) => tags.extend(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::trim)
                        .filter(|tag| !tag.is_empty())
                        .map(ToSmolStr::to_smolstr),
                ),
                Value::String(text) => tags.extend(
                    text.split(',')
                        .map(str::trim)
                        .filter(|tag| !tag.is_empty())
                        .map(ToSmolStr::to_smolstr),
                ),
                _ => {}
            }
        }
        tags.sort();
        tags.dedup();
        tags
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        _ => true,
    }
}

/// Parse a JSON number or numeric string. Tolerates `$`, `,` and surrounding whitespace.
pub fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => parse_numeric_str(text)?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn parse_numeric_str(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    cleaned.parse::<f64>().ok()
}

/// Parse a dollar amount range such as `"$1,001 - $15,000"` to its midpoint.
///
/// A single amount parses to itself. Open ranges (`"Over $50,000,000"`) use their bound.
pub fn parse_amount_range(text: &str) -> Option<f64> {
    let bounds: Vec<f64> = text
        .split(['-', '–'])
        .filter_map(|part| {
            let digits: String = part
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            digits.parse::<f64>().ok()
        })
        .collect();

    match bounds.as_slice() {
        [] => None,
        [single] => Some(*single),
        [low, high, ..] => Some((low + high) / 2.0),
    }
}

/// Coerce ISO-8601 / RFC 3339 strings, plain dates, and epoch seconds or milliseconds.
pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => from_epoch(number.as_f64()?),
        Value::String(text) => parse_datetime_str(text.trim()),
        _ => None,
    }
}

fn parse_datetime_str(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|datetime| datetime.and_utc());
    }

    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return from_epoch(text.parse::<f64>().ok()?);
    }

    None
}

fn from_epoch(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() || epoch <= 0.0 {
        return None;
    }

    if epoch >= EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(epoch as i64)
    } else {
        DateTime::from_timestamp(epoch as i64, 0)
    }
}
