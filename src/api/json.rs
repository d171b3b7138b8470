//! Helpers for decoding the hub's loosely-typed JSON records.
//!
//! Condition records arrive as flat JSON objects in US customary units. The
//! helpers here rewrite such an object in place (aliases, unit conversion,
//! integer normalisation) so that it can then be handed to `serde` for the
//! final typed decode.

use crate::error::{Result, WeatherLinkError};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub type JsonObject = Map<String, Value>;

/// Digits kept after a unit conversion so that later display rounding is
/// not affected by floating-point noise.
const CONVERSION_NDIGITS: f64 = 1000.0;

fn round_conversion(value: f64) -> f64 {
    (value * CONVERSION_NDIGITS).round() / CONVERSION_NDIGITS
}

pub fn fahrenheit_to_celsius(value: f64) -> f64 {
    round_conversion((value - 32.0) * 5.0 / 9.0)
}

pub fn mph_to_kph(value: f64) -> f64 {
    round_conversion(1.609344 * value)
}

pub fn in_hg_to_hpa(value: f64) -> f64 {
    round_conversion(33.86389 * value)
}

/// Apply `converter` to every listed key that is present and not null.
pub fn apply_converter(d: &mut JsonObject, keys: &[&str], converter: fn(f64) -> f64) -> Result<()> {
    for &key in keys {
        let Some(value) = d.get_mut(key) else {
            continue;
        };
        if value.is_null() {
            continue;
        }

        let number = value
            .as_f64()
            .ok_or_else(|| WeatherLinkError::decode(key, format!("expected a number, got {value}")))?;
        *value = Value::from(converter(number));
    }
    Ok(())
}

pub fn keys_to_celsius(d: &mut JsonObject, keys: &[&str]) -> Result<()> {
    apply_converter(d, keys, fahrenheit_to_celsius)
}

pub fn keys_to_kph(d: &mut JsonObject, keys: &[&str]) -> Result<()> {
    apply_converter(d, keys, mph_to_kph)
}

pub fn keys_to_hpa(d: &mut JsonObject, keys: &[&str]) -> Result<()> {
    apply_converter(d, keys, in_hg_to_hpa)
}

/// Rewrite numbers sent as floats (`243.0`) into integers so that they
/// decode into integer fields. Fractional values are rounded.
pub fn keys_to_integer(d: &mut JsonObject, keys: &[&str]) -> Result<()> {
    for &key in keys {
        let Some(value) = d.get_mut(key) else {
            continue;
        };
        if value.is_null() || value.is_i64() || value.is_u64() {
            continue;
        }

        let number = value
            .as_f64()
            .ok_or_else(|| WeatherLinkError::decode(key, format!("expected an integer, got {value}")))?;
        *value = Value::from(number.round() as i64);
    }
    Ok(())
}

/// Resolve renamed fields.
///
/// For every `(key, aliases)` pair the canonical key wins if present;
/// otherwise the first alias found provides the value. All alias keys are
/// removed afterwards.
pub fn keys_from_aliases(d: &mut JsonObject, key_aliases: &[(&str, &[&str])]) {
    for &(key, aliases) in key_aliases {
        if d.contains_key(key) {
            continue;
        }

        if let Some(value) = aliases.iter().find_map(|alias| d.get(*alias)) {
            let value = value.clone();
            d.insert(key.to_string(), value);
        }
    }

    for &(_, aliases) in key_aliases {
        for alias in aliases {
            d.remove(*alias);
        }
    }
}

/// Fill every key of `d` that is missing or null from `updates`.
pub fn update_where_none(d: &mut JsonObject, updates: &JsonObject) {
    for (key, value) in updates {
        match d.get(key) {
            Some(existing) if !existing.is_null() => {}
            _ => {
                d.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Fail unless every key in `keys` is present.
pub fn require_keys(d: &JsonObject, context: &str, keys: &[&str]) -> Result<()> {
    match keys.iter().find(|key| !d.contains_key(**key)) {
        Some(missing) => Err(WeatherLinkError::decode(
            context,
            format!("missing field `{missing}`"),
        )),
        None => Ok(()),
    }
}

/// Final typed decode of a prepared record.
pub fn decode_record<T: DeserializeOwned>(d: JsonObject, context: &str) -> Result<T> {
    serde_json::from_value(Value::Object(d)).map_err(|e| WeatherLinkError::decode(context, e))
}
