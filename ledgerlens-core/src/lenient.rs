//! Lenient decoding of remote integers.
//!
//! View endpoints frequently stringify 64-bit integers to survive JSON
//! number precision limits, so ids, counts and timestamps are accepted
//! either as JSON numbers or as decimal strings.

use serde::de::{self, Deserializer, Visitor};
use serde_json::Value;
use std::fmt;

/// Read a `u64` from a JSON number or a decimal string.
pub fn u64_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Read a list of `u64` values, failing if any element is not an integer.
pub fn u64_list_from_value(value: &Value) -> Option<Vec<u64>> {
    value
        .as_array()?
        .iter()
        .map(u64_from_value)
        .collect::<Option<Vec<_>>>()
}

struct LenientU64;

impl<'de> Visitor<'de> for LenientU64 {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an unsigned integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        u64::try_from(v).map_err(|_| E::custom(format!("negative integer {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        v.trim()
            .parse::<u64>()
            .map_err(|_| E::custom(format!("not a decimal integer: {v:?}")))
    }
}

/// `#[serde(deserialize_with = "lenient::deserialize_u64")]`
pub fn deserialize_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientU64)
}
