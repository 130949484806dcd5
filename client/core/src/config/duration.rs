//! Human-friendly duration (de)serialisation (`"30s"`, `"500ms"`, `"2m"`,
//! `"1h"`, or a bare integer meaning seconds), for use with
//! `#[serde(deserialize_with = "...")]` on `Duration` fields.
//!
//! `std::time::Duration`'s own `Deserialize` impl encodes `{secs, nanos}`,
//! which is not how durations show up in the host collector's key=value
//! config surface; this mirrors the suffixed-string convention that surface
//! actually uses.

use std::time::Duration;

use serde::{de::Error as _, Deserialize, Deserializer};

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Seconds(u64),
        Text(String),
    }

    match Repr::deserialize(d)? {
        Repr::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Repr::Text(raw) => parse(super::strip_quotes(&raw)).map_err(D::Error::custom),
    }
}

pub fn parse(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split_at = raw
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| format!("duration '{raw}' has no unit suffix"))?;
    let (number, unit) = raw.split_at(split_at);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("'{number}' is not a valid duration magnitude"))?;

    let multiplier_secs: f64 = match unit {
        "ns" => 1e-9,
        "us" | "µs" => 1e-6,
        "ms" => 1e-3,
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        other => return Err(format!("unknown duration unit '{other}'")),
    };

    Ok(Duration::from_secs_f64(value * multiplier_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_supported_unit() {
        assert_eq!(parse("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_missing_unit() {
        assert!(parse("10").is_err());
    }
}
