//! Unit normalization
//!
//! Converts the textual quantities found in job-history logs into canonical
//! numeric units: memory becomes gigabytes, durations become fractional hours
//! and timestamps become [`NaiveDateTime`].
//!
//! Memory uses power-of-1024 factors throughout (`1 GB = 1024 MB`), which is
//! what scheduler accounting reports. A bare number carries the default unit
//! of the log schema.

use crate::error::UnitParseError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Longest duration accepted for elapsed or walltime values (ten years).
pub const MAX_DURATION_HOURS: f64 = 10.0 * 366.0 * 24.0;

/// Memory unit with a power-of-1024 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryUnit {
    B,
    Kb,
    Mb,
    #[default]
    Gb,
    Tb,
    Pb,
}

impl MemoryUnit {
    /// Recognize a unit suffix, case-insensitively. `k`, `kb` and `kib` are
    /// all accepted for kilobytes, and so on up to petabytes.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "b" => Some(MemoryUnit::B),
            "k" | "kb" | "kib" => Some(MemoryUnit::Kb),
            "m" | "mb" | "mib" => Some(MemoryUnit::Mb),
            "g" | "gb" | "gib" => Some(MemoryUnit::Gb),
            "t" | "tb" | "tib" => Some(MemoryUnit::Tb),
            "p" | "pb" | "pib" => Some(MemoryUnit::Pb),
            _ => None,
        }
    }

    /// Multiplier that converts a quantity in this unit to gigabytes.
    pub fn to_gb_factor(self) -> f64 {
        let exponent = match self {
            MemoryUnit::B => -3,
            MemoryUnit::Kb => -2,
            MemoryUnit::Mb => -1,
            MemoryUnit::Gb => 0,
            MemoryUnit::Tb => 1,
            MemoryUnit::Pb => 2,
        };
        1024f64.powi(exponent)
    }
}

/// Parse a memory quantity such as `4gb`, `512 MB`, `1.5T`, `1e3mb` or `16`
/// into GB. The unit suffix is the trailing run of letters.
pub fn parse_memory_gb(text: &str, default_unit: MemoryUnit) -> Result<f64, UnitParseError> {
    let text = text.trim();
    let split = text
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .len();
    let (number, suffix) = text.split_at(split);
    let number = number.trim();

    let unit = if suffix.is_empty() {
        default_unit
    } else {
        MemoryUnit::from_suffix(suffix.trim())
            .ok_or_else(|| UnitParseError::UnknownMemoryUnit(suffix.trim().to_string()))?
    };

    let value: f64 = number
        .parse()
        .map_err(|_| UnitParseError::InvalidMemory(text.to_string()))?;
    let gb = value * unit.to_gb_factor();
    if !gb.is_finite() || gb < 0.0 {
        return Err(UnitParseError::InvalidMemory(text.to_string()));
    }

    Ok(gb)
}

/// Parse a duration into fractional hours.
///
/// Accepted forms: `HH:MM:SS`, `D-HH:MM:SS` and a plain hour count (`2`,
/// `0.75`). Hours may exceed 24 in the colon form. Anything longer than
/// [`MAX_DURATION_HOURS`] is rejected.
pub fn parse_duration_hours(text: &str) -> Result<f64, UnitParseError> {
    let text = text.trim();
    let invalid = || UnitParseError::InvalidDuration(text.to_string());

    let hours = if text.contains(':') {
        parse_clock_hours(text).ok_or_else(invalid)?
    } else {
        text.parse::<f64>().map_err(|_| invalid())?
    };

    if !(0.0..=MAX_DURATION_HOURS).contains(&hours) {
        return Err(invalid());
    }
    Ok(hours)
}

/// `HH:MM:SS` or `D-HH:MM:SS`; `None` for anything malformed.
fn parse_clock_hours(text: &str) -> Option<f64> {
    let (days, clock) = match text.split_once('-') {
        Some((days, clock)) => (days.parse::<u64>().ok()?, clock),
        None => (0, text),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        return None;
    };
    let hours: u64 = hours.parse().ok()?;
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }

    let whole_hours = days.checked_mul(24)?.checked_add(hours)?;
    Some(whole_hours as f64 + minutes as f64 / 60.0 + seconds / 3600.0)
}

/// Parse a job timestamp. Date-only values resolve to midnight.
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, UnitParseError> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_local());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive);
        }
    }

    for format in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(midnight);
            }
        }
    }

    Err(UnitParseError::InvalidTimestamp(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_memory_suffixes() {
        assert_eq!(parse_memory_gb("4gb", MemoryUnit::Gb).unwrap(), 4.0);
        assert_eq!(parse_memory_gb("4GB", MemoryUnit::Gb).unwrap(), 4.0);
        assert_eq!(parse_memory_gb("512mb", MemoryUnit::Gb).unwrap(), 0.5);
        assert_eq!(parse_memory_gb("2 T", MemoryUnit::Gb).unwrap(), 2048.0);
        assert_eq!(parse_memory_gb("1048576kb", MemoryUnit::Gb).unwrap(), 1.0);
        assert_eq!(parse_memory_gb("1073741824b", MemoryUnit::Gb).unwrap(), 1.0);
        assert_eq!(parse_memory_gb("1GiB", MemoryUnit::Gb).unwrap(), 1.0);
    }

    #[test]
    fn test_memory_default_unit() {
        assert_eq!(parse_memory_gb("25", MemoryUnit::Gb).unwrap(), 25.0);
        assert_eq!(parse_memory_gb("25.5", MemoryUnit::Gb).unwrap(), 25.5);
        assert_eq!(parse_memory_gb("2048", MemoryUnit::Mb).unwrap(), 2.0);
    }

    #[test]
    fn test_memory_rejects_garbage() {
        assert_eq!(
            parse_memory_gb("4qb", MemoryUnit::Gb),
            Err(UnitParseError::UnknownMemoryUnit("qb".to_string()))
        );
        assert!(matches!(
            parse_memory_gb("gb", MemoryUnit::Gb),
            Err(UnitParseError::InvalidMemory(_))
        ));
        assert!(parse_memory_gb("-3gb", MemoryUnit::Gb).is_err());
        assert!(parse_memory_gb("", MemoryUnit::Gb).is_err());
        assert!(parse_memory_gb("inf", MemoryUnit::Gb).is_err());
    }

    #[test]
    fn test_memory_exponent_notation() {
        assert_eq!(parse_memory_gb("1e3gb", MemoryUnit::Gb).unwrap(), 1000.0);
        assert_eq!(parse_memory_gb("2.048e3MB", MemoryUnit::Gb).unwrap(), 2.0);
        assert_eq!(parse_memory_gb("1E1", MemoryUnit::Gb).unwrap(), 10.0);
        assert!(parse_memory_gb("1e308pb", MemoryUnit::Gb).is_err());
    }

    #[test]
    fn test_duration_forms() {
        assert_eq!(parse_duration_hours("02:30:00").unwrap(), 2.5);
        assert_eq!(parse_duration_hours("1-00:00:00").unwrap(), 24.0);
        assert_eq!(parse_duration_hours("1-12:00:00").unwrap(), 36.0);
        assert_eq!(parse_duration_hours("125:00:00").unwrap(), 125.0);
        assert_eq!(parse_duration_hours("00:00:36").unwrap(), 0.01);
        assert_eq!(parse_duration_hours("2").unwrap(), 2.0);
        assert_eq!(parse_duration_hours("0.5").unwrap(), 0.5);
    }

    #[test]
    fn test_duration_rejects_garbage() {
        assert!(parse_duration_hours("10:00").is_err());
        assert!(parse_duration_hours("01:75:00").is_err());
        assert!(parse_duration_hours("x-01:00:00").is_err());
        assert!(parse_duration_hours("-1").is_err());
        assert!(parse_duration_hours("soon").is_err());
    }

    #[test]
    fn test_duration_rejects_huge_values() {
        assert!(parse_duration_hours("18446744073709551615-00:00:00").is_err());
        assert!(parse_duration_hours("768614336404564651-00:00:00").is_err());
        assert!(parse_duration_hours("18446744073709551615:00:00").is_err());
        assert!(parse_duration_hours("1e30").is_err());
        assert!(parse_duration_hours("inf").is_err());

        assert_eq!(parse_duration_hours("3650-00:00:00").unwrap(), 87600.0);
        assert!(parse_duration_hours("3661-00:00:00").is_err());
    }

    #[test]
    fn test_timestamp_formats() {
        let ts = parse_timestamp("2024-03-04T12:30:00").unwrap();
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(ts.hour(), 12);

        let ts = parse_timestamp("2024-03-04 08:00:00").unwrap();
        assert_eq!(ts.hour(), 8);

        let ts = parse_timestamp("2024-03-04").unwrap();
        assert_eq!(ts.hour(), 0);

        let ts = parse_timestamp("20240304").unwrap();
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());

        assert!(parse_timestamp("2024-03-04T12:00:00Z").is_ok());
    }

    #[test]
    fn test_timestamp_invalid() {
        assert!(parse_timestamp("last tuesday").is_err());
        assert!(parse_timestamp("2024-13-40").is_err());
    }
}
