//! Human-readable formatting of rates and memory amounts.
//!
//! A missing value (`None`) means there was not enough history to compute
//! it. Negative or NaN inputs indicate corrupted upstream data and are
//! rejected.

use serde::Serialize;
use std::fmt;

use crate::error::MonitorError;

pub const ONE_KILO: f64 = 1024.0;
pub const ONE_MEGA: f64 = 1024.0 * 1024.0;
pub const ONE_GIGA: f64 = 1024.0 * 1024.0 * 1024.0;

const NS_PER_MS: u64 = 1_000_000;

fn check_metric(metric: &'static str, value: f64) -> Result<f64, MonitorError> {
    if value.is_nan() || value < 0.0 {
        return Err(MonitorError::InvalidMetric { metric, value });
    }
    Ok(value)
}

/// Trims a fixed-precision decimal to at most `digits` fraction digits.
fn trim_fraction(value: f64, digits: usize) -> String {
    let s = format!("{:.*}", digits, value);
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Formats a CPU rate where 1.0 is one full core.
///
/// `0` is shown as `idle` so that it is not confused with a tiny but
/// non-zero load, which is shown as `~0%`.
pub fn format_percentage(value: Option<f64>) -> Result<String, MonitorError> {
    let value = match value {
        Some(v) => check_metric("percentage", v)?,
        None => return Ok("?".to_string()),
    };
    if value == 0.0 {
        return Ok("idle".to_string());
    }
    let percentage = value * 100.0;
    if percentage < 0.01 {
        return Ok("~0%".to_string());
    }
    if percentage < 1.0 {
        return Ok(format!("{}%", trim_fraction(percentage, 2)));
    }
    Ok(format!("{}%", percentage.round()))
}

/// Unit of a formatted memory amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemoryUnit {
    #[serde(rename = "?")]
    Unknown,
    B,
    KB,
    MB,
    GB,
}

impl MemoryUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryUnit::Unknown => "?",
            MemoryUnit::B => "B",
            MemoryUnit::KB => "KB",
            MemoryUnit::MB => "MB",
            MemoryUnit::GB => "GB",
        }
    }
}

impl fmt::Display for MemoryUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A memory size scaled to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryAmount {
    pub unit: MemoryUnit,
    pub amount: f64,
}

impl fmt::Display for MemoryAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit)
    }
}

/// Scales a byte count. Amounts of 1 KB and above are rounded up at two
/// decimals; byte amounts are rounded to the nearest integer.
pub fn format_memory(value: Option<f64>) -> Result<MemoryAmount, MonitorError> {
    let value = match value {
        Some(v) => check_metric("memory", v)?,
        None => {
            return Ok(MemoryAmount {
                unit: MemoryUnit::Unknown,
                amount: 0.0,
            })
        }
    };

    let scaled = |unit: MemoryUnit, divisor: f64| MemoryAmount {
        unit,
        amount: (value / divisor * 100.0).ceil() / 100.0,
    };

    Ok(if value >= ONE_GIGA {
        scaled(MemoryUnit::GB, ONE_GIGA)
    } else if value >= ONE_MEGA {
        scaled(MemoryUnit::MB, ONE_MEGA)
    } else if value >= ONE_KILO {
        scaled(MemoryUnit::KB, ONE_KILO)
    } else {
        MemoryAmount {
            unit: MemoryUnit::B,
            amount: value.round(),
        }
    })
}

/// A formatted memory total with an optional signed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedMemory {
    pub value: String,
    /// ` (+1.5MB)` style suffix; absent when unknown or unchanged.
    pub delta: Option<String>,
}

impl fmt::Display for FormattedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)?;
        if let Some(delta) = &self.delta {
            f.write_str(delta)?;
        }
        Ok(())
    }
}

pub fn format_memory_and_delta(
    value: Option<u64>,
    delta: Option<i64>,
) -> Result<FormattedMemory, MonitorError> {
    let delta = match delta {
        None | Some(0) => None,
        Some(d) if d > 0 => Some(format!(" (+{})", format_memory(Some(d as f64))?)),
        Some(d) => Some(format!(" (-{})", format_memory(Some(d.unsigned_abs() as f64))?)),
    };
    Ok(FormattedMemory {
        value: format_memory(value.map(|v| v as f64))?.to_string(),
        delta,
    })
}

/// Whole milliseconds of a ns CPU total, with thousands separators.
pub fn format_cpu_time(total_ns: u64) -> String {
    let ms = (total_ns + NS_PER_MS / 2) / NS_PER_MS;
    let digits = ms.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_thresholds() {
        assert_eq!(format_percentage(None).unwrap(), "?");
        assert_eq!(format_percentage(Some(0.0)).unwrap(), "idle");
        assert_eq!(format_percentage(Some(0.00005)).unwrap(), "~0%");
        assert_eq!(format_percentage(Some(0.005)).unwrap(), "0.5%");
        assert_eq!(format_percentage(Some(0.0012)).unwrap(), "0.12%");
        assert_eq!(format_percentage(Some(1.2)).unwrap(), "120%");
        assert_eq!(format_percentage(Some(0.456)).unwrap(), "46%");
    }

    #[test]
    fn percentage_rejects_negative_and_nan() {
        assert!(matches!(
            format_percentage(Some(-0.1)),
            Err(MonitorError::InvalidMetric { metric: "percentage", .. })
        ));
        assert!(format_percentage(Some(f64::NAN)).is_err());
    }

    #[test]
    fn memory_units_and_rounding() {
        let m = format_memory(Some(0.0)).unwrap();
        assert_eq!((m.unit, m.amount), (MemoryUnit::B, 0.0));

        let m = format_memory(Some(1023.0)).unwrap();
        assert_eq!((m.unit, m.amount), (MemoryUnit::B, 1023.0));

        let m = format_memory(Some(1024.0)).unwrap();
        assert_eq!((m.unit, m.amount), (MemoryUnit::KB, 1.0));

        let m = format_memory(Some(1_048_577.0)).unwrap();
        assert_eq!((m.unit, m.amount), (MemoryUnit::MB, 1.01));

        let m = format_memory(Some(3.0 * ONE_GIGA)).unwrap();
        assert_eq!(m.to_string(), "3GB");

        let m = format_memory(None).unwrap();
        assert_eq!(m.to_string(), "0?");
    }

    #[test]
    fn memory_rejects_negative() {
        assert!(format_memory(Some(-1.0)).is_err());
    }

    #[test]
    fn memory_and_delta() {
        let f = format_memory_and_delta(Some(2048), None).unwrap();
        assert_eq!(f.to_string(), "2KB");
        assert_eq!(f.delta, None);

        let f = format_memory_and_delta(Some(2048), Some(0)).unwrap();
        assert_eq!(f.delta, None);

        let f = format_memory_and_delta(Some(2048), Some(1024)).unwrap();
        assert_eq!(f.to_string(), "2KB (+1KB)");

        let f = format_memory_and_delta(Some(2048), Some(-512)).unwrap();
        assert_eq!(f.to_string(), "2KB (-512B)");

        let f = format_memory_and_delta(None, None).unwrap();
        assert_eq!(f.value, "0?");
    }

    #[test]
    fn cpu_time_grouping() {
        assert_eq!(format_cpu_time(0), "0");
        assert_eq!(format_cpu_time(999_999), "1");
        assert_eq!(format_cpu_time(1_234_000_000), "1,234");
        assert_eq!(format_cpu_time(12_345_678_000_000), "12,345,678");
    }
}
