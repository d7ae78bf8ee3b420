//! Projection of decoded entries into canonical values
//!
//! Every decoded entry is turned into an identifier of the form
//! `A-B:C.D.E*F` and a typed value. Numeric values are scaled by their
//! decimal exponent and rounded to the number of decimals the exponent
//! implies.

use std::fmt;

use serde::{Deserialize, Serialize};
use sml_codec::{unit_symbol, DecodedEntry, RawValue};
use tracing::{debug, warn};

use crate::history::ValueHistory;

/// Typed value of a projected entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MeterValue {
    /// Uppercase hexadecimal rendering of the raw bytes
    OctetString(String),
    Boolean(bool),
    Numeric(f64),
}

impl MeterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Numeric(_))
    }
}

impl fmt::Display for MeterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OctetString(hex) => f.write_str(hex),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Numeric(v) => write!(f, "{}", v),
        }
    }
}

/// A value received for one identifier at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalValue {
    pub identifier: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub value: MeterValue,
    /// Unit symbol reported by the meter, empty when absent or unknown
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
}

/// Render a 6-byte object name as `A-B:C.D.E*F`
pub fn format_obis(obis: &[u8; 6]) -> String {
    format!(
        "{}-{}:{}.{}.{}*{}",
        obis[0], obis[1], obis[2], obis[3], obis[4], obis[5]
    )
}

/// Apply a decimal scaler and round half away from zero to `max(0, -scaler)` decimals
///
/// Returns `None` when the result is not a finite number.
pub fn scale_numeric(raw: f64, scaler: i8) -> Option<f64> {
    let precision = usize::try_from(-i32::from(scaler)).unwrap_or(0);
    let value = raw * 10f64.powi(i32::from(scaler));
    let factor = 10f64.powi(precision as i32);
    let rounded = (value * factor).round() / factor;
    if !rounded.is_finite() {
        return None;
    }

    let text = format!("{:.*}", precision, rounded);
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert one entry, logging the reason when it is dropped
pub fn project_entry(entry: &DecodedEntry, timestamp: i64) -> Option<CanonicalValue> {
    let identifier = format_obis(&entry.obis);

    let Some(raw) = entry.value.as_ref() else {
        warn!("Entry {} has no value, skipping", identifier);
        return None;
    };

    let scaler = entry.scaler.unwrap_or(0);
    let value = match raw {
        RawValue::OctetString(bytes) => MeterValue::OctetString(common::hex::encode_upper(bytes)),
        RawValue::Boolean(b) => MeterValue::Boolean(*b),
        RawValue::Integer(v) => match scale_numeric(*v as f64, scaler) {
            Some(v) => MeterValue::Numeric(v),
            None => {
                warn!("Entry {}: {} * 10^{} is not a finite number", identifier, v, scaler);
                return None;
            },
        },
        RawValue::Unsigned(v) => match scale_numeric(*v as f64, scaler) {
            Some(v) => MeterValue::Numeric(v),
            None => {
                warn!("Entry {}: {} * 10^{} is not a finite number", identifier, v, scaler);
                return None;
            },
        },
        RawValue::Unsupported => {
            warn!(
                "Entry {} has unsupported value type {:?}, skipping",
                identifier,
                raw.kind()
            );
            return None;
        },
    };

    let unit = entry
        .unit
        .and_then(unit_symbol)
        .unwrap_or_default()
        .to_string();

    Some(CanonicalValue {
        identifier,
        timestamp,
        value,
        unit,
    })
}

/// Project all entries of one frame, appending each value to `history`
///
/// The returned values keep the entry order; dropped entries do not affect
/// their siblings.
pub fn project(
    entries: &[DecodedEntry],
    timestamp: i64,
    history: &mut ValueHistory,
) -> Vec<CanonicalValue> {
    let mut values = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Some(value) = project_entry(entry, timestamp) {
            debug!("{} = {}", value.identifier, value.value);
            history.record(value.clone());
            values.push(value);
        }
    }
    values
}
