//! Connection and watched-identifier configuration types

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MeterSrvError, Result};

// ============================================================================
// Communication protocol
// ============================================================================

/// Protocol spoken by the meter on the serial line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CommunicationProtocol {
    #[default]
    Unknown,
    /// Push-mode SML telegrams
    DssInformation,
    /// IEC 62056-21 request/response
    D0Dialog,
}

impl CommunicationProtocol {
    pub const ALL: [CommunicationProtocol; 2] = [Self::DssInformation, Self::D0Dialog];

    /// Case-insensitive lookup of a protocol key; unknown keys map to `Unknown`
    pub fn parse(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "dss" => Self::DssInformation,
            "d0" => Self::D0Dialog,
            _ => Self::Unknown,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Unknown => "",
            Self::DssInformation => "dss",
            Self::D0Dialog => "d0",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::DssInformation => "DSS-Information (SML)",
            Self::D0Dialog => "D0-Dialog (IEC 62056-21)",
        }
    }
}

impl fmt::Display for CommunicationProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl From<String> for CommunicationProtocol {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<CommunicationProtocol> for String {
    fn from(value: CommunicationProtocol) -> Self {
        value.key().to_string()
    }
}

// ============================================================================
// Interval parsing
// ============================================================================

fn interval_regex() -> Result<&'static Regex> {
    static RE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:(\d+)\s*h)?\s*(?:(\d+)\s*m)?\s*(?:(\d+)\s*s)?\s*$"))
        .as_ref()
        .map_err(|e| MeterSrvError::internal(format!("Interval pattern: {}", e)))
}

/// Parse an interval such as `"1h 2m 3s"`, `"90s"` or `"5m"`
///
/// The components must appear in h, m, s order. An empty string is zero.
pub fn parse_interval(text: &str) -> Result<Duration> {
    let caps = interval_regex()?
        .captures(text)
        .ok_or_else(|| MeterSrvError::config(format!("Invalid interval '{}'", text)))?;

    let mut seconds: u64 = 0;
    for (index, factor) in [(1, 3600u64), (2, 60), (3, 1)] {
        if let Some(m) = caps.get(index) {
            let value: u64 = m
                .as_str()
                .parse()
                .map_err(|e| MeterSrvError::config(format!("Invalid interval '{}': {}", text, e)))?;
            seconds = value
                .checked_mul(factor)
                .and_then(|v| seconds.checked_add(v))
                .ok_or_else(|| MeterSrvError::config(format!("Interval '{}' overflows", text)))?;
        }
    }
    Ok(Duration::from_secs(seconds))
}

/// Render an interval in the format accepted by [`parse_interval`]
pub fn format_interval(interval: Duration) -> String {
    let total = interval.as_secs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);

    let mut parts = Vec::new();
    if h > 0 {
        parts.push(format!("{}h", h));
    }
    if m > 0 {
        parts.push(format!("{}m", m));
    }
    if s > 0 || parts.is_empty() {
        parts.push(format!("{}s", s));
    }
    parts.join(" ")
}

/// Serde adapter: whole seconds out, seconds or an interval string in
mod interval_serde {
    use std::time::Duration;

    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        struct IntervalVisitor;

        impl de::Visitor<'_> for IntervalVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("seconds or an interval like \"1h 2m 3s\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
                Ok(Duration::from_secs(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
                u64::try_from(v)
                    .map(Duration::from_secs)
                    .map_err(|_| E::custom(format!("negative interval {}", v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
                super::parse_interval(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(IntervalVisitor)
    }
}

// ============================================================================
// Watched identifiers and connection configuration
// ============================================================================

/// An OBIS identifier a consumer wants to follow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedIdentifier {
    /// Canonical identifier, e.g. `1-0:1.8.0*255`
    pub identifier: String,
    #[serde(default)]
    pub description: String,
    /// Display unit, possibly SI-prefixed (`Wh`, `kW`)
    #[serde(default)]
    pub unit: String,
    /// Minimum time between two displayed updates
    #[serde(default, with = "interval_serde")]
    pub min_interval: Duration,
}

impl WatchedIdentifier {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            description: String::new(),
            unit: String::new(),
            min_interval: Duration::ZERO,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.identifier.is_empty()
    }
}

/// Configuration of one meter connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub port_name: String,
    #[serde(default)]
    pub protocol: CommunicationProtocol,
    #[serde(default)]
    pub watched: Vec<WatchedIdentifier>,
}

impl ConnectionConfig {
    pub fn new(
        name: impl Into<String>,
        port_name: impl Into<String>,
        protocol: CommunicationProtocol,
    ) -> Self {
        Self {
            name: name.into(),
            port_name: port_name.into(),
            protocol,
            watched: Vec::new(),
        }
    }

    pub fn with_watched(mut self, watched: Vec<WatchedIdentifier>) -> Self {
        self.watched = watched;
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
            && !self.port_name.is_empty()
            && self.protocol != CommunicationProtocol::Unknown
    }

    /// Valid watched identifiers in configuration order
    pub fn watched_identifiers(&self) -> Vec<&str> {
        self.watched
            .iter()
            .filter(|w| w.is_valid())
            .map(|w| w.identifier.as_str())
            .collect()
    }

    /// First entry for `identifier`
    pub fn watched(&self, identifier: &str) -> Option<&WatchedIdentifier> {
        self.watched
            .iter()
            .find(|w| w.is_valid() && w.identifier == identifier)
    }
}
