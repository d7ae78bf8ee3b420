//! Values produced by the decoder

/// Raw value of a list entry as it appeared on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    OctetString(Vec<u8>),
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    /// Structured values (lists) the projector has no representation for
    Unsupported,
}

/// Discriminant of a [`RawValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    OctetString,
    Boolean,
    Integer,
    Unsigned,
    Unknown,
}

impl RawValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::OctetString(_) => ValueKind::OctetString,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Integer(_) => ValueKind::Integer,
            Self::Unsigned(_) => ValueKind::Unsigned,
            Self::Unsupported => ValueKind::Unknown,
        }
    }
}

/// One entry of a GetListResponse value list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEntry {
    /// OBIS code A-B:C.D.E*F
    pub obis: [u8; 6],
    /// `None` when the meter sent the "absent" marker
    pub value: Option<RawValue>,
    pub scaler: Option<i8>,
    /// DLMS unit code, see [`unit_symbol`]
    pub unit: Option<u8>,
}

impl DecodedEntry {
    pub fn new(obis: [u8; 6], value: Option<RawValue>) -> Self {
        Self {
            obis,
            value,
            scaler: None,
            unit: None,
        }
    }

    pub fn with_scaler(mut self, scaler: i8) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn with_unit(mut self, unit: u8) -> Self {
        self.unit = Some(unit);
        self
    }
}

/// Symbol for the DLMS unit codes meters commonly report
pub fn unit_symbol(code: u8) -> Option<&'static str> {
    let symbol = match code {
        8 => "°",
        9 => "°C",
        27 => "W",
        28 => "VA",
        29 => "var",
        30 => "Wh",
        31 => "VAh",
        32 => "varh",
        33 => "A",
        34 => "C",
        35 => "V",
        44 => "Hz",
        255 => "",
        _ => return None,
    };
    Some(symbol)
}
