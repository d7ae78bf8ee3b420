//! Type-length field handling
//!
//! Layout of a TL byte: bit 7 flags another TL byte, bits 6..4 carry the type
//! and the low nibble a length nibble. Follow-up TL bytes only contribute their
//! low nibble. For primitives the decoded length counts the TL bytes too, for
//! lists it is the element count.

use crate::error::{DecodeError, Result};

/// Marker for an optional field that is not present
pub const OPTIONAL_ABSENT: u8 = 0x01;
/// Terminates a message; also used as padding
pub const END_OF_MESSAGE: u8 = 0x00;

const MORE_FLAG: u8 = 0x80;
const TYPE_MASK: u8 = 0x70;
const LENGTH_MASK: u8 = 0x0F;
const MAX_TL_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlType {
    OctetString,
    Boolean,
    Integer,
    Unsigned,
    List,
}

impl TlType {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(Self::OctetString),
            0x40 => Some(Self::Boolean),
            0x50 => Some(Self::Integer),
            0x60 => Some(Self::Unsigned),
            0x70 => Some(Self::List),
            _ => None,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::OctetString => 0x00,
            Self::Boolean => 0x40,
            Self::Integer => 0x50,
            Self::Unsigned => 0x60,
            Self::List => 0x70,
        }
    }
}

/// A decoded TL header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeLength {
    pub ty: TlType,
    /// Payload byte count for primitives, element count for lists
    pub len: usize,
    /// Number of TL bytes consumed
    pub header_len: usize,
}

/// Read the TL header starting at `offset`
pub fn read_type_length(buf: &[u8], offset: usize) -> Result<TypeLength> {
    let first = *buf.get(offset).ok_or(DecodeError::UnexpectedEnd { offset })?;
    let ty = TlType::from_bits(first & TYPE_MASK).ok_or(DecodeError::InvalidTypeLength {
        byte: first,
        offset,
    })?;

    let mut len = (first & LENGTH_MASK) as usize;
    let mut more = first & MORE_FLAG != 0;
    let mut header_len = 1;
    while more {
        if header_len >= MAX_TL_BYTES {
            return Err(DecodeError::InvalidTypeLength {
                byte: first,
                offset,
            });
        }
        let pos = offset + header_len;
        let byte = *buf.get(pos).ok_or(DecodeError::UnexpectedEnd { offset: pos })?;
        len = (len << 4) | (byte & LENGTH_MASK) as usize;
        more = byte & MORE_FLAG != 0;
        header_len += 1;
    }

    let len = match ty {
        TlType::List => len,
        _ => len
            .checked_sub(header_len)
            .ok_or(DecodeError::InvalidTypeLength {
                byte: first,
                offset,
            })?,
    };

    Ok(TypeLength {
        ty,
        len,
        header_len,
    })
}

/// Append a TL header; `len` is the payload byte count or the element count
pub fn write_type_length(out: &mut Vec<u8>, ty: TlType, len: usize) {
    let mut header_len = 1;
    let total = loop {
        let total = match ty {
            TlType::List => len,
            _ => len + header_len,
        };
        if header_len >= MAX_TL_BYTES || total >> (4 * header_len) == 0 {
            break total;
        }
        header_len += 1;
    };

    for i in (0..header_len).rev() {
        let nibble = ((total >> (4 * i)) as u8) & LENGTH_MASK;
        let more = if i > 0 { MORE_FLAG } else { 0 };
        let ty_bits = if i == header_len - 1 { ty.bits() } else { 0 };
        out.push(more | ty_bits | nibble);
    }
}
