//! SML encoder
//!
//! Produces byte-exact SML files for meter simulators and tests. Only the
//! message bodies a push-mode meter emits are supported.

use crate::decoder::{CLOSE_RESPONSE, GET_LIST_RESPONSE, OPEN_RESPONSE};
use crate::tl::{write_type_length, TlType, END_OF_MESSAGE, OPTIONAL_ABSENT};
use crate::transport::message_crc;
use crate::types::{DecodedEntry, RawValue};

/// Low level TL writer
#[derive(Debug, Default, Clone)]
pub struct SmlWriter {
    buf: Vec<u8>,
}

impl SmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn absent(&mut self) -> &mut Self {
        self.buf.push(OPTIONAL_ABSENT);
        self
    }

    pub fn octet_string(&mut self, data: &[u8]) -> &mut Self {
        write_type_length(&mut self.buf, TlType::OctetString, data.len());
        self.buf.extend_from_slice(data);
        self
    }

    pub fn optional_octet_string(&mut self, data: Option<&[u8]>) -> &mut Self {
        match data {
            Some(data) => self.octet_string(data),
            None => self.absent(),
        }
    }

    pub fn boolean(&mut self, value: bool) -> &mut Self {
        write_type_length(&mut self.buf, TlType::Boolean, 1);
        self.buf.push(u8::from(value));
        self
    }

    /// Signed integer in the narrowest of 1, 2, 4 or 8 bytes
    pub fn integer(&mut self, value: i64) -> &mut Self {
        let width = if i8::try_from(value).is_ok() {
            1
        } else if i16::try_from(value).is_ok() {
            2
        } else if i32::try_from(value).is_ok() {
            4
        } else {
            8
        };
        write_type_length(&mut self.buf, TlType::Integer, width);
        self.buf.extend_from_slice(&value.to_be_bytes()[8 - width..]);
        self
    }

    /// Unsigned integer in the narrowest of 1, 2, 4 or 8 bytes
    pub fn unsigned(&mut self, value: u64) -> &mut Self {
        let width = if value <= u64::from(u8::MAX) {
            1
        } else if value <= u64::from(u16::MAX) {
            2
        } else if value <= u64::from(u32::MAX) {
            4
        } else {
            8
        };
        self.unsigned_fixed(value, width)
    }

    /// Unsigned integer in exactly `width` bytes (1..=8), truncating higher bytes
    pub fn unsigned_fixed(&mut self, value: u64, width: usize) -> &mut Self {
        let width = width.clamp(1, 8);
        write_type_length(&mut self.buf, TlType::Unsigned, width);
        self.buf.extend_from_slice(&value.to_be_bytes()[8 - width..]);
        self
    }

    pub fn list(&mut self, count: usize) -> &mut Self {
        write_type_length(&mut self.buf, TlType::List, count);
        self
    }

    pub fn raw_value(&mut self, value: Option<&RawValue>) -> &mut Self {
        match value {
            None => self.absent(),
            Some(RawValue::OctetString(bytes)) => self.octet_string(bytes),
            Some(RawValue::Boolean(b)) => self.boolean(*b),
            Some(RawValue::Integer(v)) => self.integer(*v),
            Some(RawValue::Unsigned(v)) => self.unsigned(*v),
            Some(RawValue::Unsupported) => self.list(0),
        }
    }

    fn end_of_message(&mut self) -> &mut Self {
        self.buf.push(END_OF_MESSAGE);
        self
    }
}

/// GetListResponse content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetListResponse {
    pub server_id: Vec<u8>,
    pub list_name: Option<Vec<u8>>,
    pub entries: Vec<DecodedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    OpenResponse {
        req_file_id: Vec<u8>,
        server_id: Vec<u8>,
    },
    GetListResponse(GetListResponse),
    CloseResponse,
}

impl MessageBody {
    pub fn tag(&self) -> u32 {
        match self {
            Self::OpenResponse { .. } => OPEN_RESPONSE,
            Self::GetListResponse(_) => GET_LIST_RESPONSE,
            Self::CloseResponse => CLOSE_RESPONSE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmlMessage {
    pub transaction_id: Vec<u8>,
    pub group_no: u8,
    pub abort_on_error: u8,
    pub body: MessageBody,
}

impl SmlMessage {
    pub fn new(transaction_id: Vec<u8>, body: MessageBody) -> Self {
        Self {
            transaction_id,
            group_no: 0,
            abort_on_error: 0,
            body,
        }
    }
}

fn write_entry(w: &mut SmlWriter, entry: &DecodedEntry) {
    // status and valTime are not carried
    w.list(7).octet_string(&entry.obis).absent().absent();
    match entry.unit {
        Some(unit) => w.unsigned_fixed(u64::from(unit), 1),
        None => w.absent(),
    };
    match entry.scaler {
        Some(scaler) => w.integer(i64::from(scaler)),
        None => w.absent(),
    };
    w.raw_value(entry.value.as_ref()).absent();
}

fn write_body(w: &mut SmlWriter, body: &MessageBody) {
    w.list(2).unsigned_fixed(u64::from(body.tag()), 4);
    match body {
        MessageBody::OpenResponse {
            req_file_id,
            server_id,
        } => {
            w.list(6)
                .absent()
                .absent()
                .octet_string(req_file_id)
                .octet_string(server_id)
                .absent()
                .absent();
        },
        MessageBody::GetListResponse(response) => {
            w.list(7)
                .absent()
                .octet_string(&response.server_id)
                .optional_octet_string(response.list_name.as_deref())
                .absent()
                .list(response.entries.len());
            for entry in &response.entries {
                write_entry(w, entry);
            }
            w.absent().absent();
        },
        MessageBody::CloseResponse => {
            w.list(1).absent();
        },
    }
}

/// Append one message including its CRC and end marker
pub fn encode_message(w: &mut SmlWriter, message: &SmlMessage) {
    let start = w.len();
    w.list(6)
        .octet_string(&message.transaction_id)
        .unsigned_fixed(u64::from(message.group_no), 1)
        .unsigned_fixed(u64::from(message.abort_on_error), 1);
    write_body(w, &message.body);

    let crc = message_crc(&w.as_bytes()[start..]);
    w.unsigned_fixed(u64::from(crc), 2).end_of_message();
}

/// Encode a complete SML file (without transport framing)
pub fn encode_file(messages: &[SmlMessage]) -> Vec<u8> {
    let mut w = SmlWriter::new();
    for message in messages {
        encode_message(&mut w, message);
    }
    w.into_bytes()
}
