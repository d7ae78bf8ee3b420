//! SML file decoder
//!
//! Walks the messages of an (unescaped) SML file and collects the value list
//! entries of every GetListResponse. Other message bodies are parsed only as
//! far as needed to skip them.

use tracing::{debug, trace, warn};

use crate::error::{DecodeError, Result};
use crate::tl::{read_type_length, TlType, END_OF_MESSAGE, OPTIONAL_ABSENT};
use crate::transport::message_crc;
use crate::types::{DecodedEntry, RawValue};

/// Message body tag of a GetListResponse
pub const GET_LIST_RESPONSE: u32 = 0x0701;
pub const OPEN_RESPONSE: u32 = 0x0101;
pub const CLOSE_RESPONSE: u32 = 0x0201;

const MAX_DEPTH: usize = 16;

/// Generic SML element
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Absent,
    Octets(Vec<u8>),
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    List(Vec<Node>),
}

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(DecodeError::UnexpectedEnd {
                offset: self.buf.len(),
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_node(&mut self, depth: usize) -> Result<Node> {
        let offset = self.pos;
        match self.peek() {
            None => return Err(DecodeError::UnexpectedEnd { offset }),
            Some(OPTIONAL_ABSENT) => {
                self.pos += 1;
                return Ok(Node::Absent);
            },
            Some(END_OF_MESSAGE) => {
                return Err(DecodeError::UnexpectedType {
                    expected: "element",
                    offset,
                })
            },
            Some(_) => {},
        }

        let tl = read_type_length(self.buf, offset)?;
        self.pos += tl.header_len;

        match tl.ty {
            TlType::OctetString => Ok(Node::Octets(self.take(tl.len)?.to_vec())),
            TlType::Boolean => {
                if tl.len != 1 {
                    return Err(DecodeError::InvalidLength {
                        length: tl.len,
                        offset,
                    });
                }
                Ok(Node::Boolean(self.take(1)?[0] != 0))
            },
            TlType::Integer => {
                let bytes = self.take_number(tl.len, offset)?;
                let init: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
                Ok(Node::Integer(
                    bytes.iter().fold(init, |acc, &b| (acc << 8) | i64::from(b)),
                ))
            },
            TlType::Unsigned => {
                let bytes = self.take_number(tl.len, offset)?;
                Ok(Node::Unsigned(
                    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
                ))
            },
            TlType::List => {
                if depth >= MAX_DEPTH || tl.len > self.buf.len() - self.pos {
                    return Err(DecodeError::InvalidLength {
                        length: tl.len,
                        offset,
                    });
                }
                let mut items = Vec::with_capacity(tl.len);
                for _ in 0..tl.len {
                    items.push(self.read_node(depth + 1)?);
                }
                Ok(Node::List(items))
            },
        }
    }

    fn take_number(&mut self, len: usize, offset: usize) -> Result<&'a [u8]> {
        if len == 0 || len > 8 {
            return Err(DecodeError::InvalidLength {
                length: len,
                offset,
            });
        }
        self.take(len)
    }

    /// Read only the header of a list, leaving its elements in the stream
    fn read_list_header(&mut self, expected: Option<usize>, what: &'static str) -> Result<usize> {
        let offset = self.pos;
        let tl = read_type_length(self.buf, offset)?;
        if tl.ty != TlType::List {
            return Err(DecodeError::UnexpectedType {
                expected: what,
                offset,
            });
        }
        if let Some(expected) = expected {
            if tl.len != expected {
                return Err(DecodeError::InvalidLength {
                    length: tl.len,
                    offset,
                });
            }
        }
        self.pos += tl.header_len;
        Ok(tl.len)
    }

    fn read_unsigned(&mut self, what: &'static str) -> Result<u64> {
        let offset = self.pos;
        match self.read_node(0)? {
            Node::Unsigned(v) => Ok(v),
            _ => Err(DecodeError::UnexpectedType {
                expected: what,
                offset,
            }),
        }
    }

    fn read_message(&mut self, verify_crc: bool, entries: &mut Vec<DecodedEntry>) -> Result<()> {
        let start = self.pos;
        self.read_list_header(Some(6), "message")?;

        let transaction_id = self.read_node(0)?;
        let _group_no = self.read_node(0)?;
        let _abort_on_error = self.read_node(0)?;

        self.read_list_header(Some(2), "message body")?;
        let tag = self.read_unsigned("message body tag")?;

        let mut found = Vec::new();
        if tag == u64::from(GET_LIST_RESPONSE) {
            self.read_get_list_response(&mut found)?;
        } else {
            trace!("Skipping message body tag {:#06X}", tag);
            self.read_node(0)?;
        }

        let crc_offset = self.pos;
        let stored = match self.read_node(0)? {
            Node::Unsigned(v) => u16::try_from(v).map_err(|_| DecodeError::InvalidLength {
                length: 8,
                offset: crc_offset,
            })?,
            _ => {
                return Err(DecodeError::UnexpectedType {
                    expected: "crc16",
                    offset: crc_offset,
                })
            },
        };
        if verify_crc {
            let computed = message_crc(&self.buf[start..crc_offset]);
            if computed != stored {
                return Err(DecodeError::CrcMismatch { stored, computed });
            }
        }

        if self.peek() != Some(END_OF_MESSAGE) {
            return Err(DecodeError::MissingEndOfMessage { offset: self.pos });
        }
        self.pos += 1;

        if let Node::Octets(id) = transaction_id {
            trace!(
                "Message {} tag {:#06X}: {} entries",
                hex_string(&id),
                tag,
                found.len()
            );
        }
        entries.append(&mut found);
        Ok(())
    }

    fn read_get_list_response(&mut self, entries: &mut Vec<DecodedEntry>) -> Result<()> {
        self.read_list_header(Some(7), "GetListResponse")?;
        let _client_id = self.read_node(0)?;
        let server_id = self.read_node(0)?;
        let _list_name = self.read_node(0)?;
        let _act_sensor_time = self.read_node(0)?;

        let count = self.read_list_header(None, "value list")?;
        for _ in 0..count {
            let offset = self.pos;
            let node = self.read_node(0)?;
            if let Some(entry) = entry_from_node(node, offset)? {
                entries.push(entry);
            }
        }

        let _list_signature = self.read_node(0)?;
        let _act_gateway_time = self.read_node(0)?;

        if let Node::Octets(id) = server_id {
            debug!("GetListResponse from {}: {} entries", hex_string(&id), count);
        }
        Ok(())
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Convert a list entry node; `Ok(None)` drops an entry without failing the file
pub(crate) fn entry_from_node(node: Node, offset: usize) -> Result<Option<DecodedEntry>> {
    let Node::List(fields) = node else {
        return Err(DecodeError::UnexpectedType {
            expected: "list entry",
            offset,
        });
    };
    let field_count = fields.len();
    let [obj_name, status, _val_time, unit, scaler, value, _signature]: [Node; 7] =
        fields.try_into().map_err(|_| DecodeError::InvalidLength {
            length: field_count,
            offset,
        })?;

    let obis: [u8; 6] = match obj_name {
        Node::Octets(bytes) => match <[u8; 6]>::try_from(bytes.as_slice()) {
            Ok(obis) => obis,
            Err(_) => {
                warn!(
                    "Skipping entry at offset {}: object name has {} bytes",
                    offset,
                    bytes.len()
                );
                return Ok(None);
            },
        },
        _ => {
            warn!("Skipping entry at offset {}: no object name", offset);
            return Ok(None);
        },
    };

    if !matches!(status, Node::Absent | Node::Unsigned(_)) {
        return Err(DecodeError::UnexpectedType {
            expected: "status",
            offset,
        });
    }

    let unit = match unit {
        Node::Absent => None,
        Node::Unsigned(v) => Some(u8::try_from(v).map_err(|_| DecodeError::UnexpectedType {
            expected: "unit",
            offset,
        })?),
        _ => {
            return Err(DecodeError::UnexpectedType {
                expected: "unit",
                offset,
            })
        },
    };

    let scaler = match scaler {
        Node::Absent => None,
        Node::Integer(v) => Some(i8::try_from(v).map_err(|_| DecodeError::UnexpectedType {
            expected: "scaler",
            offset,
        })?),
        _ => {
            return Err(DecodeError::UnexpectedType {
                expected: "scaler",
                offset,
            })
        },
    };

    let value = match value {
        Node::Absent => None,
        Node::Octets(bytes) => Some(RawValue::OctetString(bytes)),
        Node::Boolean(b) => Some(RawValue::Boolean(b)),
        Node::Integer(v) => Some(RawValue::Integer(v)),
        Node::Unsigned(v) => Some(RawValue::Unsigned(v)),
        Node::List(_) => Some(RawValue::Unsupported),
    };

    Ok(Some(DecodedEntry {
        obis,
        value,
        scaler,
        unit,
    }))
}

/// Decode all GetListResponse entries of an unescaped SML file
pub fn decode_entries(data: &[u8], verify_crc: bool) -> Result<Vec<DecodedEntry>> {
    let mut reader = Reader::new(data);
    let mut entries = Vec::new();

    while let Some(byte) = reader.peek() {
        if byte == END_OF_MESSAGE {
            reader.pos += 1;
            continue;
        }
        reader.read_message(verify_crc, &mut entries)?;
    }

    Ok(entries)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::encoder::{encode_file, GetListResponse, MessageBody, SmlMessage};
    use tracing_test::traced_test;

    const ENERGY: [u8; 6] = [1, 0, 1, 8, 0, 255];
    const POWER: [u8; 6] = [1, 0, 16, 7, 0, 255];

    fn meter_file(entries: Vec<DecodedEntry>) -> Vec<u8> {
        let server_id = vec![0x0A, 0x01, 0x49, 0x53, 0x4B, 0x00, 0x04, 0x1A, 0x61, 0x2E];
        encode_file(&[
            SmlMessage::new(
                vec![0x01],
                MessageBody::OpenResponse {
                    req_file_id: vec![0x00, 0x01],
                    server_id: server_id.clone(),
                },
            ),
            SmlMessage::new(
                vec![0x02],
                MessageBody::GetListResponse(GetListResponse {
                    server_id,
                    list_name: Some(vec![1, 0, 98, 10, 255, 255]),
                    entries,
                }),
            ),
            SmlMessage::new(vec![0x03], MessageBody::CloseResponse),
        ])
    }

    #[test]
    fn test_decode_list_entry_bytes() {
        // objName 1-0:1.8.0*255, status 0x0182, unit Wh, scaler -1, int64 12345
        let bytes = [
            0x77, 0x07, 0x01, 0x00, 0x01, 0x08, 0x00, 0xFF, 0x65, 0x00, 0x00, 0x01, 0x82, 0x01,
            0x62, 0x1E, 0x52, 0xFF, 0x59, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x30, 0x39, 0x01,
        ];
        let node = Reader::new(&bytes).read_node(0).unwrap();
        let entry = entry_from_node(node, 0).unwrap().unwrap();

        assert_eq!(entry.obis, ENERGY);
        assert_eq!(entry.unit, Some(30));
        assert_eq!(entry.scaler, Some(-1));
        assert_eq!(entry.value, Some(RawValue::Integer(12345)));
    }

    #[test]
    fn test_negative_integer_sign_extension() {
        let node = Reader::new(&[0x53, 0xFF, 0x38]).read_node(0).unwrap();
        assert_eq!(node, Node::Integer(-200));
    }

    #[test]
    fn test_decode_file_with_multiple_messages() {
        let file = meter_file(vec![
            DecodedEntry::new(ENERGY, Some(RawValue::Unsigned(123_456_789)))
                .with_scaler(-1)
                .with_unit(30),
            DecodedEntry::new(POWER, Some(RawValue::Integer(-512))).with_unit(27),
            DecodedEntry::new([1, 0, 96, 1, 0, 255], Some(RawValue::OctetString(vec![0xAB, 0x01]))),
        ]);

        let entries = decode_entries(&file, true).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].value, Some(RawValue::Unsigned(123_456_789)));
        assert_eq!(entries[0].scaler, Some(-1));
        assert_eq!(entries[0].unit, Some(30));
        assert_eq!(entries[1].obis, POWER);
        assert_eq!(entries[1].value, Some(RawValue::Integer(-512)));
        assert_eq!(entries[1].scaler, None);
        assert_eq!(
            entries[2].value,
            Some(RawValue::OctetString(vec![0xAB, 0x01]))
        );
    }

    #[test]
    fn test_padding_is_skipped() {
        let mut file = meter_file(vec![DecodedEntry::new(ENERGY, Some(RawValue::Unsigned(1)))]);
        file.extend_from_slice(&[0x00, 0x00, 0x00]);
        let mut padded = vec![0x00];
        padded.extend_from_slice(&file);

        assert_eq!(decode_entries(&padded, true).unwrap().len(), 1);
    }

    #[test]
    fn test_absent_value_is_kept_as_none() {
        let file = meter_file(vec![DecodedEntry::new(ENERGY, None)]);
        let entries = decode_entries(&file, true).unwrap();
        assert_eq!(entries[0].value, None);
    }

    #[test]
    fn test_list_value_is_unsupported() {
        let file = meter_file(vec![DecodedEntry::new(ENERGY, Some(RawValue::Unsupported))]);
        let entries = decode_entries(&file, true).unwrap();
        assert_eq!(entries[0].value, Some(RawValue::Unsupported));
    }

    #[test]
    fn test_crc_mismatch() {
        let mut file = meter_file(vec![DecodedEntry::new(ENERGY, Some(RawValue::Unsigned(7)))]);
        // last message is the CloseResponse: ... 0x63 crc_hi crc_lo 0x00
        let crc_lo = file.len() - 2;
        file[crc_lo] ^= 0xFF;

        assert!(matches!(
            decode_entries(&file, true),
            Err(DecodeError::CrcMismatch { .. })
        ));
        assert_eq!(decode_entries(&file, false).unwrap().len(), 1);
    }

    #[test]
    fn test_truncated_file() {
        let file = meter_file(vec![DecodedEntry::new(ENERGY, Some(RawValue::Unsigned(7)))]);
        let truncated = &file[..file.len() / 2];
        assert!(decode_entries(truncated, false).is_err());
    }

    #[test]
    fn test_missing_end_of_message() {
        let mut file = meter_file(vec![]);
        let last = file.len() - 1;
        file[last] = 0x42;
        assert_eq!(
            decode_entries(&file, true),
            Err(DecodeError::MissingEndOfMessage { offset: last })
        );
    }

    #[test]
    #[traced_test]
    fn test_short_object_name_skipped() {
        let bytes = [
            0x77, 0x04, 0x01, 0x00, 0x01, 0x01, 0x01, 0x01, 0x01, 0x62, 0x05, 0x01,
        ];
        let node = Reader::new(&bytes).read_node(0).unwrap();
        assert_eq!(entry_from_node(node, 0).unwrap(), None);
        assert!(logs_contain("object name has 3 bytes"));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(matches!(
            decode_entries(&[0x2A, 0x00], true),
            Err(DecodeError::InvalidTypeLength { byte: 0x2A, .. })
        ));
        assert!(decode_entries(&[], true).unwrap().is_empty());
    }
}
