//! SML transport protocol v1 helpers
//!
//! A transport frame is `START_SEQUENCE`, the escaped SML file padded with
//! zeros to a multiple of four bytes, `END_SEQUENCE`, the padding count and a
//! CRC16 over everything before it.

use std::borrow::Cow;

use crc::{Crc, CRC_16_IBM_SDLC};

pub const ESCAPE_SEQUENCE: [u8; 4] = [0x1B; 4];
pub const START_SEQUENCE: [u8; 8] = [0x1B, 0x1B, 0x1B, 0x1B, 0x01, 0x01, 0x01, 0x01];
pub const END_SEQUENCE: [u8; 5] = [0x1B, 0x1B, 0x1B, 0x1B, 0x1A];

/// CRC16 X.25 (reflected 0x1021, init and xorout 0xFFFF)
const X25: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// CRC16 of `data` as it is stored big-endian in a message
///
/// Meters transmit the X.25 checksum low byte first, so the big-endian value
/// read back from the stream is the byte-swapped checksum.
pub fn message_crc(data: &[u8]) -> u16 {
    X25.checksum(data).swap_bytes()
}

/// Undo transport escaping: every `1B1B1B1B 1B1B1B1B` becomes `1B1B1B1B`
pub fn unescape(payload: &[u8]) -> Cow<'_, [u8]> {
    let doubled = ESCAPE_SEQUENCE.len() * 2;
    let has_escape = payload
        .windows(doubled)
        .any(|w| w.iter().all(|&b| b == 0x1B));
    if !has_escape {
        return Cow::Borrowed(payload);
    }

    let mut out = Vec::with_capacity(payload.len());
    let mut i = 0;
    while i < payload.len() {
        let rest = &payload[i..];
        if rest.len() >= doubled && rest[..doubled].iter().all(|&b| b == 0x1B) {
            out.extend_from_slice(&ESCAPE_SEQUENCE);
            i += doubled;
        } else {
            out.push(payload[i]);
            i += 1;
        }
    }
    Cow::Owned(out)
}

/// Escape every occurrence of four `0x1B` bytes by doubling it
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i..].starts_with(&ESCAPE_SEQUENCE) {
            out.extend_from_slice(&ESCAPE_SEQUENCE);
            out.extend_from_slice(&ESCAPE_SEQUENCE);
            i += ESCAPE_SEQUENCE.len();
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}

/// Wrap an encoded SML file into a complete transport frame
pub fn wrap_transport(file: &[u8]) -> Vec<u8> {
    let escaped = escape(file);
    let padding = (4 - escaped.len() % 4) % 4;

    let mut frame =
        Vec::with_capacity(START_SEQUENCE.len() + escaped.len() + padding + END_SEQUENCE.len() + 3);
    frame.extend_from_slice(&START_SEQUENCE);
    frame.extend_from_slice(&escaped);
    frame.resize(frame.len() + padding, 0x00);
    frame.extend_from_slice(&END_SEQUENCE);
    frame.push(padding as u8);

    let crc = X25.checksum(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}
