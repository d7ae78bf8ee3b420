//! Smart Message Language (SML) codec
//!
//! Decodes the payload between the SML transport start and end sequences into
//! the value list entries of GetListResponse messages, and encodes SML files
//! and transport frames for simulators and tests.
//!
//! ```
//! use sml_codec::{encode_file, FrameCodec, GetListResponse, MessageBody, RawValue, SmlCodec,
//!     SmlMessage, DecodedEntry};
//!
//! let file = encode_file(&[SmlMessage::new(
//!     vec![0x01],
//!     MessageBody::GetListResponse(GetListResponse {
//!         server_id: vec![0x0A, 0x01],
//!         list_name: None,
//!         entries: vec![DecodedEntry::new([1, 0, 1, 8, 0, 255], Some(RawValue::Unsigned(42)))],
//!     }),
//! )]);
//! let entries = SmlCodec::new().decode(&file).unwrap();
//! assert_eq!(entries[0].value, Some(RawValue::Unsigned(42)));
//! ```

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod tl;
pub mod transport;
pub mod types;

pub use decoder::decode_entries;
pub use encoder::{encode_file, encode_message, GetListResponse, MessageBody, SmlMessage, SmlWriter};
pub use error::DecodeError;
pub use transport::{wrap_transport, END_SEQUENCE, START_SEQUENCE};
pub use types::{unit_symbol, DecodedEntry, RawValue, ValueKind};

/// Decodes one raw frame payload into its entries
///
/// Implementations must not retain the payload and must be callable
/// repeatedly; a failure concerns only the payload passed in.
pub trait FrameCodec: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<Vec<DecodedEntry>, DecodeError>;
}

/// [`FrameCodec`] for SML transport v1 payloads
#[derive(Debug, Clone, Copy)]
pub struct SmlCodec {
    verify_crc: bool,
}

impl SmlCodec {
    pub fn new() -> Self {
        Self { verify_crc: true }
    }

    pub fn with_crc_verification(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    pub fn verifies_crc(&self) -> bool {
        self.verify_crc
    }
}

impl Default for SmlCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec for SmlCodec {
    fn decode(&self, payload: &[u8]) -> Result<Vec<DecodedEntry>, DecodeError> {
        let data = transport::unescape(payload);
        decode_entries(&data, self.verify_crc)
    }
}
