//! Offline decoding of captured meter output

use sml_codec::FrameCodec;

use crate::error::{MeterSrvError, Result};
use crate::framing::FrameExtractor;
use crate::history::{HistoryPolicy, ValueHistory};
use crate::projector::{project, CanonicalValue};

/// Decode a capture that is either transport framed or a bare SML file
///
/// Framed input must contain at least one complete frame. Any frame that
/// fails to decode fails the whole capture.
pub fn decode_capture(
    data: &[u8],
    codec: &dyn FrameCodec,
    timestamp: i64,
) -> Result<Vec<CanonicalValue>> {
    let extractor = FrameExtractor::sml();
    let mut history = ValueHistory::new(HistoryPolicy::Unbounded);

    let framed = data
        .windows(extractor.start_marker().len())
        .any(|w| w == extractor.start_marker());
    if !framed {
        let entries = codec.decode(data)?;
        return Ok(project(&entries, timestamp, &mut history));
    }

    let extraction = extractor.extract(data);
    if extraction.frames.is_empty() {
        return Err(MeterSrvError::protocol("Capture contains no complete frame"));
    }

    let mut values = Vec::new();
    for (index, payload) in extraction.frames.iter().enumerate() {
        let entries = codec
            .decode(payload)
            .map_err(|e| MeterSrvError::protocol(format!("Frame {}: {}", index, e)))?;
        values.extend(project(&entries, timestamp, &mut history));
    }
    Ok(values)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::projector::MeterValue;
    use sml_codec::{
        encode_file, wrap_transport, DecodedEntry, GetListResponse, MessageBody, RawValue,
        SmlCodec, SmlMessage,
    };

    fn file() -> Vec<u8> {
        encode_file(&[
            SmlMessage::new(
                vec![0x01],
                MessageBody::OpenResponse {
                    req_file_id: vec![0x02],
                    server_id: vec![0x0A],
                },
            ),
            SmlMessage::new(
                vec![0x03],
                MessageBody::GetListResponse(GetListResponse {
                    server_id: vec![0x0A],
                    list_name: None,
                    entries: vec![DecodedEntry::new(
                        [1, 0, 16, 7, 0, 255],
                        Some(RawValue::Integer(-230)),
                    )
                    .with_unit(27)],
                }),
            ),
            SmlMessage::new(vec![0x04], MessageBody::CloseResponse),
        ])
    }

    #[test]
    fn test_bare_and_framed_capture() {
        let codec = SmlCodec::new();
        let bare = decode_capture(&file(), &codec, 0).unwrap();
        let framed = decode_capture(&wrap_transport(&file()), &codec, 0).unwrap();

        assert_eq!(bare, framed);
        assert_eq!(bare[0].identifier, "1-0:16.7.0*255");
        assert_eq!(bare[0].value, MeterValue::Numeric(-230.0));
        assert_eq!(bare[0].unit, "W");
    }

    #[test]
    fn test_incomplete_frame_is_an_error() {
        let mut framed = wrap_transport(&file());
        framed.truncate(framed.len() - 8);
        let err = decode_capture(&framed, &SmlCodec::new(), 0).unwrap_err();
        assert!(err.to_string().contains("no complete frame"));
    }
}
