//! Shared fixtures for metersrv integration tests

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::Arc;

use common::time::ManualTimeProvider;
use metersrv::{CommunicationProtocol, Connection, ConnectionConfig, WatchedIdentifier};
use sml_codec::{
    encode_file, wrap_transport, DecodedEntry, GetListResponse, MessageBody, RawValue, SmlMessage,
};

pub const ENERGY_IMPORT: [u8; 6] = [1, 0, 1, 8, 0, 255];
pub const ACTIVE_POWER: [u8; 6] = [1, 0, 16, 7, 0, 255];
pub const DEVICE_ID: [u8; 6] = [1, 0, 96, 1, 0, 255];

/// One transport frame as a push-mode meter sends it: open, list, close
pub fn meter_frame(sequence: u8, energy: u64, power: i64) -> Vec<u8> {
    let entries = vec![
        DecodedEntry::new(DEVICE_ID, Some(RawValue::OctetString(vec![0x0A, 0x01, 0x1B, 0xFF]))),
        DecodedEntry::new(ENERGY_IMPORT, Some(RawValue::Unsigned(energy)))
            .with_scaler(-1)
            .with_unit(30),
        DecodedEntry::new(ACTIVE_POWER, Some(RawValue::Integer(power)))
            .with_scaler(0)
            .with_unit(27),
    ];
    wrap_transport(&encode_file(&[
        SmlMessage::new(
            vec![sequence, 0x01],
            MessageBody::OpenResponse {
                req_file_id: vec![sequence],
                server_id: vec![0x0A, 0x01],
            },
        ),
        SmlMessage::new(
            vec![sequence, 0x02],
            MessageBody::GetListResponse(GetListResponse {
                server_id: vec![0x0A, 0x01],
                list_name: None,
                entries,
            }),
        ),
        SmlMessage::new(vec![sequence, 0x03], MessageBody::CloseResponse),
    ]))
}

/// A frame whose list message fails its CRC check
pub fn corrupt_frame(sequence: u8) -> Vec<u8> {
    let mut frame = meter_frame(sequence, 1, 1);
    let pos = frame
        .windows(ENERGY_IMPORT.len())
        .position(|w| w == ENERGY_IMPORT)
        .unwrap();
    frame[pos + 3] ^= 0x55;
    frame
}

pub fn basement_config() -> ConnectionConfig {
    ConnectionConfig::new("basement", "/dev/ttyUSB0", CommunicationProtocol::DssInformation)
        .with_watched(vec![
            WatchedIdentifier::new("1-0:1.8.0*255")
                .with_description("Import")
                .with_unit("Wh"),
            WatchedIdentifier::new("1-0:16.7.0*255")
                .with_description("Power")
                .with_unit("W"),
        ])
}

pub fn connection(clock: &ManualTimeProvider) -> Connection {
    Connection::new(basement_config()).with_clock(Arc::new(clock.clone()))
}
