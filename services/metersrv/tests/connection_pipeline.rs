//! Connection pipeline tests
//!
//! Feed transport frames through a connection the way a serial port
//! delivers them and check the produced events.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod fixtures;

use common::time::ManualTimeProvider;
use metersrv::{ConnectionEvent, MeterValue, WatchedIdentifier};
use tracing_test::traced_test;

use fixtures::{connection, corrupt_frame, meter_frame};

fn values(events: &[ConnectionEvent]) -> Vec<(String, MeterValue)> {
    events
        .iter()
        .filter_map(|e| match e {
            ConnectionEvent::ValueReceived {
                identifier, value, ..
            } => Some((identifier.clone(), value.clone())),
            _ => None,
        })
        .collect()
}

fn stream() -> Vec<u8> {
    let mut data = vec![0x00, 0xFF, 0x1B, 0x1B];
    data.extend(meter_frame(1, 123_456, 230));
    data.extend_from_slice(&[0x42; 7]);
    data.extend(meter_frame(2, 123_460, -15));
    data.extend(meter_frame(3, 123_470, 0));
    data
}

#[test]
fn test_frame_values_in_order() {
    let clock = ManualTimeProvider::new(1_700_000_000_000);
    let mut conn = connection(&clock);
    conn.open().unwrap();

    let events = conn.on_data(&meter_frame(1, 123_456, 230));
    assert_eq!(
        values(&events),
        vec![
            ("1-0:96.1.0*255".to_string(), MeterValue::OctetString("0A011BFF".to_string())),
            ("1-0:1.8.0*255".to_string(), MeterValue::Numeric(12_345.6)),
            ("1-0:16.7.0*255".to_string(), MeterValue::Numeric(230.0)),
        ]
    );
    assert!(events.iter().all(|e| matches!(
        e,
        ConnectionEvent::ValueReceived { timestamp, .. } if *timestamp == 1_700_000_000_000
    )));
}

#[test]
fn test_chunking_does_not_change_values() {
    let data = stream();

    let clock = ManualTimeProvider::new(0);
    let mut whole = connection(&clock);
    whole.open().unwrap();
    let expected = values(&whole.on_data(&data));
    assert_eq!(expected.len(), 9);

    for chunk_size in [1, 2, 3, 5, 8, 13, 64, 500] {
        let mut conn = connection(&clock);
        conn.open().unwrap();

        let mut events = Vec::new();
        for chunk in data.chunks(chunk_size) {
            events.extend(conn.on_data(chunk));
        }
        assert_eq!(values(&events), expected, "chunk size {}", chunk_size);
        assert!(conn.buffered().len() < 8, "chunk size {}", chunk_size);
    }
}

#[traced_test]
#[test]
fn test_corrupt_frame_is_isolated() {
    let clock = ManualTimeProvider::new(0);
    let mut conn = connection(&clock);
    conn.open().unwrap();

    let mut data = corrupt_frame(1);
    data.extend(meter_frame(2, 500, 7));

    let events = conn.on_data(&data);
    assert_eq!(
        values(&events)[1],
        ("1-0:1.8.0*255".to_string(), MeterValue::Numeric(50.0))
    );
    assert_eq!(values(&events).len(), 3);
    assert_eq!(conn.stats().decode_failures, 1);
    assert_eq!(conn.stats().frames_decoded, 1);
    assert!(logs_contain("discarding frame"));
}

#[test]
fn test_history_accumulates_per_identifier() {
    let clock = ManualTimeProvider::new(0);
    let mut conn = connection(&clock);
    conn.open().unwrap();

    for (i, power) in [100, 200, 300].into_iter().enumerate() {
        clock.set(i as i64 * 1_000);
        conn.on_data(&meter_frame(i as u8, 1, power));
    }

    assert_eq!(
        conn.history().numeric_samples("1-0:16.7.0*255"),
        Some(vec![(0, 100.0), (1_000, 200.0), (2_000, 300.0)])
    );
    assert_eq!(conn.history().numeric_samples("1-0:96.1.0*255"), None);
}

#[test]
fn test_reconfigure_while_connected() {
    let clock = ManualTimeProvider::new(0);
    let mut conn = connection(&clock);
    conn.open().unwrap();
    conn.on_data(&meter_frame(1, 1, 1));

    let mut new = conn.config().clone();
    new.watched = vec![
        WatchedIdentifier::new("1-0:16.7.0*255").with_description("Power").with_unit("kW"),
        WatchedIdentifier::new("1-0:2.8.0*255").with_description("Export"),
    ];
    let events = conn.set_config(new);

    assert_eq!(events[0], ConnectionEvent::ConnectionStateChanged(false));
    assert!(events.contains(&ConnectionEvent::WatchedIdentifierAdded(
        WatchedIdentifier::new("1-0:2.8.0*255").with_description("Export")
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ConnectionEvent::WatchedIdentifierRemoved(w) if w.identifier == "1-0:1.8.0*255"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ConnectionEvent::WatchedIdentifierChanged { new, .. } if new.unit == "kW"
    )));
    assert_eq!(events.len(), 4);

    // history survives, data is ignored until reopened
    assert_eq!(conn.history().len("1-0:16.7.0*255"), 1);
    assert!(conn.on_data(&meter_frame(2, 1, 1)).is_empty());
    conn.open().unwrap();
    assert_eq!(values(&conn.on_data(&meter_frame(3, 1, 1))).len(), 3);
}
