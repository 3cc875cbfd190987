// Fixed-vector codec tests for the LACPDU/Marker PDU wire format, §4.5.
// Byte layout follows `original_source/lacp.h`'s packed structs.

use std::sync::LazyLock as Lazy;

use lacp_utils::mac_addr::MacAddr;
use lacpd::packet::{Lacpdu, MarkerPdu, PduParty, StateFlags, Subtype, peek_subtype};
use lacpd::types::SystemId;

static LACPDU_FIXTURE: Lazy<(Lacpdu, Vec<u8>)> = Lazy::new(|| {
    let pdu = Lacpdu {
        actor: PduParty {
            system: SystemId {
                priority: 32768,
                mac: MacAddr::from([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            },
            key: 10,
            port_priority: 32768,
            port: 1,
            state: StateFlags::ACTIVITY | StateFlags::AGGREGATION | StateFlags::SYNCHRONIZATION,
        },
        partner: PduParty {
            system: SystemId {
                priority: 32768,
                mac: MacAddr::from([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
            },
            key: 10,
            port_priority: 32768,
            port: 5,
            state: StateFlags::ACTIVITY
                | StateFlags::AGGREGATION
                | StateFlags::SYNCHRONIZATION
                | StateFlags::COLLECTING
                | StateFlags::DISTRIBUTING,
        },
        collector_max_delay: 0,
    };
    let bytes = pdu.encode().to_vec();
    (pdu, bytes)
});

static MARKER_FIXTURE: Lazy<(MarkerPdu, Vec<u8>)> = Lazy::new(|| {
    let marker = MarkerPdu {
        requester_port: 7,
        requester_system: MacAddr::from([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
        requester_transaction_id: 0x1234_5678,
    };
    let bytes = marker.encode().to_vec();
    (marker, bytes)
});

fn test_encode_lacpdu(pdu: &Lacpdu, expected: &[u8]) {
    assert_eq!(pdu.encode().as_ref(), expected);
}

fn test_decode_lacpdu(bytes: &[u8], expected: &Lacpdu) {
    let decoded = Lacpdu::decode(bytes).expect("valid LACPDU decodes");
    assert_eq!(&decoded, expected);
}

fn test_encode_marker(marker: &MarkerPdu, expected: &[u8]) {
    assert_eq!(marker.encode().as_ref(), expected);
}

fn test_decode_marker(bytes: &[u8], expected: &MarkerPdu) {
    let decoded = MarkerPdu::decode(bytes).expect("valid Marker PDU decodes");
    assert_eq!(&decoded, expected);
}

#[test]
fn lacpdu_encodes_to_fixed_bytes() {
    let (pdu, bytes) = &*LACPDU_FIXTURE;
    test_encode_lacpdu(pdu, bytes);
}

#[test]
fn lacpdu_decodes_from_fixed_bytes() {
    let (pdu, bytes) = &*LACPDU_FIXTURE;
    test_decode_lacpdu(bytes, pdu);
}

#[test]
fn lacpdu_payload_is_110_bytes() {
    let (_, bytes) = &*LACPDU_FIXTURE;
    assert_eq!(bytes.len(), lacpd::packet::PDU_LEN);
}

#[test]
fn marker_encodes_to_fixed_bytes() {
    let (marker, bytes) = &*MARKER_FIXTURE;
    test_encode_marker(marker, bytes);
}

#[test]
fn marker_decodes_from_fixed_bytes() {
    let (marker, bytes) = &*MARKER_FIXTURE;
    test_decode_marker(bytes, marker);
}

#[test]
fn peek_subtype_distinguishes_lacp_and_marker() {
    let (_, lacp_bytes) = &*LACPDU_FIXTURE;
    let (_, marker_bytes) = &*MARKER_FIXTURE;
    assert_eq!(peek_subtype(lacp_bytes), Some(Subtype::Lacp));
    assert_eq!(peek_subtype(marker_bytes), Some(Subtype::Marker));
}

#[test]
fn marker_response_echoes_requester_fields() {
    let (marker, _) = &*MARKER_FIXTURE;
    let response = marker.clone().into_response();
    assert_eq!(response.requester_port, marker.requester_port);
    assert_eq!(response.requester_system, marker.requester_system);
    assert_eq!(
        response.requester_transaction_id,
        marker.requester_transaction_id
    );
}

#[test]
fn truncated_frame_is_rejected() {
    let (_, bytes) = &*LACPDU_FIXTURE;
    let truncated = &bytes[..bytes.len() - 1];
    assert!(Lacpdu::decode(truncated).is_err());
}
