//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

// LACPDU and Marker PDU codec, per §4.5.
//
// Both PDUs share a 110-byte payload (the "Slow Protocols" subtype octet
// through the trailing reserved padding); together with the 14-byte Ethernet
// header this yields the standard 124-byte slow-protocol frame. Layout
// follows the original implementation's packed struct byte-for-byte
// (`original_source/lacp.h`'s `lacpdu_payload_t`/`marker_pdu_payload_t`),
// which is authoritative where spec.md's offset table is internally
// inconsistent by a couple of bytes around the partner TLV.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut, TryGetError};
use lacp_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use lacp_utils::mac_addr::MacAddr;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::types::SystemId;

// Ethernet framing constants (§4.5).
pub const ETHERTYPE_SLOW_PROTOCOLS: u16 = 0x8809;

// Slow protocol subtypes (IEEE 802.3, Annex 57B).
const SUBTYPE_LACP: u8 = 0x01;
const SUBTYPE_MARKER: u8 = 0x02;

const LACP_VERSION: u8 = 0x01;
const TLV_TYPE_ACTOR: u8 = 0x01;
const TLV_TYPE_PARTNER: u8 = 0x02;
const TLV_TYPE_COLLECTOR: u8 = 0x03;
const TLV_TYPE_TERMINATOR: u8 = 0x00;
const TLV_INFO_LENGTH: u8 = 0x14;
const TLV_COLLECTOR_LENGTH: u8 = 0x10;

const MARKER_VERSION: u8 = 0x01;
const TLV_TYPE_MARKER: u8 = 0x01;
const TLV_MARKER_LENGTH: u8 = 0x10;

/// Total on-wire size of a LACPDU or Marker PDU payload, excluding the
/// 14-byte Ethernet header.
pub const PDU_LEN: usize = 110;

// LACP state flags (actor_state / partner_state), LSB first per §4.5.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub struct StateFlags: u8 {
        const ACTIVITY      = 1 << 0;
        const TIMEOUT       = 1 << 1;
        const AGGREGATION   = 1 << 2;
        const SYNCHRONIZATION = 1 << 3;
        const COLLECTING    = 1 << 4;
        const DISTRIBUTING  = 1 << 5;
        const DEFAULTED     = 1 << 6;
        const EXPIRED       = 1 << 7;
    }
}

// One side (actor or partner) of a LACPDU, per §4.5's field layout.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PduParty {
    pub system: SystemId,
    pub key: u16,
    pub port_priority: u16,
    pub port: u16,
    pub state: StateFlags,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Lacpdu {
    pub actor: PduParty,
    pub partner: PduParty,
    pub collector_max_delay: u16,
}

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
pub enum Subtype {
    Lacp = SUBTYPE_LACP as isize,
    Marker = SUBTYPE_MARKER as isize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct MarkerPdu {
    pub requester_port: u16,
    pub requester_system: MacAddr,
    pub requester_transaction_id: u32,
}

#[derive(Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum DecodeError {
    IncompletePacket,
    UnknownSubtype(u8),
    InvalidVersion(u8),
    InvalidTlvType { expected: u8, found: u8 },
    InvalidTlvLength { expected: u8, found: u8 },
    ReadOutOfBounds,
}

// ===== impl Lacpdu =====

impl Lacpdu {
    pub fn encode(&self) -> BytesMut {
        TLS_BUF.with(|buf| {
            let mut buf = buf.borrow_mut();
            buf.clear();

            buf.put_u8(SUBTYPE_LACP);
            buf.put_u8(LACP_VERSION);
            Self::encode_party(&mut buf, TLV_TYPE_ACTOR, &self.actor);
            buf.put_bytes(0, 3); // reserved1
            Self::encode_party(&mut buf, TLV_TYPE_PARTNER, &self.partner);
            buf.put_bytes(0, 3); // reserved2
            buf.put_u8(TLV_TYPE_COLLECTOR);
            buf.put_u8(TLV_COLLECTOR_LENGTH);
            buf.put_u16(self.collector_max_delay);
            buf.put_bytes(0, 12); // reserved3
            buf.put_u8(TLV_TYPE_TERMINATOR);
            buf.put_u8(0); // terminator length
            buf.put_bytes(0, 50); // reserved4

            debug_assert_eq!(buf.len(), PDU_LEN);
            buf.clone()
        })
    }

    fn encode_party(buf: &mut BytesMut, tlv_type: u8, party: &PduParty) {
        buf.put_u8(tlv_type);
        buf.put_u8(TLV_INFO_LENGTH);
        buf.put_u16(party.system.priority);
        buf.put_mac(&party.system.mac);
        buf.put_u16(party.key);
        buf.put_u16(party.port_priority);
        buf.put_u16(party.port);
        buf.put_u8(party.state.bits());
    }

    pub fn decode(data: &[u8]) -> Result<Lacpdu, DecodeError> {
        if data.len() < PDU_LEN {
            return Err(DecodeError::IncompletePacket);
        }
        let mut buf = Bytes::copy_from_slice(&data[0..PDU_LEN]);

        let subtype = buf.try_get_u8()?;
        if subtype != SUBTYPE_LACP {
            return Err(DecodeError::UnknownSubtype(subtype));
        }
        let version = buf.try_get_u8()?;
        if version != LACP_VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }
        let actor = Self::decode_party(&mut buf, TLV_TYPE_ACTOR)?;
        buf.try_advance(3).map_err(|_| DecodeError::ReadOutOfBounds)?;
        let partner = Self::decode_party(&mut buf, TLV_TYPE_PARTNER)?;
        buf.try_advance(3).map_err(|_| DecodeError::ReadOutOfBounds)?;

        let tlv_type = buf.try_get_u8()?;
        if tlv_type != TLV_TYPE_COLLECTOR {
            return Err(DecodeError::InvalidTlvType {
                expected: TLV_TYPE_COLLECTOR,
                found: tlv_type,
            });
        }
        let tlv_len = buf.try_get_u8()?;
        if tlv_len != TLV_COLLECTOR_LENGTH {
            return Err(DecodeError::InvalidTlvLength {
                expected: TLV_COLLECTOR_LENGTH,
                found: tlv_len,
            });
        }
        let collector_max_delay = buf.try_get_u16()?;

        Ok(Lacpdu {
            actor,
            partner,
            collector_max_delay,
        })
    }

    fn decode_party(
        buf: &mut Bytes,
        expected_tlv: u8,
    ) -> Result<PduParty, DecodeError> {
        let tlv_type = buf.try_get_u8()?;
        if tlv_type != expected_tlv {
            return Err(DecodeError::InvalidTlvType {
                expected: expected_tlv,
                found: tlv_type,
            });
        }
        let tlv_len = buf.try_get_u8()?;
        if tlv_len != TLV_INFO_LENGTH {
            return Err(DecodeError::InvalidTlvLength {
                expected: TLV_INFO_LENGTH,
                found: tlv_len,
            });
        }
        let priority = buf.try_get_u16()?;
        let mac = buf.try_get_mac()?;
        let key = buf.try_get_u16()?;
        let port_priority = buf.try_get_u16()?;
        let port = buf.try_get_u16()?;
        let state = StateFlags::from_bits_truncate(buf.try_get_u8()?);

        Ok(PduParty {
            system: SystemId { priority, mac },
            key,
            port_priority,
            port,
            state,
        })
    }
}

// ===== impl MarkerPdu =====

impl MarkerPdu {
    pub fn encode(&self) -> BytesMut {
        TLS_BUF.with(|buf| {
            let mut buf = buf.borrow_mut();
            buf.clear();

            buf.put_u8(SUBTYPE_MARKER);
            buf.put_u8(MARKER_VERSION);
            buf.put_u8(TLV_TYPE_MARKER);
            buf.put_u8(TLV_MARKER_LENGTH);
            buf.put_u16(self.requester_port);
            buf.put_mac(&self.requester_system);
            buf.put_u32(self.requester_transaction_id);
            buf.put_u16(0); // pad
            buf.put_u8(TLV_TYPE_TERMINATOR);
            buf.put_u8(0);
            buf.put_bytes(0, 90);

            debug_assert_eq!(buf.len(), PDU_LEN);
            buf.clone()
        })
    }

    pub fn decode(data: &[u8]) -> Result<MarkerPdu, DecodeError> {
        if data.len() < PDU_LEN {
            return Err(DecodeError::IncompletePacket);
        }
        let mut buf = Bytes::copy_from_slice(&data[0..PDU_LEN]);

        let subtype = buf.try_get_u8()?;
        if subtype != SUBTYPE_MARKER {
            return Err(DecodeError::UnknownSubtype(subtype));
        }
        let _version = buf.try_get_u8()?;
        let tlv_type = buf.try_get_u8()?;
        if tlv_type != TLV_TYPE_MARKER {
            return Err(DecodeError::InvalidTlvType {
                expected: TLV_TYPE_MARKER,
                found: tlv_type,
            });
        }
        let tlv_len = buf.try_get_u8()?;
        if tlv_len != TLV_MARKER_LENGTH {
            return Err(DecodeError::InvalidTlvLength {
                expected: TLV_MARKER_LENGTH,
                found: tlv_len,
            });
        }
        let requester_port = buf.try_get_u16()?;
        let requester_system = buf.try_get_mac()?;
        let requester_transaction_id = buf.try_get_u32()?;

        Ok(MarkerPdu {
            requester_port,
            requester_system,
            requester_transaction_id,
        })
    }

    /// Builds the Marker Response for this request: same requester fields,
    /// echoed verbatim (§4.5 "the engine echoes the payload as a Marker
    /// Response"). Only the responder role is implemented; there is no
    /// marker-initiation path (Non-goals, §9).
    pub fn into_response(self) -> MarkerPdu {
        self
    }
}

// ===== impl Subtype =====

pub fn peek_subtype(data: &[u8]) -> Option<Subtype> {
    data.first().copied().and_then(Subtype::from_u8)
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::IncompletePacket => write!(f, "incomplete packet"),
            DecodeError::UnknownSubtype(subtype) => {
                write!(f, "unknown slow-protocol subtype: {subtype}")
            }
            DecodeError::InvalidVersion(version) => {
                write!(f, "invalid LACP version: {version}")
            }
            DecodeError::InvalidTlvType { expected, found } => {
                write!(f, "invalid TLV type: expected {expected}, found {found}")
            }
            DecodeError::InvalidTlvLength { expected, found } => {
                write!(
                    f,
                    "invalid TLV length: expected {expected}, found {found}"
                )
            }
            DecodeError::ReadOutOfBounds => {
                write!(f, "attempt to read out of bounds")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<TryGetError> for DecodeError {
    fn from(_error: TryGetError) -> DecodeError {
        DecodeError::ReadOutOfBounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_party(port: u16) -> PduParty {
        PduParty {
            system: SystemId {
                priority: 32768,
                mac: MacAddr::from([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
            },
            key: 7,
            port_priority: 32768,
            port,
            state: StateFlags::ACTIVITY
                | StateFlags::AGGREGATION
                | StateFlags::SYNCHRONIZATION,
        }
    }

    #[test]
    fn lacpdu_round_trip() {
        let pdu = Lacpdu {
            actor: sample_party(1),
            partner: sample_party(101),
            collector_max_delay: 0,
        };
        let encoded = pdu.encode();
        assert_eq!(encoded.len(), PDU_LEN);
        let decoded = Lacpdu::decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn lacpdu_round_trip_all_state_bits() {
        for bits in 0u8..=255 {
            let mut party = sample_party(1);
            party.state = StateFlags::from_bits_truncate(bits);
            let pdu = Lacpdu {
                actor: party.clone(),
                partner: party,
                collector_max_delay: 0,
            };
            let decoded = Lacpdu::decode(&pdu.encode()).unwrap();
            assert_eq!(decoded.actor.state.bits(), bits);
        }
    }

    #[test]
    fn lacpdu_rejects_short_buffer() {
        let err = Lacpdu::decode(&[0x01, 0x01]).unwrap_err();
        assert_eq!(err, DecodeError::IncompletePacket);
    }

    #[test]
    fn lacpdu_rejects_wrong_subtype() {
        let mut buf = vec![0u8; PDU_LEN];
        buf[0] = 0x99;
        let err = Lacpdu::decode(&buf).unwrap_err();
        assert_eq!(err, DecodeError::UnknownSubtype(0x99));
    }

    #[test]
    fn marker_round_trip() {
        let marker = MarkerPdu {
            requester_port: 42,
            requester_system: MacAddr::from([1, 2, 3, 4, 5, 6]),
            requester_transaction_id: 0xdead_beef,
        };
        let encoded = marker.encode();
        let decoded = MarkerPdu::decode(&encoded).unwrap();
        assert_eq!(decoded, marker);
    }

    #[test]
    fn marker_response_echoes_request() {
        let marker = MarkerPdu {
            requester_port: 42,
            requester_system: MacAddr::from([1, 2, 3, 4, 5, 6]),
            requester_transaction_id: 7,
        };
        let response = marker.clone().into_response();
        assert_eq!(response, marker);
    }

    #[test]
    fn peek_subtype_distinguishes_lacp_and_marker() {
        let mut lacp_buf = vec![0u8; PDU_LEN];
        lacp_buf[0] = 0x01;
        assert_eq!(peek_subtype(&lacp_buf), Some(Subtype::Lacp));

        let mut marker_buf = vec![0u8; PDU_LEN];
        marker_buf[0] = 0x02;
        assert_eq!(peek_subtype(&marker_buf), Some(Subtype::Marker));
    }
}
