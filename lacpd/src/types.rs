//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

use lacp_utils::mac_addr::MacAddr;
use serde::{Deserialize, Serialize};

// A LACP system identifier: (System Priority, System MAC), per IEEE 802.1AX
// clause 6.3.2. Compared lexicographically in that order when deciding
// aggregator match precedence.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct SystemId {
    pub priority: u16,
    pub mac: MacAddr,
}

impl std::fmt::Display for SystemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.priority, self.mac)
    }
}

// Port speed class, used to keep a LAG's members speed-homogeneous (§3
// "Port type (speed class)").
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum PortType {
    Speed10M,
    Speed100M,
    Speed1G,
    Speed10G,
    Speed25G,
    Speed40G,
    Speed100G,
    Speed400G,
}

impl PortType {
    /// Classifies a link speed (bits per second) into a port type, per the
    /// configuration-store contract's `Interface.link_speed` (§6).
    pub fn from_speed_bps(speed_bps: u64) -> PortType {
        match speed_bps {
            s if s <= 10_000_000 => PortType::Speed10M,
            s if s <= 100_000_000 => PortType::Speed100M,
            s if s <= 1_000_000_000 => PortType::Speed1G,
            s if s <= 10_000_000_000 => PortType::Speed10G,
            s if s <= 25_000_000_000 => PortType::Speed25G,
            s if s <= 40_000_000_000 => PortType::Speed40G,
            s if s <= 100_000_000_000 => PortType::Speed100G,
            _ => PortType::Speed400G,
        }
    }
}

// Opaque handle for a logical port, encoding a port index and port type as
// described in §3 ("Identity: a 64-bit handle encoding port index and port
// type"). The upper 16 bits carry a type discriminant so the same index space
// can host physical and (future) sub-interface ports without collision.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct PortHandle(u64);

impl PortHandle {
    pub fn new(port_index: u32, kind: u16) -> PortHandle {
        PortHandle(((kind as u64) << 48) | port_index as u64)
    }

    pub fn port_index(&self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }
}

impl std::fmt::Display for PortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

// Opaque handle for a data-plane aggregator (SuperPort), allocated by the
// external data-plane programmer (§3 "SuperPort (Aggregator)", §6).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct AggregatorHandle(pub u32);

impl AggregatorHandle {
    pub const NONE: AggregatorHandle = AggregatorHandle(0);

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl std::fmt::Display for AggregatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// One side (actor or partner) of a LAG_Id, per §3/§4.4: the five-tuple that
// must match byte-for-byte (minus fallback, which is carried alongside) for
// two ports to be groupable.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LagIdSide {
    pub system_priority: u16,
    pub system_mac: MacAddr,
    pub key: u16,
    pub port_priority: u16,
    pub port_number: u16,
}

// A LAG's identity: the tuple of (local side, remote side, fallback flag)
// that uniquely keys a LAG within a port type (§3, §4.4).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LagId {
    pub local: LagIdSide,
    pub remote: LagIdSide,
    pub fallback: bool,
}

// Per-port selection status (§3 Control variables, GLOSSARY).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Selected {
    #[default]
    Unselected,
    Selected,
    Standby,
}

// LACP Activity/Timeout mode, carried both as admin config and as actor/
// partner operational state (§3).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LacpActivity {
    #[default]
    Passive,
    Active,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LacpTimeout {
    #[default]
    Long,
    Short,
}

// LACP operating mode, per the configuration-store contract's `lacp_mode`
// (§6).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LacpMode {
    Off,
    Active,
    Passive,
}

// Timer constants, §4.6.
pub const SHORT_TIMEOUT: u32 = 3;
pub const LONG_TIMEOUT: u32 = 90;
pub const FAST_PERIODIC: u32 = 1;
pub const SLOW_PERIODIC: u32 = 30;
pub const WAIT_WHILE: u32 = 2;
/// Async-tx budget, §4.2.
pub const MAX_ASYNC_TX_PER_TICK: u32 = 3;
