//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

// Write-side shapes and formatting helpers for the configuration-store
// contract (§6): what the core publishes back about a port's and a LAG's
// operational state. The store itself decides how these get surfaced
// (files, a management API, whatever) — this module only builds the values.

use crate::lag::Lag;
use crate::packet::StateFlags;
use crate::port::LogicalPort;
use crate::types::{PortType, SystemId};

/// A LAG's aggregate forwarding status, derived from its members' Mux
/// states (§4.3, §6 "bond_status").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BondStatus {
    /// At least one member is in `CollectingDistributing`.
    Up,
    /// Members exist and are attached but none are distributing yet.
    Blocked,
    /// No members, or none past `Detached`.
    Down,
}

impl std::fmt::Display for BondStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BondStatus::Up => write!(f, "up"),
            BondStatus::Blocked => write!(f, "blocked"),
            BondStatus::Down => write!(f, "down"),
        }
    }
}

/// Per-port operational state (§6 "Interface operational state"): the
/// actor/partner LACPDU fields last exchanged, plus the collecting/
/// distributing bits the data plane is (or isn't) honoring.
#[derive(Clone, Debug)]
pub struct InterfaceState {
    pub hw_bond_rx_enabled: bool,
    pub hw_bond_tx_enabled: bool,
    pub lacp_current: bool,
    pub actor_system_id: String,
    pub actor_port_id: String,
    pub actor_key: u16,
    pub actor_state: String,
    pub partner_system_id: String,
    pub partner_port_id: String,
    pub partner_key: u16,
    pub partner_state: String,
    pub illegal_pdu_count: u64,
    pub marker_pdu_count: u64,
}

/// Per-LAG operational state (§6 "Bond operational state").
#[derive(Clone, Debug)]
pub struct BondState {
    pub bond_speed_bps: u64,
    pub bond_status: BondStatus,
    pub bond_status_reason: String,
}

/// Renders a state octet as the comma-separated `key:0|1` pairs the
/// configuration-store contract expects for `actor_state`/`partner_state`
/// (§6), in the same bit order as the wire encoding (§4.5).
pub fn format_state_flags(state: StateFlags) -> String {
    const FLAGS: &[(&str, StateFlags)] = &[
        ("activity", StateFlags::ACTIVITY),
        ("timeout", StateFlags::TIMEOUT),
        ("aggregation", StateFlags::AGGREGATION),
        ("sync", StateFlags::SYNCHRONIZATION),
        ("collecting", StateFlags::COLLECTING),
        ("distributing", StateFlags::DISTRIBUTING),
        ("defaulted", StateFlags::DEFAULTED),
        ("expired", StateFlags::EXPIRED),
    ];
    FLAGS
        .iter()
        .map(|(name, flag)| format!("{}:{}", name, i32::from(state.contains(*flag))))
        .collect::<Vec<_>>()
        .join(",")
}

/// Renders a `SystemId` as `"<priority>,<mac>"`, per §6.
pub fn format_system_id(id: SystemId) -> String {
    format!("{},{}", id.priority, id.mac)
}

/// Renders a (port priority, port number) pair as `"<priority>,<number>"`,
/// per §6.
pub fn format_port_id(priority: u16, number: u16) -> String {
    format!("{priority},{number}")
}

/// Builds a port's operational-state snapshot for the configuration store.
pub fn interface_state(port: &LogicalPort) -> InterfaceState {
    use crate::fsm::mux::MuxState;

    InterfaceState {
        hw_bond_rx_enabled: port.actor.state.contains(StateFlags::COLLECTING),
        hw_bond_tx_enabled: port.actor.state.contains(StateFlags::DISTRIBUTING),
        lacp_current: matches!(
            port.mux_state,
            MuxState::Collecting | MuxState::CollectingDistributing
        ),
        actor_system_id: format_system_id(port.actor.system),
        actor_port_id: format_port_id(port.actor.port_priority, port.actor.port_number),
        actor_key: port.actor.key,
        actor_state: format_state_flags(port.actor.state),
        partner_system_id: format_system_id(port.partner.system),
        partner_port_id: format_port_id(port.partner.port_priority, port.partner.port_number),
        partner_key: port.partner.key,
        partner_state: format_state_flags(port.partner.state),
        illegal_pdu_count: port.statistics.illegal_pdus_received,
        marker_pdu_count: port.statistics.marker_pdus_received,
    }
}

/// Builds a LAG's operational-state snapshot, given the member ports that
/// make it up (§6 "Bond operational state", §4.3 for the status rule).
pub fn bond_state<'a>(
    lag: &Lag,
    members: impl Iterator<Item = &'a LogicalPort>,
) -> BondState {
    use crate::fsm::mux::MuxState;

    let mut status = BondStatus::Down;
    let mut member_count = 0u64;
    for member in members {
        member_count += 1;
        match member.mux_state {
            MuxState::CollectingDistributing => status = BondStatus::Up,
            MuxState::Collecting | MuxState::Attached | MuxState::Waiting
                if status != BondStatus::Up =>
            {
                status = BondStatus::Blocked;
            }
            _ => {}
        }
    }

    let bond_status_reason = match status {
        BondStatus::Up => "distributing".to_owned(),
        BondStatus::Blocked => "waiting for partner synchronization".to_owned(),
        BondStatus::Down if member_count == 0 => "no members".to_owned(),
        BondStatus::Down => "no member distributing".to_owned(),
    };

    BondState {
        bond_speed_bps: speed_bps(lag.port_type),
        bond_status: status,
        bond_status_reason,
    }
}

fn speed_bps(port_type: PortType) -> u64 {
    match port_type {
        PortType::Speed10M => 10_000_000,
        PortType::Speed100M => 100_000_000,
        PortType::Speed1G => 1_000_000_000,
        PortType::Speed10G => 10_000_000_000,
        PortType::Speed25G => 25_000_000_000,
        PortType::Speed40G => 40_000_000_000,
        PortType::Speed100G => 100_000_000_000,
        PortType::Speed400G => 400_000_000_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_state_flags_in_wire_bit_order() {
        let state = StateFlags::ACTIVITY | StateFlags::SYNCHRONIZATION;
        assert_eq!(
            format_state_flags(state),
            "activity:1,timeout:0,aggregation:0,sync:1,collecting:0,distributing:0,defaulted:0,expired:0"
        );
    }

    #[test]
    fn formats_system_id() {
        let id = SystemId {
            priority: 32768,
            mac: lacp_utils::mac_addr::MacAddr::from([1, 2, 3, 4, 5, 6]),
        };
        assert_eq!(format_system_id(id), format!("32768,{}", id.mac));
    }

    #[test]
    fn formats_port_id() {
        assert_eq!(format_port_id(32768, 7), "32768,7");
    }
}
