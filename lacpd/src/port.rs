//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;

use generational_arena::{Arena, Index};
use serde::{Deserialize, Serialize};

use crate::fsm::mux::MuxState;
use crate::fsm::periodic::PeriodicState;
use crate::fsm::receive::ReceiveState;
use crate::packet::StateFlags;
use crate::types::{
    AggregatorHandle, LacpActivity, LacpMode, LacpTimeout, LagId, PortHandle,
    PortType, Selected, SystemId,
};

pub type PortIndex = Index;

// A LACP party's admin/operational view: actor when describing the local
// side, partner when describing the most recent view learned from the peer
// (§3 "Actor admin/operational parameters").
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PartyParams {
    pub system: SystemId,
    pub port_priority: u16,
    pub port_number: u16,
    pub key: u16,
    pub state: StateFlags,
}

impl PartyParams {
    pub fn timeout(&self) -> LacpTimeout {
        if self.state.contains(StateFlags::TIMEOUT) {
            LacpTimeout::Short
        } else {
            LacpTimeout::Long
        }
    }
}

// Administratively configured values, kept separate from the operational
// view so `recordDefault` can restore them verbatim (§4.1 "recordDefault").
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PartnerAdmin {
    pub system: SystemId,
    pub port_priority: u16,
    pub port_number: u16,
    pub key: u16,
    pub activity: LacpActivity,
    pub timeout: LacpTimeout,
    pub aggregatable: bool,
}

// Per-port configuration, sourced from the configuration-store contract's
// port/interface sections (§6).
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct PortConfig {
    pub mode: LacpMode,
    pub activity: LacpActivity,
    pub timeout: LacpTimeout,
    pub key: u16,
    pub port_number: u16,
    pub port_priority: u16,
    pub aggregatable: bool,
    pub fallback_enabled: bool,
    pub system_id_override: Option<SystemId>,
    pub system_priority_override: Option<u16>,
}

impl Default for PortConfig {
    fn default() -> PortConfig {
        PortConfig {
            mode: LacpMode::Off,
            activity: LacpActivity::Active,
            timeout: LacpTimeout::Long,
            key: 0,
            port_number: 0,
            port_priority: 32768,
            aggregatable: true,
            fallback_enabled: false,
            system_id_override: None,
            system_priority_override: None,
        }
    }
}

// Control variables, §3.
#[derive(Clone, Copy, Debug, Default)]
pub struct ControlVariables {
    pub begin: bool,
    pub selected: Selected,
    pub port_moved: bool,
    pub ntt: bool,
    pub port_enabled: bool,
    pub ready_n: bool,
}

// Timer counters, in 1-second ticks (§3, §4.6).
#[derive(Clone, Copy, Debug, Default)]
pub struct Timers {
    pub current_while: u32,
    pub periodic: u32,
    pub wait_while: u32,
}

// Per-port statistics (§3; counters from `original_source/mlacp_main.c` /
// `lacp_support.c` that the distilled spec folds into "Statistics").
#[derive(Clone, Copy, Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct PortStatistics {
    pub lacp_pdus_sent: u64,
    pub lacp_pdus_received: u64,
    pub marker_pdus_received: u64,
    pub marker_responses_sent: u64,
    pub illegal_pdus_received: u64,
}

#[derive(Debug)]
pub struct LogicalPort {
    pub handle: PortHandle,
    pub config: PortConfig,
    pub port_type: PortType,

    pub actor: PartyParams,
    pub partner: PartyParams,
    pub partner_admin: PartnerAdmin,

    pub control: ControlVariables,

    pub receive_state: ReceiveState,
    pub periodic_state: PeriodicState,
    pub mux_state: MuxState,
    pub prev_mux_state: Option<MuxState>,

    pub timers: Timers,
    pub async_tx_budget: u32,

    pub statistics: PortStatistics,

    pub lag: Option<crate::lag::LagIndex>,
    pub aggregator: AggregatorHandle,

    pub fallback_enabled: bool,
    pub loop_back: bool,
    pub link_enabled: bool,
}

#[derive(Debug, Default)]
pub struct Ports {
    arena: Arena<LogicalPort>,
    handle_tree: HashMap<PortHandle, PortIndex>,
}

// ===== impl LogicalPort =====

impl LogicalPort {
    fn new(handle: PortHandle, config: PortConfig, port_type: PortType) -> LogicalPort {
        let fallback_enabled = config.fallback_enabled;
        LogicalPort {
            handle,
            port_type,
            actor: PartyParams {
                port_priority: config.port_priority,
                port_number: config.port_number,
                key: config.key,
                state: Self::initial_actor_state(&config),
                system: config.system_id_override.unwrap_or_default(),
            },
            partner: PartyParams::default(),
            partner_admin: PartnerAdmin::default(),
            config,
            control: ControlVariables {
                begin: true,
                ..Default::default()
            },
            receive_state: ReceiveState::Initialize,
            periodic_state: PeriodicState::NoPeriodic,
            mux_state: MuxState::Detached,
            prev_mux_state: None,
            timers: Timers::default(),
            async_tx_budget: 0,
            statistics: PortStatistics::default(),
            lag: None,
            aggregator: AggregatorHandle::NONE,
            fallback_enabled,
            loop_back: false,
            link_enabled: false,
        }
    }

    fn initial_actor_state(config: &PortConfig) -> StateFlags {
        let mut state = StateFlags::empty();
        if config.activity == LacpActivity::Active {
            state |= StateFlags::ACTIVITY;
        }
        if config.timeout == LacpTimeout::Short {
            state |= StateFlags::TIMEOUT;
        }
        if config.aggregatable {
            state |= StateFlags::AGGREGATION;
        }
        state
    }

    /// The port's effective `LAG_Id` local/remote halves, per §3/§4.4.
    /// Returns `None` while the partner MAC is all-zeros ("no partner yet",
    /// per §4.4 step 1).
    pub fn lag_id(&self) -> Option<LagId> {
        if self.partner.system.mac.is_zero() {
            return None;
        }

        let aggregatable = self.actor.state.contains(StateFlags::AGGREGATION)
            && self.partner.state.contains(StateFlags::AGGREGATION);

        let (local_port_priority, local_port_number, remote_port_priority, remote_port_number) =
            if aggregatable {
                (0, 0, 0, 0)
            } else {
                (
                    self.actor.port_priority,
                    self.actor.port_number,
                    self.partner.port_priority,
                    self.partner.port_number,
                )
            };

        Some(LagId {
            local: crate::types::LagIdSide {
                system_priority: self.actor.system.priority,
                system_mac: self.actor.system.mac,
                key: self.actor.key,
                port_priority: local_port_priority,
                port_number: local_port_number,
            },
            remote: crate::types::LagIdSide {
                system_priority: self.partner.system.priority,
                system_mac: self.partner.system.mac,
                key: self.partner.key,
                port_priority: remote_port_priority,
                port_number: remote_port_number,
            },
            fallback: self.fallback_enabled,
        })
    }

    pub fn is_active_or_partner_active(&self) -> bool {
        self.actor.state.contains(StateFlags::ACTIVITY)
            || self.partner.state.contains(StateFlags::ACTIVITY)
    }

    pub fn both_passive(&self) -> bool {
        !self.actor.state.contains(StateFlags::ACTIVITY)
            && !self.partner.state.contains(StateFlags::ACTIVITY)
    }
}

// ===== impl Ports =====

impl Ports {
    pub fn insert(
        &mut self,
        handle: PortHandle,
        config: PortConfig,
        port_type: PortType,
    ) -> PortIndex {
        let index = self
            .arena
            .insert(LogicalPort::new(handle, config, port_type));
        self.handle_tree.insert(handle, index);
        index
    }

    pub fn delete(&mut self, index: PortIndex) {
        if let Some(port) = self.arena.get(index) {
            self.handle_tree.remove(&port.handle);
        }
        self.arena.remove(index);
    }

    pub fn get(&self, index: PortIndex) -> Option<&LogicalPort> {
        self.arena.get(index)
    }

    pub fn get_mut(&mut self, index: PortIndex) -> Option<&mut LogicalPort> {
        self.arena.get_mut(index)
    }

    pub fn get_by_handle(&self, handle: PortHandle) -> Option<(PortIndex, &LogicalPort)> {
        self.handle_tree
            .get(&handle)
            .and_then(|&index| self.arena.get(index).map(|port| (index, port)))
    }

    pub fn get_mut_by_handle(
        &mut self,
        handle: PortHandle,
    ) -> Option<(PortIndex, &mut LogicalPort)> {
        let index = *self.handle_tree.get(&handle)?;
        self.arena.get_mut(index).map(|port| (index, port))
    }

    pub fn iter(&self) -> impl Iterator<Item = (PortIndex, &LogicalPort)> {
        self.arena.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PortIndex, &mut LogicalPort)> {
        self.arena.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lag_id_deferred_without_partner() {
        let port = LogicalPort::new(
            PortHandle::new(1, 0),
            PortConfig::default(),
            PortType::Speed1G,
        );
        assert!(port.lag_id().is_none());
    }

    #[test]
    fn lag_id_zeroes_port_fields_when_aggregatable() {
        let mut port = LogicalPort::new(
            PortHandle::new(1, 0),
            PortConfig::default(),
            PortType::Speed1G,
        );
        port.partner.system.mac =
            lacp_utils::mac_addr::MacAddr::from([1, 2, 3, 4, 5, 6]);
        port.actor.state |= StateFlags::AGGREGATION;
        port.partner.state |= StateFlags::AGGREGATION;
        let id = port.lag_id().unwrap();
        assert_eq!(id.local.port_number, 0);
        assert_eq!(id.remote.port_number, 0);
    }

    #[test]
    fn ports_registry_round_trip() {
        let mut ports = Ports::default();
        let handle = PortHandle::new(1, 0);
        let index =
            ports.insert(handle, PortConfig::default(), PortType::Speed1G);
        assert!(ports.get(index).is_some());
        assert!(ports.get_by_handle(handle).is_some());
        ports.delete(index);
        assert!(ports.get_by_handle(handle).is_none());
    }
}
