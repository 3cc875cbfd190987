//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

// Event handlers for the §4.7 "Event Dispatch" queue: PDU ingress, the 1 Hz
// timer wheel, link/config changes, and the two transmit paths (synchronous
// entry-action transmit, budget-limited async transmit) that every FSM
// action routine funnels through.

use lacp_utils::mac_addr::MacAddr;

use crate::fsm::{mux, periodic, receive};
use crate::master::Master;
use crate::packet::{self, Lacpdu, MarkerPdu, PduParty, StateFlags};
use crate::port::PortIndex;
use crate::selection;
use crate::tasks::messages::input::{
    ConfigChangeMsg, LinkDownMsg, LinkUpMsg, PortOverrideMsg, ProtocolMsg,
};
use crate::types::{LacpActivity, LacpTimeout, MAX_ASYNC_TX_PER_TICK, PortHandle};

/// The event queue's single consumer entry point (§4.7): routes a tagged
/// message to its handler. Called once per dequeued message so the protocol
/// task processes events to completion one at a time.
pub fn dispatch(master: &mut Master, msg: ProtocolMsg) {
    match msg {
        ProtocolMsg::RxFrame(msg) => process_rx_pdu(master, msg.port, &msg.bytes),
        ProtocolMsg::Tick => process_tick(master),
        ProtocolMsg::ConfigChange(msg) => process_config_change(master, msg),
        ProtocolMsg::ConfigRemove(port) => process_config_remove(master, port),
        ProtocolMsg::LinkUp(msg) => process_link_up(master, msg),
        ProtocolMsg::LinkDown(msg) => process_link_down(master, msg),
        ProtocolMsg::PortOverride(msg) => process_port_override(master, msg),
        ProtocolMsg::SystemIdChange(mac) => process_system_id_change(master, mac),
        ProtocolMsg::SystemPriorityChange(priority) => {
            process_system_priority_change(master, priority)
        }
    }
}

/// Builds and sends a LACPDU reflecting the port's current actor/partner
/// operational state, §5 "PDU transmission requested from an action routine
/// is synchronous with respect to state changes". Clears NTT unconditionally,
/// even if the send itself failed, mirroring §7 "Transport failure: log,
/// continue" — there is no retry path other than the next periodic/NTT cycle.
pub fn transmit(master: &mut Master, index: PortIndex) {
    let Some(port) = master.ports.get_mut(index) else {
        return;
    };
    port.control.ntt = false;
    let port_handle = port.handle;

    let pdu = Lacpdu {
        actor: PduParty {
            system: port.actor.system,
            key: port.actor.key,
            port_priority: port.actor.port_priority,
            port: port.actor.port_number,
            state: port.actor.state,
        },
        partner: PduParty {
            system: port.partner.system,
            key: port.partner.key,
            port_priority: port.partner.port_priority,
            port: port.partner.port_number,
            state: port.partner.state,
        },
        collector_max_delay: 0,
    };
    let frame = pdu.encode();

    match master.transport.send(port_handle, &frame) {
        Ok(()) => {
            master.ports.get_mut(index).unwrap().statistics.lacp_pdus_sent += 1;
            crate::debug::Debug::PduSent(port_handle).log();
        }
        Err(error) => {
            crate::error::Error::IoError(port_handle, error).log();
        }
    }
}

/// Transmits subject to the §4.2 "Async-tx budget": at most
/// `MAX_ASYNC_TX_PER_TICK` unsolicited sends per port per 1-second window.
/// Over budget, NTT is left set so the next tick's periodic maintenance
/// (or a future async request) retries.
pub fn async_transmit(master: &mut Master, index: PortIndex) {
    let Some(port) = master.ports.get_mut(index) else {
        return;
    };
    if port.async_tx_budget >= MAX_ASYNC_TX_PER_TICK {
        return;
    }
    port.async_tx_budget += 1;
    transmit(master, index);
}

/// Handles an `RxPdu` event (§4.7): decodes, applies the §4.5 ingress
/// filter, and routes LACPDUs to the Receive FSM and Markers to the
/// responder path. Malformed or filtered frames are dropped silently
/// (§7 "Malformed PDU: drop silently, no state change").
pub fn process_rx_pdu(master: &mut Master, port_handle: PortHandle, bytes: &[u8]) {
    let Some((index, _)) = master.ports.get_by_handle(port_handle) else {
        crate::error::Error::PortNotFound(port_handle).log();
        return;
    };

    match packet::peek_subtype(bytes) {
        Some(packet::Subtype::Lacp) => process_rx_lacpdu(master, index, port_handle, bytes),
        Some(packet::Subtype::Marker) => process_rx_marker(master, index, port_handle, bytes),
        None => {}
    }
}

fn process_rx_lacpdu(master: &mut Master, index: PortIndex, port_handle: PortHandle, bytes: &[u8]) {
    let pdu = match Lacpdu::decode(bytes) {
        Ok(pdu) => pdu,
        Err(error) => {
            crate::error::Error::PduDecodeError(port_handle, error).log();
            return;
        }
    };

    let local_system = master.ports.get(index).unwrap().actor.system;
    if pdu.actor.system == local_system {
        master.ports.get_mut(index).unwrap().statistics.illegal_pdus_received += 1;
        crate::debug::Debug::PduDiscardedLoopback(port_handle).log();
        return;
    }
    if pdu.actor.port == 0 {
        master.ports.get_mut(index).unwrap().statistics.illegal_pdus_received += 1;
        crate::debug::Debug::PduDiscardedInvalidActorPort(port_handle).log();
        return;
    }

    master.ports.get_mut(index).unwrap().statistics.lacp_pdus_received += 1;
    crate::debug::Debug::PduReceived(port_handle).log();
    receive::on_pdu(master, index, &pdu);
}

fn process_rx_marker(master: &mut Master, index: PortIndex, port_handle: PortHandle, bytes: &[u8]) {
    let marker = match MarkerPdu::decode(bytes) {
        Ok(marker) => marker,
        Err(error) => {
            crate::error::Error::PduDecodeError(port_handle, error).log();
            return;
        }
    };

    master.ports.get_mut(index).unwrap().statistics.marker_pdus_received += 1;
    let response = marker.into_response();
    let frame = response.encode();
    match master.transport.send(port_handle, &frame) {
        Ok(()) => {
            master.ports.get_mut(index).unwrap().statistics.marker_responses_sent += 1;
        }
        Err(error) => {
            crate::error::Error::IoError(port_handle, error).log();
        }
    }
}

/// Runs the §4.6 1 Hz timer wheel across every registered port.
pub fn process_tick(master: &mut Master) {
    let indices: Vec<PortIndex> = master.ports.iter().map(|(index, _)| index).collect();
    for index in indices {
        periodic::tick(master, index);
        mux::tick(master, index);
        current_while_tick(master, index);
    }
}

fn current_while_tick(master: &mut Master, index: PortIndex) {
    let Some(port) = master.ports.get_mut(index) else {
        return;
    };
    if port.timers.current_while == 0 {
        return;
    }
    port.timers.current_while -= 1;
    if port.timers.current_while == 0 {
        receive::dispatch(master, index, receive::Event::CurrentWhileExpired);
    }
}

pub fn process_link_up(master: &mut Master, msg: LinkUpMsg) {
    let Some((index, port)) = master.ports.get_mut_by_handle(msg.port) else {
        crate::error::Error::PortNotFound(msg.port).log();
        return;
    };
    port.link_enabled = true;
    port.control.port_enabled = true;
    receive::dispatch(master, index, receive::Event::PortEnabled);
}

pub fn process_link_down(master: &mut Master, msg: LinkDownMsg) {
    let Some((index, port)) = master.ports.get_mut_by_handle(msg.port) else {
        crate::error::Error::PortNotFound(msg.port).log();
        return;
    };
    port.link_enabled = false;
    port.control.port_enabled = false;
    receive::dispatch(master, index, receive::Event::PortDisabled);
}

/// Applies a full admin-config replacement, creating the port if it is not
/// yet registered (§6 configuration-store contract, read side).
pub fn process_config_change(master: &mut Master, msg: ConfigChangeMsg) {
    let index = match master.ports.get_by_handle(msg.port) {
        Some((index, _)) => index,
        None => {
            let index = master.ports.insert(msg.port, msg.config.clone(), msg.port_type);
            master.port_begin(index);
            crate::debug::Debug::PortCreate(msg.port).log();
            index
        }
    };

    let was_off = master.ports.get(index).unwrap().config.mode == crate::types::LacpMode::Off;
    let now_off = msg.config.mode == crate::types::LacpMode::Off;
    let fallback_changed =
        master.ports.get(index).unwrap().fallback_enabled != msg.config.fallback_enabled;

    {
        let port = master.ports.get_mut(index).unwrap();
        port.fallback_enabled = msg.config.fallback_enabled;
        port.actor.key = msg.config.key;
        port.actor.port_number = msg.config.port_number;
        port.actor.port_priority = msg.config.port_priority;
        port.actor.state.set(
            StateFlags::ACTIVITY,
            msg.config.activity == LacpActivity::Active,
        );
        port.actor.state.set(
            StateFlags::TIMEOUT,
            msg.config.timeout == LacpTimeout::Short,
        );
        port.actor
            .state
            .set(StateFlags::AGGREGATION, msg.config.aggregatable);
        port.config = msg.config;
    }

    if now_off && !was_off {
        receive::dispatch(master, index, receive::Event::LacpDisabled);
    } else if was_off && !now_off {
        let port_enabled = master.ports.get(index).unwrap().control.port_enabled;
        let event = if port_enabled {
            receive::Event::PortEnabled
        } else {
            receive::Event::PortDisabled
        };
        receive::dispatch(master, index, event);
    }

    if fallback_changed
        && master.ports.get(index).unwrap().receive_state == receive::ReceiveState::Defaulted
    {
        receive::dispatch(master, index, receive::Event::FallbackChanged);
    }

    selection::run(master, index);
    let active_now = master.ports.get(index).unwrap().is_active_or_partner_active();
    if active_now {
        periodic::dispatch(master, index, periodic::Event::PartnerActive);
    }
}

/// Tears a port down on deconfiguration: removes it from its LAG (freeing
/// the LAG and clearing its aggregator if it was the last member, §5
/// "Memory discipline") and drops the port's own registry entry.
pub fn process_config_remove(master: &mut Master, port: PortHandle) {
    let Some((index, _)) = master.ports.get_by_handle(port) else {
        crate::error::Error::PortNotFound(port).log();
        return;
    };
    if let Some(lag_index) = master.ports.get(index).unwrap().lag {
        selection::remove_from_lag(master, index, lag_index);
    }
    master.ports.delete(index);
    crate::debug::Debug::PortDelete(port).log();
}

/// Applies a narrower per-port identity override (§6 `lacp_system_id`,
/// `lacp_system_priority`).
pub fn process_port_override(master: &mut Master, msg: PortOverrideMsg) {
    let Some((index, port)) = master.ports.get_mut_by_handle(msg.port) else {
        crate::error::Error::PortNotFound(msg.port).log();
        return;
    };
    port.config.system_id_override = msg.system_id_override;
    port.config.system_priority_override = msg.system_priority_override;
    apply_effective_system(master, index);
    selection::run(master, index);
}

pub fn process_system_id_change(master: &mut Master, mac: MacAddr) {
    master.system.id.mac = mac;
    refresh_all_ports_system(master);
}

pub fn process_system_priority_change(master: &mut Master, priority: u16) {
    master.system.id.priority = priority;
    refresh_all_ports_system(master);
}

fn refresh_all_ports_system(master: &mut Master) {
    let indices: Vec<PortIndex> = master.ports.iter().map(|(index, _)| index).collect();
    for index in indices {
        apply_effective_system(master, index);
        selection::run(master, index);
    }
}

/// Recomputes a port's effective actor `SystemId` from the global system
/// identity plus any per-port override (§6 "per-port overrides
/// `lacp_system_id`, `lacp_system_priority`").
fn apply_effective_system(master: &mut Master, index: PortIndex) {
    let global = master.system.id;
    let port = master.ports.get_mut(index).unwrap();
    let mut system = port.config.system_id_override.unwrap_or(global);
    if let Some(priority) = port.config.system_priority_override {
        system.priority = priority;
    }
    port.actor.system = system;
}
