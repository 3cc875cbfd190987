//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

use crate::debug::Debug;
use crate::fsm::{mux, periodic};
use crate::master::Master;
use crate::packet::{Lacpdu, StateFlags};
use crate::port::{PartyParams, PortIndex};
use crate::selection;
use crate::types::{LacpActivity, LacpTimeout, Selected, LONG_TIMEOUT, SHORT_TIMEOUT};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum ReceiveState {
    Initialize,
    PortDisabled,
    LacpDisabled,
    Expired,
    Defaulted,
    Current,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    Begin,
    PduReceived(#[allow(dead_code)] ()),
    CurrentWhileExpired,
    PortMoved,
    PortDisabled,
    Uct,
    PortEnabled,
    LacpDisabled,
    /// Fallback flag changed (E9): re-runs the `Defaulted` entry action so a
    /// toggle takes effect immediately, without waiting for a timer.
    FallbackChanged,
}

/// Dispatches an event to the Receive FSM of the port at `index`, running
/// the entry action of whatever state is reached. Mirrors the
/// `[state][event] -> (next_state, action)` table of §4.1.
pub fn dispatch(master: &mut Master, index: PortIndex, event: Event) {
    receive_pdu(master, index, None, event)
}

/// Internal entry point shared with [`on_pdu`], since an incoming LACPDU
/// both triggers the `Current` transition and supplies the data that
/// `recordPDU` consumes.
fn receive_pdu(
    master: &mut Master,
    index: PortIndex,
    pdu: Option<&Lacpdu>,
    event: Event,
) {
    let Some(port) = master.ports.get(index) else {
        return;
    };
    let current = port.receive_state;
    let port_handle = port.handle;

    let next = match (current, event) {
        (_, Event::Begin) => ReceiveState::Initialize,
        (ReceiveState::Initialize, Event::Uct) => ReceiveState::PortDisabled,
        (ReceiveState::PortDisabled, Event::PortMoved) => ReceiveState::Initialize,
        (ReceiveState::PortDisabled, Event::PortEnabled) => ReceiveState::Expired,
        (ReceiveState::PortDisabled, Event::LacpDisabled) => ReceiveState::LacpDisabled,
        (ReceiveState::LacpDisabled, Event::PortDisabled) => ReceiveState::PortDisabled,
        (ReceiveState::LacpDisabled, Event::PortEnabled) => ReceiveState::PortDisabled,
        (ReceiveState::Expired, Event::PduReceived(())) => ReceiveState::Current,
        (ReceiveState::Expired, Event::CurrentWhileExpired) => ReceiveState::Defaulted,
        (ReceiveState::Expired, Event::PortDisabled) => ReceiveState::PortDisabled,
        (ReceiveState::Expired, Event::LacpDisabled) => ReceiveState::LacpDisabled,
        (ReceiveState::Defaulted, Event::PduReceived(())) => ReceiveState::Current,
        (ReceiveState::Defaulted, Event::PortDisabled) => ReceiveState::PortDisabled,
        (ReceiveState::Defaulted, Event::LacpDisabled) => ReceiveState::LacpDisabled,
        (ReceiveState::Defaulted, Event::PortMoved) => ReceiveState::Defaulted,
        (ReceiveState::Defaulted, Event::FallbackChanged) => ReceiveState::Defaulted,
        (ReceiveState::Current, Event::PduReceived(())) => ReceiveState::Current,
        (ReceiveState::Current, Event::CurrentWhileExpired) => ReceiveState::Expired,
        (ReceiveState::Current, Event::PortDisabled) => ReceiveState::PortDisabled,
        (ReceiveState::Current, Event::LacpDisabled) => ReceiveState::LacpDisabled,
        // No transition defined for this (state, event) pair; ignore.
        _ => return,
    };

    let old = current;
    master.ports.get_mut(index).unwrap().receive_state = next;
    Debug::ReceiveFsmTransition(port_handle, old, next).log();
    enter(master, index, next, pdu);
}

fn enter(master: &mut Master, index: PortIndex, state: ReceiveState, pdu: Option<&Lacpdu>) {
    match state {
        ReceiveState::Initialize => {
            {
                let port = master.ports.get_mut(index).unwrap();
                port.control.begin = false;
                port.control.selected = Selected::Unselected;
            }
            record_default_and_notify(master, index);
            {
                let port = master.ports.get_mut(index).unwrap();
                port.partner.state.remove(StateFlags::EXPIRED);
                port.control.port_moved = false;
            }
            mux::dispatch(master, index, mux::Event::Unselected);
            receive_pdu(master, index, None, Event::Uct);
        }
        ReceiveState::PortDisabled => {
            let port = master.ports.get_mut(index).unwrap();
            port.partner.state.remove(StateFlags::SYNCHRONIZATION);
            mux::dispatch(master, index, mux::Event::PartnerSyncFalse);
            selection::run(master, index);

            let port = master.ports.get(index).unwrap();
            if port.control.port_moved {
                receive_pdu(master, index, None, Event::PortMoved);
            } else if port.control.port_enabled {
                receive_pdu(master, index, None, Event::PortEnabled);
            }
        }
        ReceiveState::LacpDisabled => {
            master.ports.get_mut(index).unwrap().control.selected = Selected::Unselected;
            mux::dispatch(master, index, mux::Event::Unselected);
            record_default_and_notify(master, index);
            let port = master.ports.get_mut(index).unwrap();
            port.partner.state.remove(StateFlags::AGGREGATION);
            port.partner.state.remove(StateFlags::EXPIRED);
        }
        ReceiveState::Expired => {
            let port = master.ports.get_mut(index).unwrap();
            port.partner.state.remove(StateFlags::SYNCHRONIZATION);
            port.partner_admin.timeout = LacpTimeout::Short;
            port.timers.current_while = SHORT_TIMEOUT;
            port.actor.state.insert(StateFlags::EXPIRED);
            port.actor.state.remove(StateFlags::DEFAULTED);
            periodic::dispatch(master, index, periodic::Event::PartnerTimeoutShort);
        }
        ReceiveState::Defaulted => {
            update_default_selected(master, index);
            record_default_and_notify(master, index);

            let port = master.ports.get_mut(index).unwrap();
            let fallback = port.fallback_enabled;
            if fallback {
                port.partner.state.insert(
                    StateFlags::SYNCHRONIZATION
                        | StateFlags::COLLECTING
                        | StateFlags::DISTRIBUTING,
                );
                port.partner
                    .state
                    .remove(StateFlags::DEFAULTED | StateFlags::EXPIRED);
            } else {
                port.partner.state.remove(
                    StateFlags::SYNCHRONIZATION
                        | StateFlags::COLLECTING
                        | StateFlags::DISTRIBUTING,
                );
                port.partner
                    .state
                    .insert(StateFlags::DEFAULTED | StateFlags::EXPIRED);
            }

            selection::run(master, index);

            let port = master.ports.get(index).unwrap();
            if port.control.selected == Selected::Selected
                && port.partner.state.contains(StateFlags::SYNCHRONIZATION)
            {
                mux::dispatch(master, index, mux::Event::SelectedAndSync);
            } else {
                master.ports.get_mut(index).unwrap().control.selected = Selected::Unselected;
            }
        }
        ReceiveState::Current => {
            let Some(pdu) = pdu else {
                // Re-entered without a fresh PDU (e.g. a self-loop triggered
                // by something other than reception); nothing to record.
                return;
            };
            update_selected(master, index, pdu);
            choose_matched(master, index, pdu);
            update_ntt(master, index, pdu);
            record_pdu(master, index, pdu);
            selection::run(master, index);

            let port = master.ports.get_mut(index).unwrap();
            let interval = if port.actor.state.contains(StateFlags::TIMEOUT) {
                SHORT_TIMEOUT
            } else {
                LONG_TIMEOUT
            };
            port.timers.current_while = interval;
            port.actor.state.remove(StateFlags::EXPIRED);
        }
    }
}

/// Called by the network-input handler (§4.7 `RxPdu`) once a decoded,
/// ingress-filtered LACPDU is ready for the Receive FSM.
pub fn on_pdu(master: &mut Master, index: PortIndex, pdu: &Lacpdu) {
    receive_pdu(master, index, Some(pdu), Event::PduReceived(()));
}

/// §4.1 `recordDefault`. Pure mutation; callers with a `&mut Master` handle
/// the "both sides Passive posts Periodic-Tx E1" follow-up separately since
/// that requires dispatching into another FSM.
fn record_default(port: &mut crate::port::LogicalPort) {
    let admin = &port.partner_admin;
    let mut state = port.partner.state;
    state.set(StateFlags::ACTIVITY, admin.activity == LacpActivity::Active);
    state.set(StateFlags::TIMEOUT, admin.timeout == LacpTimeout::Short);
    state.set(StateFlags::AGGREGATION, admin.aggregatable);
    port.partner = PartyParams {
        system: admin.system,
        port_priority: admin.port_priority,
        port_number: admin.port_number,
        key: admin.key,
        state,
    };
    port.actor.state.insert(StateFlags::DEFAULTED);
}

fn record_default_and_notify(master: &mut Master, index: PortIndex) {
    let port = master.ports.get_mut(index).unwrap();
    record_default(port);
    if port.both_passive() {
        periodic::dispatch(master, index, periodic::Event::Begin);
    }
}

/// §4.1 `update_Default_Selected`: identical mismatch check to
/// `update_Selected`, but against the administrative partner defaults
/// rather than a received PDU.
fn update_default_selected(master: &mut Master, index: PortIndex) {
    let port = master.ports.get_mut(index).unwrap();
    let admin = port.partner_admin;
    let mismatch = port.partner.port_number != admin.port_number
        || port.partner.port_priority != admin.port_priority
        || port.partner.system != admin.system
        || port.partner.key != admin.key
        || port.partner.state.contains(StateFlags::AGGREGATION)
            != admin.aggregatable;
    if mismatch {
        port.control.selected = Selected::Unselected;
        drop(port);
        mux::dispatch(master, index, mux::Event::Unselected);
    }
}

fn update_selected(master: &mut Master, index: PortIndex, pdu: &Lacpdu) {
    let port = master.ports.get_mut(index).unwrap();
    let mismatch = pdu.partner.port != port.partner.port_number
        || pdu.partner.port_priority != port.partner.port_priority
        || pdu.partner.system.mac != port.partner.system.mac
        || pdu.partner.system.priority != port.partner.system.priority
        || pdu.partner.key != port.partner.key
        || pdu.partner.state.contains(StateFlags::AGGREGATION)
            != port.partner.state.contains(StateFlags::AGGREGATION);
    if mismatch {
        port.control.selected = Selected::Unselected;
        mux::dispatch(master, index, mux::Event::Unselected);
    }
}

fn choose_matched(master: &mut Master, index: PortIndex, pdu: &Lacpdu) {
    let port = master.ports.get_mut(index).unwrap();
    let partner_view_matches = pdu.partner.system == port.actor.system
        && pdu.partner.key == port.actor.key
        && pdu.partner.port_priority == port.actor.port_priority
        && pdu.partner.port == port.actor.port_number
        && pdu.partner.state.contains(StateFlags::AGGREGATION)
            == port.actor.state.contains(StateFlags::AGGREGATION);
    let individual_actor = !pdu.actor.state.contains(StateFlags::AGGREGATION);
    let matched = (partner_view_matches || individual_actor)
        && pdu.actor.state.contains(StateFlags::SYNCHRONIZATION);

    port.partner.state.set(StateFlags::SYNCHRONIZATION, matched);
}

fn update_ntt(master: &mut Master, index: PortIndex, pdu: &Lacpdu) {
    let port = master.ports.get_mut(index).unwrap();
    let partner_view = &pdu.partner;
    let mismatch = partner_view.port != port.actor.port_number
        || partner_view.port_priority != port.actor.port_priority
        || partner_view.system != port.actor.system
        || partner_view.key != port.actor.key
        || partner_view.state.contains(StateFlags::ACTIVITY)
            != port.actor.state.contains(StateFlags::ACTIVITY)
        || partner_view.state.contains(StateFlags::TIMEOUT)
            != port.actor.state.contains(StateFlags::TIMEOUT)
        || partner_view.state.contains(StateFlags::SYNCHRONIZATION)
            != port.actor.state.contains(StateFlags::SYNCHRONIZATION)
        || partner_view.state.contains(StateFlags::AGGREGATION)
            != port.actor.state.contains(StateFlags::AGGREGATION);
    if mismatch {
        port.control.ntt = true;
        crate::events::async_transmit(master, index);
    }
}

fn record_pdu(master: &mut Master, index: PortIndex, pdu: &Lacpdu) {
    let port = master.ports.get_mut(index).unwrap();
    port.partner.system = pdu.actor.system;
    port.partner.port_priority = pdu.actor.port_priority;
    port.partner.port_number = pdu.actor.port;
    port.partner.key = pdu.actor.key;
    port.partner.state = pdu.actor.state;
    port.actor.state.remove(StateFlags::DEFAULTED);

    if port.is_active_or_partner_active() {
        periodic::dispatch(master, index, periodic::Event::PartnerActive);
    }
    let periodic_event = if port.partner.state.contains(StateFlags::TIMEOUT) {
        periodic::Event::PartnerTimeoutShort
    } else {
        periodic::Event::PartnerTimeoutLong
    };
    periodic::dispatch(master, index, periodic_event);

    generate_mux_event_from_record_pdu(master, index);

    let port = master.ports.get_mut(index).unwrap();
    if !port.partner.state.contains(StateFlags::AGGREGATION) {
        port.control.selected = Selected::Unselected;
        mux::dispatch(master, index, mux::Event::Unselected);
    }
}

fn generate_mux_event_from_record_pdu(master: &mut Master, index: PortIndex) {
    let port = master.ports.get(index).unwrap();
    let selected = port.control.selected == Selected::Selected;
    let sync = port.partner.state.contains(StateFlags::SYNCHRONIZATION);
    let actor_collecting = port.actor.state.contains(StateFlags::COLLECTING);
    let partner_collecting = port.partner.state.contains(StateFlags::COLLECTING);
    let mux = port.mux_state;

    if !sync {
        mux::dispatch(master, index, mux::Event::PartnerSyncFalse);
    } else if selected && mux == crate::fsm::MuxState::Attached {
        mux::dispatch(master, index, mux::Event::SelectedAndSync);
    } else if selected
        && actor_collecting
        && partner_collecting
        && mux == crate::fsm::MuxState::Collecting
    {
        mux::dispatch(master, index, mux::Event::PartnerCollecting);
    } else if !partner_collecting && mux == crate::fsm::MuxState::CollectingDistributing {
        mux::dispatch(master, index, mux::Event::PartnerNotCollecting);
    }
}
