//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

// LAG selection, §4.4. Runs whenever a port's actor or partner operational
// parameters change; may create/destroy LAGs and (re)bind a port to a
// data-plane aggregator.

use crate::debug::Debug;
use crate::fsm::mux;
use crate::master::Master;
use crate::port::PortIndex;
use crate::southbound::AggregatorMatch;
use crate::types::Selected;

/// Runs selection for the given port. Steps 2-4 may recurse once (§4.4 step
/// 4 "Recurse selection once for the port"); `recursed` bounds that to a
/// single extra pass.
pub fn run(master: &mut Master, index: PortIndex) {
    run_inner(master, index, false);
}

fn run_inner(master: &mut Master, index: PortIndex, recursed: bool) {
    let Some(port) = master.ports.get(index) else {
        return;
    };

    // Step 1: compute the port's LAG_Id; defer while the partner is unknown.
    let Some(lag_id) = port.lag_id() else {
        return;
    };
    let port_type = port.port_type;
    let port_handle = port.handle;
    let current_lag = port.lag;
    let loop_back = port.loop_back;
    let aggregatable = port.actor.state.contains(crate::packet::StateFlags::AGGREGATION)
        && port.partner.state.contains(crate::packet::StateFlags::AGGREGATION);

    if let Some(lag_index) = current_lag {
        let stale = {
            let lag = master.lags.get(lag_index).unwrap();
            loop_back
                || lag.id != lag_id
                || lag.port_type != port_type
        };

        if stale {
            // Step 4: remove the port from its current LAG.
            remove_from_lag(master, index, lag_index);
            if !recursed {
                run_inner(master, index, true);
            }
            return;
        }
    } else {
        // Steps 2-3: find or create a LAG with this identity.
        if let Some(lag_index) = master.lags.find(port_type, &lag_id) {
            let joinable = {
                let lag = master.lags.get(lag_index).unwrap();
                !loop_back
                    && aggregatable
                    && !lag.members.contains(&port_handle)
            };
            if joinable {
                master.lags.get_mut(lag_index).unwrap().insert_member(port_handle);
                master.ports.get_mut(index).unwrap().lag = Some(lag_index);
                Debug::LagMemberJoin(port_type, lag_id, port_handle).log();
                recompute_max_port_priority(master, lag_index);
            }
        } else {
            let lag_index = master.lags.create(port_type, lag_id, port_handle);
            master.ports.get_mut(index).unwrap().lag = Some(lag_index);
            Debug::LagCreate(port_type, lag_id).log();
            recompute_max_port_priority(master, lag_index);
        }
    }

    // Step 5: if the port is in a LAG but Unselected, (re)bind to the
    // aggregator.
    let port = master.ports.get(index).unwrap();
    if port.lag.is_some() && port.control.selected == Selected::Unselected {
        bind_aggregator(master, index);
    }
}

pub(crate) fn remove_from_lag(master: &mut Master, index: PortIndex, lag_index: crate::lag::LagIndex) {
    let port = master.ports.get_mut(index).unwrap();
    let port_handle = port.handle;
    port.control.selected = Selected::Unselected;
    port.control.ready_n = false;
    port.lag = None;
    mux::dispatch(master, index, mux::Event::Unselected);

    let lag = master.lags.get_mut(lag_index).unwrap();
    lag.remove_member(port_handle);
    let empty = lag.is_empty();
    let aggregator = lag.aggregator;
    let port_type = lag.port_type;
    let lag_id = lag.id;
    Debug::LagMemberLeave(port_type, lag_id, port_handle).log();

    if empty {
        if !aggregator.is_none()
            && let Err(error) = master.programmer.clear_aggregator(aggregator)
        {
            crate::error::Error::DataplaneError(port_handle, error.to_string()).log();
        }
        master.lags.destroy(lag_index);
        Debug::LagDestroy(port_type, lag_id).log();
    } else {
        recompute_max_port_priority(master, lag_index);
    }
}

/// Recomputes a LAG's `max_port_priority` from its current members'
/// `actor_port_priority` (§3 Data Model, SuperPort record).
fn recompute_max_port_priority(master: &mut Master, lag_index: crate::lag::LagIndex) {
    let Some(lag) = master.lags.get(lag_index) else {
        return;
    };
    let max = lag
        .members
        .iter()
        .filter_map(|handle| master.ports.get_by_handle(*handle))
        .map(|(_, port)| port.actor.port_priority)
        .max()
        .unwrap_or(0);
    master.lags.get_mut(lag_index).unwrap().max_port_priority = max;
}

/// Invokes the data-plane programmer to bind the port to an aggregator,
/// §4.4 "Aggregator bind".
fn bind_aggregator(master: &mut Master, index: PortIndex) {
    let port = master.ports.get(index).unwrap();
    let params = AggregatorMatch {
        port_type: port.port_type,
        actor_key: port.actor.key,
        partner_key: port.partner.key,
        partner_system_priority: port.partner.system.priority,
        partner_system: port.partner.system,
        local_port_number: port.actor.port_number,
        actor_aggregatable: port
            .actor
            .state
            .contains(crate::packet::StateFlags::AGGREGATION),
        partner_aggregatable: port
            .partner
            .state
            .contains(crate::packet::StateFlags::AGGREGATION),
        actor_port_priority: port.actor.port_priority,
        partner_port_priority: port.partner.port_priority,
    };
    let port_handle = port.handle;
    let lag_index = port.lag;

    match master.programmer.select_aggregator(params) {
        Ok(handle) => {
            let port = master.ports.get_mut(index).unwrap();
            port.aggregator = handle;
            port.control.selected = Selected::Selected;
            if let Some(lag_index) = lag_index {
                master.lags.get_mut(lag_index).unwrap().aggregator = handle;
            }
            Debug::AggregatorBind(port_handle, handle).log();
            mux::dispatch(master, index, mux::Event::Selected);
        }
        Err(error) => {
            crate::error::Error::DataplaneError(port_handle, error.to_string()).log();
        }
    }
}
