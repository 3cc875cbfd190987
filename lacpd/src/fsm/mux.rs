//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

use crate::master::Master;
use crate::packet::StateFlags;
use crate::port::PortIndex;
use crate::types::{Selected, WAIT_WHILE};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum MuxState {
    Detached,
    Waiting,
    Attached,
    Collecting,
    CollectingDistributing,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    /// Selected=Selected (E1).
    Selected,
    /// Selected=Unselected (E2).
    Unselected,
    /// Selected=Selected ∧ LAG.ready=true (E3).
    Ready,
    /// Selected=Standby (E4).
    Standby,
    /// Selected=Selected ∧ partner.Sync=true (E5).
    SelectedAndSync,
    /// partner.Sync=false (E6).
    PartnerSyncFalse,
    /// Begin=true (E7).
    Begin,
    /// Selected=Selected ∧ partner.Sync ∧ partner.Collecting (E8).
    PartnerCollecting,
    /// Selected=Selected ∧ partner.Sync ∧ ¬partner.Collecting (E9).
    PartnerNotCollecting,
}

/// Dispatches an event to the Mux FSM, §4.3.
pub fn dispatch(master: &mut Master, index: PortIndex, event: Event) {
    let Some(port) = master.ports.get(index) else {
        return;
    };
    let current = port.mux_state;
    let port_handle = port.handle;

    let next = match (current, event) {
        (_, Event::Begin) => MuxState::Detached,
        (MuxState::Detached, Event::Selected) => MuxState::Waiting,
        (MuxState::Detached, Event::Standby) => MuxState::Waiting,
        (MuxState::Waiting, Event::Unselected) => MuxState::Detached,
        (MuxState::Waiting, Event::Ready) => MuxState::Attached,
        (MuxState::Attached, Event::Unselected) => MuxState::Detached,
        (MuxState::Attached, Event::Standby) => MuxState::Detached,
        (MuxState::Attached, Event::SelectedAndSync) => MuxState::Collecting,
        (MuxState::Collecting, Event::Unselected) => MuxState::Detached,
        (MuxState::Collecting, Event::Standby) => MuxState::Detached,
        (MuxState::Collecting, Event::PartnerSyncFalse) => MuxState::Attached,
        (MuxState::Collecting, Event::PartnerCollecting) => MuxState::CollectingDistributing,
        (MuxState::CollectingDistributing, Event::Unselected) => MuxState::Detached,
        (MuxState::CollectingDistributing, Event::Standby) => MuxState::Detached,
        (MuxState::CollectingDistributing, Event::PartnerSyncFalse) => MuxState::Attached,
        (MuxState::CollectingDistributing, Event::PartnerNotCollecting) => MuxState::Collecting,
        // No transition defined for this (state, event) pair; ignore.
        _ => return,
    };

    let old = current;
    {
        let port = master.ports.get_mut(index).unwrap();
        port.prev_mux_state = Some(old);
        port.mux_state = next;
    }
    crate::debug::Debug::MuxFsmTransition(port_handle, old, next).log();
    enter(master, index, next);
}

fn enter(master: &mut Master, index: PortIndex, state: MuxState) {
    match state {
        MuxState::Detached => {
            let port = master.ports.get_mut(index).unwrap();
            let port_handle = port.handle;
            let aggregator = port.aggregator;
            port.actor.state.remove(
                StateFlags::SYNCHRONIZATION | StateFlags::COLLECTING | StateFlags::DISTRIBUTING,
            );
            port.aggregator = crate::types::AggregatorHandle::NONE;
            port.control.ntt = true;

            if !aggregator.is_none()
                && let Err(error) = master.programmer.detach_lport(aggregator, port_handle)
            {
                crate::error::Error::DataplaneError(port_handle, error.to_string()).log();
            }
            if let Err(error) = master.programmer.disable_collect_dist(port_handle) {
                crate::error::Error::DataplaneError(port_handle, error.to_string()).log();
            }
            crate::events::async_transmit(master, index);

            let port = master.ports.get(index).unwrap();
            match port.control.selected {
                Selected::Selected => dispatch(master, index, Event::Selected),
                Selected::Standby => dispatch(master, index, Event::Standby),
                Selected::Unselected => {}
            }
        }
        MuxState::Waiting => {
            master.ports.get_mut(index).unwrap().timers.wait_while = WAIT_WHILE;

            let port = master.ports.get(index).unwrap();
            let selected = port.control.selected;
            let lag_ready = port
                .lag
                .and_then(|lag_index| master.lags.get(lag_index))
                .map(|lag| lag.ready)
                .unwrap_or(false);

            if selected == Selected::Unselected {
                dispatch(master, index, Event::Unselected);
            } else if lag_ready {
                dispatch(master, index, Event::Ready);
            }
        }
        MuxState::Attached => {
            let skip_attach = matches!(
                master.ports.get(index).unwrap().prev_mux_state,
                Some(MuxState::Collecting) | Some(MuxState::CollectingDistributing)
            );

            if !skip_attach {
                let port = master.ports.get(index).unwrap();
                let port_handle = port.handle;
                let aggregator = port.aggregator;
                let partner_priority = port.partner.port_priority;
                let partner_system = port.partner.system;

                if !aggregator.is_none()
                    && let Err(error) = master.programmer.attach_lport(
                        aggregator,
                        port_handle,
                        partner_priority,
                        partner_system,
                    )
                {
                    crate::error::Error::DataplaneError(port_handle, error.to_string()).log();
                }
            }

            let port = master.ports.get_mut(index).unwrap();
            let port_handle = port.handle;
            port.actor.state.insert(StateFlags::SYNCHRONIZATION);
            port.actor
                .state
                .remove(StateFlags::COLLECTING | StateFlags::DISTRIBUTING);
            port.control.ntt = true;
            if let Err(error) = master.programmer.disable_collect_dist(port_handle) {
                crate::error::Error::DataplaneError(port_handle, error.to_string()).log();
            }
            crate::events::async_transmit(master, index);
        }
        MuxState::Collecting => {
            let port = master.ports.get_mut(index).unwrap();
            let port_handle = port.handle;
            port.actor.state.remove(StateFlags::DISTRIBUTING);
            port.control.ntt = true;

            if let Err(error) = master.programmer.enable_collecting(port_handle) {
                crate::error::Error::DataplaneError(port_handle, error.to_string()).log();
            } else {
                master
                    .ports
                    .get_mut(index)
                    .unwrap()
                    .actor
                    .state
                    .insert(StateFlags::COLLECTING);
            }
            crate::events::async_transmit(master, index);
        }
        MuxState::CollectingDistributing => {
            let port = master.ports.get_mut(index).unwrap();
            let port_handle = port.handle;
            port.control.ntt = true;

            if let Err(error) = master.programmer.enable_distributing(port_handle) {
                crate::error::Error::DataplaneError(port_handle, error.to_string()).log();
            } else {
                master
                    .ports
                    .get_mut(index)
                    .unwrap()
                    .actor
                    .state
                    .insert(StateFlags::DISTRIBUTING);
            }
            crate::events::async_transmit(master, index);
        }
    }
}

/// Per-port wait-while maintenance run from the 1 Hz timer wheel, §4.6 step
/// 2 / §4.3 "Wait-while handling".
pub fn tick(master: &mut Master, index: PortIndex) {
    let waiting = master.ports.get(index).unwrap().mux_state == MuxState::Waiting;
    if !waiting {
        return;
    }

    let expired = {
        let port = master.ports.get_mut(index).unwrap();
        if port.timers.wait_while > 0 {
            port.timers.wait_while -= 1;
        }
        port.timers.wait_while == 0
    };
    if !expired {
        return;
    }
    master.ports.get_mut(index).unwrap().control.ready_n = true;

    let Some(lag_index) = master.ports.get(index).unwrap().lag else {
        return;
    };
    let all_ready = {
        let lag = master.lags.get(lag_index).unwrap();
        lag.members.iter().all(|&handle| {
            master
                .ports
                .get_by_handle(handle)
                .map(|(_, p)| p.control.ready_n)
                .unwrap_or(false)
        })
    };

    if all_ready {
        master.lags.get_mut(lag_index).unwrap().ready = true;
        let selected = master.ports.get(index).unwrap().control.selected == Selected::Selected;
        if selected {
            dispatch(master, index, Event::Ready);
        }
    } else {
        master.ports.get_mut(index).unwrap().timers.wait_while = WAIT_WHILE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::FakeTransport;
    use crate::port::PortConfig;
    use crate::southbound::testing::FakeProgrammer;
    use crate::types::{PortHandle, PortType};

    fn new_master() -> Master {
        Master::new(
            Box::new(FakeProgrammer::default()),
            Box::new(FakeTransport::default()),
        )
    }

    #[test]
    fn begin_resets_to_detached() {
        let mut master = new_master();
        let index =
            master
                .ports
                .insert(PortHandle::new(1, 0), PortConfig::default(), PortType::Speed1G);
        dispatch(&mut master, index, Event::Begin);
        assert_eq!(master.ports.get(index).unwrap().mux_state, MuxState::Detached);
    }

    #[test]
    fn selected_drives_detached_to_waiting() {
        let mut master = new_master();
        let index =
            master
                .ports
                .insert(PortHandle::new(1, 0), PortConfig::default(), PortType::Speed1G);
        dispatch(&mut master, index, Event::Begin);
        master.ports.get_mut(index).unwrap().control.selected = Selected::Selected;
        dispatch(&mut master, index, Event::Selected);
        assert_eq!(master.ports.get(index).unwrap().mux_state, MuxState::Waiting);
    }

    #[test]
    fn ready_drives_waiting_to_attached() {
        let mut master = new_master();
        let index =
            master
                .ports
                .insert(PortHandle::new(1, 0), PortConfig::default(), PortType::Speed1G);
        dispatch(&mut master, index, Event::Begin);
        master.ports.get_mut(index).unwrap().control.selected = Selected::Selected;
        dispatch(&mut master, index, Event::Selected);
        dispatch(&mut master, index, Event::Ready);
        assert_eq!(master.ports.get(index).unwrap().mux_state, MuxState::Attached);
    }

    #[test]
    fn selected_and_sync_drives_attached_to_collecting() {
        let mut master = new_master();
        let index =
            master
                .ports
                .insert(PortHandle::new(1, 0), PortConfig::default(), PortType::Speed1G);
        dispatch(&mut master, index, Event::Begin);
        master.ports.get_mut(index).unwrap().control.selected = Selected::Selected;
        dispatch(&mut master, index, Event::Selected);
        dispatch(&mut master, index, Event::Ready);
        dispatch(&mut master, index, Event::SelectedAndSync);
        assert_eq!(
            master.ports.get(index).unwrap().mux_state,
            MuxState::Collecting
        );
        assert!(
            master
                .ports
                .get(index)
                .unwrap()
                .actor
                .state
                .contains(StateFlags::COLLECTING)
        );
    }

    #[test]
    fn unselected_drops_back_to_detached_from_any_attached_state() {
        let mut master = new_master();
        let index =
            master
                .ports
                .insert(PortHandle::new(1, 0), PortConfig::default(), PortType::Speed1G);
        dispatch(&mut master, index, Event::Begin);
        master.ports.get_mut(index).unwrap().control.selected = Selected::Selected;
        dispatch(&mut master, index, Event::Selected);
        dispatch(&mut master, index, Event::Ready);
        dispatch(&mut master, index, Event::SelectedAndSync);
        master.ports.get_mut(index).unwrap().control.selected = Selected::Unselected;
        dispatch(&mut master, index, Event::Unselected);
        assert_eq!(master.ports.get(index).unwrap().mux_state, MuxState::Detached);
    }
}
