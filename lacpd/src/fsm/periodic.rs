//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

use crate::master::Master;
use crate::port::PortIndex;
use crate::types::{FAST_PERIODIC, LacpTimeout, SLOW_PERIODIC};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PeriodicState {
    NoPeriodic,
    FastPeriodic,
    SlowPeriodic,
    PeriodicTx,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    Begin,
    /// Either side became Active while not already transmitting (§4.1
    /// `recordPDU`'s E2 post); re-checks the `NoPeriodic` UCT condition.
    PartnerActive,
    /// Periodic timer reached zero (E3).
    Tick,
    PartnerTimeoutLong,
    LacpDisabled,
    PartnerTimeoutShort,
    PortDisabled,
    BothPassive,
}

/// Dispatches an event to the Periodic-Transmit FSM, §4.2.
pub fn dispatch(master: &mut Master, index: PortIndex, event: Event) {
    let Some(port) = master.ports.get(index) else {
        return;
    };
    let current = port.periodic_state;
    let port_enabled = port.control.port_enabled;
    let port_handle = port.handle;

    let next = match (current, event) {
        (_, Event::Begin) => PeriodicState::NoPeriodic,
        (_, Event::PortDisabled) => PeriodicState::NoPeriodic,
        (_, Event::LacpDisabled) => PeriodicState::NoPeriodic,
        (_, Event::BothPassive) => PeriodicState::NoPeriodic,
        (PeriodicState::NoPeriodic, Event::PartnerActive) if port_enabled => {
            PeriodicState::FastPeriodic
        }
        (PeriodicState::FastPeriodic, Event::PartnerTimeoutLong) => PeriodicState::SlowPeriodic,
        (PeriodicState::SlowPeriodic, Event::PartnerTimeoutShort) => PeriodicState::FastPeriodic,
        (PeriodicState::PeriodicTx, Event::PartnerTimeoutShort) => PeriodicState::FastPeriodic,
        (PeriodicState::PeriodicTx, Event::PartnerTimeoutLong) => PeriodicState::SlowPeriodic,
        (PeriodicState::FastPeriodic, Event::Tick) => PeriodicState::PeriodicTx,
        (PeriodicState::SlowPeriodic, Event::Tick) => PeriodicState::PeriodicTx,
        // Ignored: no transition defined (e.g. PartnerActive while already
        // running, or a timeout event with nothing listening for it yet).
        _ => return,
    };

    let old = current;
    master.ports.get_mut(index).unwrap().periodic_state = next;
    crate::debug::Debug::PeriodicFsmTransition(port_handle, old, next).log();
    enter(master, index, next);
}

fn enter(master: &mut Master, index: PortIndex, state: PeriodicState) {
    match state {
        PeriodicState::NoPeriodic => {
            let port = master.ports.get_mut(index).unwrap();
            port.control.begin = false;
            port.timers.periodic = 0;
            let should_run = port.control.port_enabled && port.is_active_or_partner_active();
            if should_run {
                dispatch(master, index, Event::PartnerActive);
            }
        }
        PeriodicState::FastPeriodic => {
            let port = master.ports.get_mut(index).unwrap();
            port.timers.periodic = FAST_PERIODIC;
            if port.partner.timeout() == LacpTimeout::Long {
                dispatch(master, index, Event::PartnerTimeoutLong);
            }
        }
        PeriodicState::SlowPeriodic => {
            let port = master.ports.get_mut(index).unwrap();
            port.timers.periodic = SLOW_PERIODIC;
            if port.partner.timeout() == LacpTimeout::Short {
                dispatch(master, index, Event::PartnerTimeoutShort);
            }
        }
        PeriodicState::PeriodicTx => {
            master.ports.get_mut(index).unwrap().control.ntt = true;
            crate::events::transmit(master, index);

            let port = master.ports.get(index).unwrap();
            if port.both_passive() {
                dispatch(master, index, Event::BothPassive);
            } else if port.partner.timeout() == LacpTimeout::Short {
                dispatch(master, index, Event::PartnerTimeoutShort);
            } else {
                dispatch(master, index, Event::PartnerTimeoutLong);
            }
        }
    }
}

/// Per-port periodic maintenance run from the 1 Hz timer wheel, §4.6 step 1 /
/// §4.2 "Periodic tick". The async-tx budget is cleared on every tick
/// regardless of state so a burst right after re-arming isn't double-
/// penalized by a stale counter from the previous second.
pub fn tick(master: &mut Master, index: PortIndex) {
    let port = master.ports.get_mut(index).unwrap();
    port.async_tx_budget = 0;
    if port.periodic_state == PeriodicState::NoPeriodic {
        return;
    }
    if port.timers.periodic > 0 {
        port.timers.periodic -= 1;
    }
    let expired = port.timers.periodic == 0;
    let ntt = port.control.ntt;

    if expired {
        dispatch(master, index, Event::Tick);
    } else if ntt {
        crate::events::async_transmit(master, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::FakeTransport;
    use crate::port::PortConfig;
    use crate::southbound::testing::FakeProgrammer;
    use crate::types::{LacpActivity, PortHandle, PortType};

    fn new_master() -> Master {
        Master::new(
            Box::new(FakeProgrammer::default()),
            Box::new(FakeTransport::default()),
        )
    }

    #[test]
    fn begin_resets_to_no_periodic() {
        let mut master = new_master();
        let index =
            master
                .ports
                .insert(PortHandle::new(1, 0), PortConfig::default(), PortType::Speed1G);
        dispatch(&mut master, index, Event::Begin);
        assert_eq!(
            master.ports.get(index).unwrap().periodic_state,
            PeriodicState::NoPeriodic
        );
    }

    #[test]
    fn active_partner_on_enabled_port_starts_fast_periodic() {
        let mut master = new_master();
        let mut config = PortConfig::default();
        config.activity = LacpActivity::Active;
        let index = master.ports.insert(PortHandle::new(1, 0), config, PortType::Speed1G);
        master.ports.get_mut(index).unwrap().control.port_enabled = true;
        dispatch(&mut master, index, Event::Begin);
        dispatch(&mut master, index, Event::PartnerActive);
        assert_eq!(
            master.ports.get(index).unwrap().periodic_state,
            PeriodicState::FastPeriodic
        );
    }

    #[test]
    fn tick_to_zero_enters_periodic_tx_and_transmits() {
        let mut master = new_master();
        let mut config = PortConfig::default();
        config.activity = LacpActivity::Active;
        let index = master.ports.insert(PortHandle::new(1, 0), config, PortType::Speed1G);
        master.ports.get_mut(index).unwrap().control.port_enabled = true;
        dispatch(&mut master, index, Event::Begin);
        dispatch(&mut master, index, Event::PartnerActive);
        assert_eq!(
            master.ports.get(index).unwrap().periodic_state,
            PeriodicState::FastPeriodic
        );
        tick(&mut master, index);
        assert_eq!(master.ports.get(index).unwrap().timers.periodic, 0);
    }

    #[test]
    fn both_passive_resets_to_no_periodic() {
        let mut master = new_master();
        let index =
            master
                .ports
                .insert(PortHandle::new(1, 0), PortConfig::default(), PortType::Speed1G);
        dispatch(&mut master, index, Event::Begin);
        dispatch(&mut master, index, Event::BothPassive);
        assert_eq!(
            master.ports.get(index).unwrap().periodic_state,
            PeriodicState::NoPeriodic
        );
    }
}
