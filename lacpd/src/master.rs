//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

// Owns the port and LAG registries and the external collaborator handles;
// the single point through which every FSM dispatch and selection pass
// mutates protocol state (§5 "one dedicated protocol task owns all
// LogicalPort and LAG state").

use crate::lag::Lags;
use crate::network::FrameTransport;
use crate::northbound::configuration::ConfigStore;
use crate::port::{PortIndex, Ports};
use crate::southbound::DataplaneProgrammer;
use crate::tasks::messages::input::{ConfigChangeMsg, LinkDownMsg, LinkUpMsg};
use crate::types::SystemId;

/// Global system identity, updated only by `SystemIdChange`/
/// `SystemPriorityChange` events so every FSM observes it serialized with
/// everything else (§9 Design Notes "Global mutable state").
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemConfig {
    pub id: SystemId,
}

pub struct Master {
    pub ports: Ports,
    pub lags: Lags,
    pub system: SystemConfig,
    pub programmer: Box<dyn DataplaneProgrammer>,
    pub transport: Box<dyn FrameTransport>,
    pub shutdown: bool,
}

impl std::fmt::Debug for Master {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Master")
            .field("ports", &self.ports)
            .field("lags", &self.lags)
            .field("system", &self.system)
            .field("shutdown", &self.shutdown)
            .finish()
    }
}

impl Master {
    pub fn new(
        programmer: Box<dyn DataplaneProgrammer>,
        transport: Box<dyn FrameTransport>,
    ) -> Master {
        Master {
            ports: Ports::default(),
            lags: Lags::default(),
            system: SystemConfig::default(),
            programmer,
            transport,
            shutdown: false,
        }
    }

    /// Initializes a newly configured port's FSMs (Begin=true semantics,
    /// §4.1/§4.2/§4.3 "Initial" states).
    pub fn port_begin(&mut self, index: PortIndex) {
        crate::fsm::receive::dispatch(self, index, crate::fsm::receive::Event::Begin);
        crate::fsm::periodic::dispatch(self, index, crate::fsm::periodic::Event::Begin);
        crate::fsm::mux::dispatch(self, index, crate::fsm::mux::Event::Begin);
    }

    /// Pulls the initial snapshot through the configuration-store contract's
    /// read side (§6) and applies it the same way a later `ProtocolMsg`
    /// would, so startup and steady-state config changes share one path.
    pub fn load_config(&mut self, store: &dyn ConfigStore) {
        let system = store.system();
        self.system.id.mac = system.system_id_override.unwrap_or(system.system_mac);
        self.system.id.priority = system.system_priority;

        for interface in store.interfaces() {
            let port = interface.port;
            crate::events::process_config_change(
                self,
                ConfigChangeMsg {
                    port,
                    port_type: interface.port_type,
                    config: interface.lacp,
                },
            );
            if interface.link_state {
                crate::events::process_link_up(
                    self,
                    LinkUpMsg {
                        port,
                        speed_mbps: interface.link_speed_bps / 1_000_000,
                    },
                );
            } else {
                crate::events::process_link_down(self, LinkDownMsg { port });
            }
        }
    }

    /// Requests that the event-dispatch loop stop after the event currently
    /// being processed (§5 "Shutdown is cooperative").
    pub fn request_shutdown(&mut self) {
        self.shutdown = true;
    }
}
