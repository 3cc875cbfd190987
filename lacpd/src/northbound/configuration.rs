//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

use lacp_utils::mac_addr::MacAddr;

use crate::port::PortConfig;
use crate::types::{PortHandle, PortType};

/// System-level fields of the configuration-store contract's read side
/// (§6): `system_mac`, `lacp_system_id` override, `lacp_system_priority`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemConfig {
    pub system_mac: MacAddr,
    pub system_id_override: Option<MacAddr>,
    pub system_priority: u16,
}

/// One managed interface's admin configuration, combining the store's
/// Interface section (`type`, `link_state`, `link_speed`, `lacp_port_id`,
/// `lacp_port_priority`, `lacp_aggregation_key`) with its owning Port
/// section's LACP knobs (§6).
#[derive(Clone, Debug)]
pub struct InterfaceConfig {
    pub port: PortHandle,
    pub port_type: PortType,
    pub lacp: PortConfig,
    pub link_state: bool,
    pub link_speed_bps: u64,
}

/// The read side of the configuration-store contract (§6). An initial
/// snapshot is pulled through this trait at startup; subsequent changes
/// arrive as `ProtocolMsg`s on the protocol task's event queue (§4.7) rather
/// than through further trait calls, keeping the store's watch mechanism
/// out of the core's concern.
pub trait ConfigStore: std::fmt::Debug + Send {
    fn system(&self) -> SystemConfig;
    fn interfaces(&self) -> Vec<InterfaceConfig>;
}

#[cfg(feature = "testing")]
pub mod testing {
    use super::*;

    #[derive(Clone, Debug, Default)]
    pub struct FakeConfigStore {
        pub system: SystemConfig,
        pub interfaces: Vec<InterfaceConfig>,
    }

    impl ConfigStore for FakeConfigStore {
        fn system(&self) -> SystemConfig {
            self.system
        }

        fn interfaces(&self) -> Vec<InterfaceConfig> {
            self.interfaces.clone()
        }
    }
}
