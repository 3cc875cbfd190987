//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

// Data-plane programming interface (§6 "Data-plane programmer"). The core
// never touches hardware directly; it calls through this trait, which the
// out-of-scope data-plane collaborator implements.

use crate::types::{AggregatorHandle, PortHandle, PortType, SystemId};

/// The match parameters passed to `select_aggregator`, mirroring the
/// configuration-store contract's field list verbatim (§6).
#[derive(Clone, Copy, Debug)]
pub struct AggregatorMatch {
    pub port_type: PortType,
    pub actor_key: u16,
    pub partner_key: u16,
    pub partner_system_priority: u16,
    pub partner_system: SystemId,
    pub local_port_number: u16,
    pub actor_aggregatable: bool,
    pub partner_aggregatable: bool,
    pub actor_port_priority: u16,
    pub partner_port_priority: u16,
}

#[derive(Debug)]
pub struct ProgrammerError(pub String);

impl std::fmt::Display for ProgrammerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ProgrammerError {}

pub trait DataplaneProgrammer: std::fmt::Debug + Send {
    /// Selects (or creates) a data-plane aggregator matching the given
    /// parameters, returning its handle.
    fn select_aggregator(
        &mut self,
        params: AggregatorMatch,
    ) -> Result<AggregatorHandle, ProgrammerError>;

    /// Attaches `lport` to `aggregator`, updating the super-port's partner
    /// priority/MAC bookkeeping and the hardware LAG bitmap.
    fn attach_lport(
        &mut self,
        aggregator: AggregatorHandle,
        lport: PortHandle,
        partner_priority: u16,
        partner_mac: crate::types::SystemId,
    ) -> Result<(), ProgrammerError>;

    fn detach_lport(
        &mut self,
        aggregator: AggregatorHandle,
        lport: PortHandle,
    ) -> Result<(), ProgrammerError>;

    fn enable_collecting(&mut self, lport: PortHandle) -> Result<(), ProgrammerError>;

    fn enable_distributing(&mut self, lport: PortHandle) -> Result<(), ProgrammerError>;

    fn disable_collect_dist(&mut self, lport: PortHandle) -> Result<(), ProgrammerError>;

    fn clear_aggregator(&mut self, aggregator: AggregatorHandle) -> Result<(), ProgrammerError>;
}

#[cfg(feature = "testing")]
pub mod testing {
    use std::collections::HashSet;

    use super::*;

    /// A deterministic fake programmer for conformance tests: hands out
    /// sequential aggregator handles and records every call it receives.
    #[derive(Debug, Default)]
    pub struct FakeProgrammer {
        pub next_handle: u32,
        pub calls: Vec<String>,
        pub attached: HashSet<(AggregatorHandle, PortHandle)>,
        pub collecting: HashSet<PortHandle>,
        pub distributing: HashSet<PortHandle>,
        pub fail_select: bool,
    }

    impl DataplaneProgrammer for FakeProgrammer {
        fn select_aggregator(
            &mut self,
            params: AggregatorMatch,
        ) -> Result<AggregatorHandle, ProgrammerError> {
            self.calls.push(format!("select_aggregator({params:?})"));
            if self.fail_select {
                return Err(ProgrammerError("select_aggregator failed".into()));
            }
            self.next_handle += 1;
            Ok(AggregatorHandle(self.next_handle))
        }

        fn attach_lport(
            &mut self,
            aggregator: AggregatorHandle,
            lport: PortHandle,
            partner_priority: u16,
            partner_mac: SystemId,
        ) -> Result<(), ProgrammerError> {
            self.calls.push(format!(
                "attach_lport({aggregator:?}, {lport:?}, {partner_priority}, {partner_mac:?})"
            ));
            self.attached.insert((aggregator, lport));
            Ok(())
        }

        fn detach_lport(
            &mut self,
            aggregator: AggregatorHandle,
            lport: PortHandle,
        ) -> Result<(), ProgrammerError> {
            self.calls.push(format!("detach_lport({aggregator:?}, {lport:?})"));
            self.attached.remove(&(aggregator, lport));
            self.collecting.remove(&lport);
            self.distributing.remove(&lport);
            Ok(())
        }

        fn enable_collecting(&mut self, lport: PortHandle) -> Result<(), ProgrammerError> {
            self.calls.push(format!("enable_collecting({lport:?})"));
            self.collecting.insert(lport);
            Ok(())
        }

        fn enable_distributing(&mut self, lport: PortHandle) -> Result<(), ProgrammerError> {
            self.calls.push(format!("enable_distributing({lport:?})"));
            self.distributing.insert(lport);
            Ok(())
        }

        fn disable_collect_dist(&mut self, lport: PortHandle) -> Result<(), ProgrammerError> {
            self.calls.push(format!("disable_collect_dist({lport:?})"));
            self.collecting.remove(&lport);
            self.distributing.remove(&lport);
            Ok(())
        }

        fn clear_aggregator(&mut self, aggregator: AggregatorHandle) -> Result<(), ProgrammerError> {
            self.calls.push(format!("clear_aggregator({aggregator:?})"));
            self.attached.retain(|(agg, _)| *agg != aggregator);
            Ok(())
        }
    }
}
