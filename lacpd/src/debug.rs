//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{debug, debug_span};

use crate::fsm::{MuxState, PeriodicState, ReceiveState};
use crate::types::{AggregatorHandle, LagId, PortHandle, PortType};

// Protocol engine debug messages.
#[derive(Debug)]
pub enum Debug {
    PortCreate(PortHandle),
    PortDelete(PortHandle),
    ReceiveFsmTransition(PortHandle, ReceiveState, ReceiveState),
    PeriodicFsmTransition(PortHandle, PeriodicState, PeriodicState),
    MuxFsmTransition(PortHandle, MuxState, MuxState),
    LagCreate(PortType, LagId),
    LagDestroy(PortType, LagId),
    LagMemberJoin(PortType, LagId, PortHandle),
    LagMemberLeave(PortType, LagId, PortHandle),
    AggregatorBind(PortHandle, AggregatorHandle),
    PduSent(PortHandle),
    PduReceived(PortHandle),
    PduDiscardedLoopback(PortHandle),
    PduDiscardedInvalidActorPort(PortHandle),
}

// ===== impl Debug =====

impl Debug {
    // Logs the debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::PortCreate(port) | Debug::PortDelete(port) => {
                debug_span!("port", %port).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::ReceiveFsmTransition(port, old, new) => {
                debug_span!("port", %port).in_scope(|| {
                    debug!(?old, ?new, "{}", self);
                });
            }
            Debug::PeriodicFsmTransition(port, old, new) => {
                debug_span!("port", %port).in_scope(|| {
                    debug!(?old, ?new, "{}", self);
                });
            }
            Debug::MuxFsmTransition(port, old, new) => {
                debug_span!("port", %port).in_scope(|| {
                    debug!(?old, ?new, "{}", self);
                });
            }
            Debug::LagCreate(port_type, id) | Debug::LagDestroy(port_type, id) => {
                debug_span!("lag", ?port_type, ?id).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::LagMemberJoin(port_type, id, port)
            | Debug::LagMemberLeave(port_type, id, port) => {
                debug_span!("lag", ?port_type, ?id, %port).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::AggregatorBind(port, aggregator) => {
                debug_span!("port", %port).in_scope(|| {
                    debug!(%aggregator, "{}", self);
                });
            }
            Debug::PduSent(port)
            | Debug::PduReceived(port)
            | Debug::PduDiscardedLoopback(port)
            | Debug::PduDiscardedInvalidActorPort(port) => {
                debug_span!("port", %port).in_scope(|| {
                    debug!("{}", self);
                });
            }
        }
    }
}

impl std::fmt::Display for Debug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::PortCreate(..) => write!(f, "port created"),
            Debug::PortDelete(..) => write!(f, "port deleted"),
            Debug::ReceiveFsmTransition(..) => write!(f, "receive FSM state transition"),
            Debug::PeriodicFsmTransition(..) => write!(f, "periodic-tx FSM state transition"),
            Debug::MuxFsmTransition(..) => write!(f, "mux FSM state transition"),
            Debug::LagCreate(..) => write!(f, "LAG created"),
            Debug::LagDestroy(..) => write!(f, "LAG destroyed"),
            Debug::LagMemberJoin(..) => write!(f, "port joined LAG"),
            Debug::LagMemberLeave(..) => write!(f, "port left LAG"),
            Debug::AggregatorBind(..) => write!(f, "port bound to aggregator"),
            Debug::PduSent(..) => write!(f, "LACPDU sent"),
            Debug::PduReceived(..) => write!(f, "LACPDU received"),
            Debug::PduDiscardedLoopback(..) => write!(f, "LACPDU discarded (loop-back)"),
            Debug::PduDiscardedInvalidActorPort(..) => {
                write!(f, "LACPDU discarded (actor_port == 0)")
            }
        }
    }
}
