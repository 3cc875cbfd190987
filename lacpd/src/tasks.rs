//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use lacp_utils::socket::{AsyncFd, Socket};
use lacp_utils::task::{IntervalTask, Task};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::Instrument;

use crate::events;
use crate::master::Master;
use crate::network;
use crate::northbound::configuration::ConfigStore;
use crate::types::PortHandle;

// The event channel's default depth. Generous relative to the 1 Hz tick and
// per-port Rx rate; a full channel would mean the protocol task has fallen
// behind every producer at once.
const CHANNEL_CAPACITY: usize = 256;

//
// lacpd tasks diagram:
//                                +----------------+
//                                |  config store  |
//                                +----------------+
//                                      | ^
//                   config_rx (1x)     V |
//                                +----------------+
//                 net_rx (Nx) -> |                |
//                   tick (1x) -> |     master     | -> southbound calls (sync)
//                                |                | -> net_tx (sync, per-call)
//                                +----------------+
//

// Inter-task message types.
pub mod messages {
    use lacp_utils::mac_addr::MacAddr;
    use serde::{Deserialize, Serialize};

    use crate::port::PortConfig;
    use crate::types::{PortHandle, PortType, SystemId};

    pub mod input {
        use super::*;

        // §4.7 "Event Dispatch": the tagged events the single consumer
        // queue delivers to the protocol task.
        #[derive(Debug, Deserialize, Serialize)]
        pub enum ProtocolMsg {
            RxFrame(RxFrameMsg),
            Tick,
            ConfigChange(ConfigChangeMsg),
            ConfigRemove(PortHandle),
            LinkUp(LinkUpMsg),
            LinkDown(LinkDownMsg),
            PortOverride(PortOverrideMsg),
            SystemIdChange(MacAddr),
            SystemPriorityChange(u16),
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct RxFrameMsg {
            pub port: PortHandle,
            pub bytes: Vec<u8>,
        }

        // A full admin-config replacement for a port, sourced from the
        // configuration store's port/interface sections (§6). Creates the
        // port if it is not yet registered.
        #[derive(Debug, Deserialize, Serialize)]
        pub struct ConfigChangeMsg {
            pub port: PortHandle,
            pub port_type: PortType,
            pub config: PortConfig,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct LinkUpMsg {
            pub port: PortHandle,
            pub speed_mbps: u64,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct LinkDownMsg {
            pub port: PortHandle,
        }

        // A narrower override than `ConfigChangeMsg`, for the per-port
        // `lacp_system_id`/`lacp_system_priority` override knobs alone (§6).
        #[derive(Debug, Deserialize, Serialize)]
        pub struct PortOverrideMsg {
            pub port: PortHandle,
            pub system_id_override: Option<SystemId>,
            pub system_priority_override: Option<u16>,
        }
    }
}

// Per-interface raw-frame receive task (§5 "one receiver task per
// interface"). Only enqueues events; never touches protocol state.
pub(crate) fn net_rx(
    socket: Arc<AsyncFd<Socket>>,
    port: PortHandle,
    net_rxp: Sender<messages::input::ProtocolMsg>,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        Task::spawn(
            async move {
                let _ = network::read_loop(socket, port, net_rxp).await;
            }
            .in_current_span(),
        )
    }
    #[cfg(feature = "testing")]
    {
        let _ = (socket, port, net_rxp);
        Task::spawn(async move { std::future::pending().await })
    }
}

// One-second protocol tick (§4.6 "timer wheel").
pub(crate) fn tick(tickp: Sender<messages::input::ProtocolMsg>) -> IntervalTask {
    #[cfg(not(feature = "testing"))]
    {
        use std::time::Duration;

        IntervalTask::new(Duration::from_secs(1), true, move || {
            let tickp = tickp.clone();
            async move {
                let _ = tickp.send(messages::input::ProtocolMsg::Tick).await;
            }
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = tickp;
        IntervalTask {}
    }
}

/// Spawns one `net_rx` per registered port plus the shared `tick`, all
/// feeding clones of a single channel. Unlike `holo-bfd`'s
/// `ProtocolInputChannelsRx`, which `select!`s across distinct per-message-
/// type channels, `ProtocolMsg` is already one unified enum, so every
/// producer here shares one `Sender` and the consumer needs only a plain
/// `Receiver`, no `select!`.
///
/// Per-port socket setup failures are logged and that port is simply left
/// without an Rx task, rather than aborting startup for every other port.
pub fn spawn_producers(
    master: &Master,
) -> (Vec<Task<()>>, IntervalTask, Receiver<messages::input::ProtocolMsg>) {
    let (netp, rx) = mpsc::channel(CHANNEL_CAPACITY);

    let mut rx_tasks = Vec::new();
    for (_, port) in master.ports.iter() {
        let handle = port.handle;
        let socket = network::socket(handle.port_index()).and_then(AsyncFd::new);
        match socket {
            Ok(socket) => rx_tasks.push(net_rx(Arc::new(socket), handle, netp.clone())),
            Err(error) => crate::error::IoError::SocketError(error).log(handle),
        }
    }

    let tick_task = tick(netp);
    (rx_tasks, tick_task, rx)
}

/// Drains the event queue, dispatching each message in turn, until the
/// channel closes or `master.shutdown` is set (§4.7, §5 "Shutdown is
/// cooperative: a shutdown flag is checked after each event").
pub async fn run(
    master: &mut Master,
    rx: &mut Receiver<messages::input::ProtocolMsg>,
) {
    while let Some(msg) = rx.recv().await {
        events::dispatch(master, msg);
        if master.shutdown {
            break;
        }
    }
}

/// Convenience entry point tying `Master::load_config`, `spawn_producers`
/// and `run` together: pulls the initial config snapshot, starts the
/// per-port receivers and the tick, then drives the event loop to
/// completion. The producer tasks are kept alive for the duration of the
/// loop by staying bound in this function's scope.
pub async fn serve(master: &mut Master, store: &dyn ConfigStore) {
    master.load_config(store);
    let (_rx_tasks, _tick_task, mut rx) = spawn_producers(master);
    run(master, &mut rx).await;
}
