//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

// Raw L2 transport (§6 "Wire format", §5 "one receiver task per interface").
// Each managed interface gets its own AF_PACKET socket, kernel-filtered to
// the Slow-Protocols EtherType so non-LACP/Marker traffic never reaches
// userspace.

use std::os::fd::AsRawFd;
use std::sync::Arc;

use lacp_utils::capabilities;
use lacp_utils::mac_addr::MacAddr;
use lacp_utils::socket::{AsyncFd, Socket};
use nix::sys::socket;
use nix::sys::socket::LinkAddr;
use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::SendError;

use crate::error::IoError;
use crate::packet::ETHERTYPE_SLOW_PROTOCOLS;
use crate::tasks::messages::input::{ProtocolMsg, RxFrameMsg};
use crate::types::PortHandle;

// BPF filter that accepts only Slow-Protocols frames (EtherType 0x8809).
const SLOW_PROTOCOLS_BPF_FILTER: [libc::sock_filter; 4] = [
    // l0: ldh [12]
    bpf_filter_block(0x28, 0, 0, 0x0000000c),
    // l1: jeq #0x8809, l2, l3
    bpf_filter_block(0x15, 0, 1, 0x00008809),
    // l2: ret #0x40000
    bpf_filter_block(0x06, 0, 0, 0x00040000),
    // l3: ret #0
    bpf_filter_block(0x06, 0, 0, 0x00000000),
];

/// Trait abstracting per-interface frame I/O, so the protocol engine can be
/// driven by a deterministic fake under the `testing` feature (§5, §6).
pub trait FrameTransport: std::fmt::Debug + Send {
    fn send(&self, port: PortHandle, frame: &[u8]) -> Result<(), IoError>;
}

// ===== global functions =====

pub(crate) fn socket(ifindex: u32) -> Result<Socket, std::io::Error> {
    #[cfg(not(feature = "testing"))]
    {
        use socket2::{Domain, Protocol, Type};

        let socket = capabilities::raise(|| {
            Socket::new(
                Domain::PACKET,
                Type::RAW,
                Some(Protocol::from(
                    (ETHERTYPE_SLOW_PROTOCOLS as i32).to_be(),
                )),
            )
        })?;
        socket.set_nonblocking(true)?;

        let sockaddr = LinkAddr::new(ETHERTYPE_SLOW_PROTOCOLS, ifindex, None);
        socket::bind(socket.as_raw_fd(), &sockaddr)?;

        socket.attach_filter(&SLOW_PROTOCOLS_BPF_FILTER)?;

        Ok(socket)
    }
    #[cfg(feature = "testing")]
    {
        let _ = ifindex;
        Ok(Socket::default())
    }
}

#[cfg(not(feature = "testing"))]
pub(crate) fn send_frame(
    socket: &AsyncFd<Socket>,
    ifindex: u32,
    dst: MacAddr,
    frame: &[u8],
) -> Result<(), IoError> {
    let sockaddr =
        LinkAddr::new(ETHERTYPE_SLOW_PROTOCOLS, ifindex, Some(dst.as_bytes()));
    socket::sendto(
        socket.get_ref().as_raw_fd(),
        frame,
        &sockaddr,
        socket::MsgFlags::empty(),
    )
    .map(|_| ())
    .map_err(|errno| IoError::SendError(errno.into()))
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn read_loop(
    socket: Arc<AsyncFd<Socket>>,
    port: PortHandle,
    net_rxp: Sender<ProtocolMsg>,
) -> Result<(), SendError<ProtocolMsg>> {
    use std::io::IoSliceMut;

    let mut buf = [0; 256];

    loop {
        let mut iov = [IoSliceMut::new(&mut buf)];
        match socket
            .async_io(tokio::io::Interest::READABLE, |socket| {
                socket::recvmsg::<LinkAddr>(
                    socket.as_raw_fd(),
                    &mut iov,
                    None,
                    socket::MsgFlags::empty(),
                )
                .map_err(|errno| errno.into())
            })
            .await
        {
            Ok(msg) => {
                let bytes = iov[0][..msg.bytes].to_vec();
                let msg = ProtocolMsg::RxFrame(RxFrameMsg { port, bytes });
                net_rxp.send(msg).await?;
            }
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {
                continue;
            }
            Err(error) => {
                IoError::RecvError(error).log(port);
            }
        }
    }
}

const fn bpf_filter_block(
    code: u16,
    jt: u8,
    jf: u8,
    k: u32,
) -> libc::sock_filter {
    libc::sock_filter { code, jt, jf, k }
}

#[cfg(feature = "testing")]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// A deterministic fake transport: every sent frame is appended to a
    /// per-port outbox, so conformance tests can assert on what would have
    /// gone out on the wire without a kernel socket.
    #[derive(Debug, Default)]
    pub struct FakeTransport {
        outbox: Mutex<HashMap<PortHandle, Vec<Vec<u8>>>>,
    }

    impl FakeTransport {
        pub fn sent(&self, port: PortHandle) -> Vec<Vec<u8>> {
            self.outbox
                .lock()
                .unwrap()
                .get(&port)
                .cloned()
                .unwrap_or_default()
        }
    }

    impl FrameTransport for FakeTransport {
        fn send(&self, port: PortHandle, frame: &[u8]) -> Result<(), IoError> {
            self.outbox
                .lock()
                .unwrap()
                .entry(port)
                .or_default()
                .push(frame.to_vec());
            Ok(())
        }
    }
}
