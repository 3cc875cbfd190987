//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

// Normal build: re-export standard socket types.
#[cfg(not(feature = "testing"))]
pub use {socket2::Socket, tokio::io::unix::AsyncFd};

// Test build: export mock sockets, so the protocol engine can be exercised
// without a kernel AF_PACKET socket or CAP_NET_RAW.
#[cfg(feature = "testing")]
pub use crate::socket::mock::{AsyncFd, Socket};

#[cfg(feature = "testing")]
pub mod mock {
    #[derive(Debug, Default)]
    pub struct AsyncFd<T>(T);

    #[derive(Debug, Default)]
    pub struct Socket();

    impl<T> AsyncFd<T> {
        pub fn new(inner: T) -> std::io::Result<Self> {
            Ok(Self(inner))
        }

        pub fn get_ref(&self) -> &T {
            &self.0
        }
    }
}
