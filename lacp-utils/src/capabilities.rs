//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

use capctl::caps::CapState;
use tracing::error;

/// Runs the provided closure with elevated capabilities (`CAP_NET_RAW`),
/// needed to bind the per-interface slow-protocols raw socket.
pub fn raise<F, R>(cb: F) -> R
where
    F: FnOnce() -> R,
{
    // Raise capabilities.
    let mut caps = CapState::get_current().unwrap();
    caps.effective = caps.permitted;
    if let Err(error) = caps.set_current() {
        error!("failed to update current capabilities: {}", error);
    }

    // Run closure.
    let ret = cb();

    // Drop capabilities.
    caps.effective.clear();
    if let Err(error) = caps.set_current() {
        error!("failed to update current capabilities: {}", error);
    }

    ret
}
