//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

// The three coupled state machines, §4.1-§4.3. Each is represented as an
// event enum plus a `dispatch` function that runs the entry action for the
// state reached and returns it; the `[state][event] -> (next_state, action)`
// table lives as a match expression rather than literal array data, letting
// Rust's exhaustiveness checking stand in for the table's completeness
// requirement.

pub mod mux;
pub mod periodic;
pub mod receive;

pub use mux::MuxState;
pub use periodic::PeriodicState;
pub use receive::ReceiveState;
