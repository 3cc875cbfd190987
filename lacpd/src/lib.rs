//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod debug;
pub mod error;
pub mod events;
pub mod fsm;
pub mod lag;
pub mod master;
pub mod network;
pub mod northbound;
pub mod packet;
pub mod port;
pub mod selection;
pub mod southbound;
pub mod tasks;
pub mod types;
