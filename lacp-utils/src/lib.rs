//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod bytes;
pub mod capabilities;
pub mod mac_addr;
pub mod socket;
pub mod task;
