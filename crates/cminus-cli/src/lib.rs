// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Build orchestration for the `c_minus` CLI.
//!
//! The heavy lifting lives here rather than in `main.rs` so integration
//! tests can drive the same build pipeline the binary uses.

pub mod c_compiler;
pub mod commands;
