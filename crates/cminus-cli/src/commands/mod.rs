// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommand implementations.

pub mod build;
pub mod check;
