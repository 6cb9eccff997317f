// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM chain support via alloy.

pub mod client;
pub mod erc20;
pub mod transfer;

pub use client::EvmRpcClient;
