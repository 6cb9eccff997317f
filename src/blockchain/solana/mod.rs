// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Solana support: legacy wire format, the handful of programs a transfer
//! touches, and a JSON-RPC client.

pub mod client;
pub mod instructions;
pub mod transfer;
pub mod wire;

pub use client::SolanaRpcClient;
pub use wire::{Pubkey, Transaction};
