// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain integration: Solana and EVM chains.
//!
//! This module provides functionality for:
//! - Chain families, address normalisation and token metadata
//! - Building unsigned SOL / SPL / native EVM / ERC-20 transfers
//! - Re-validating signed transfers and relaying them to the chain
//! - Tracking confirmation of relayed transfers

pub mod amount;
pub mod builder;
pub mod confirm;
pub mod evm;
pub mod relay;
pub mod rpc;
pub mod solana;
pub mod types;

pub use builder::{BuildError, PreparedTransfer, TransactionBuilder, TransferIntent};
pub use confirm::ConfirmationPoller;
pub use relay::{SubmitError, SubmitOutcome, SubmitRequest, SubmitState, TransactionRelay};
pub use rpc::{ChainRpc, OnChainStatus, RpcError, RpcRegistry};
pub use types::*;
