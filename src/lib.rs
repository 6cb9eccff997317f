// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! NAKAMA - Wallet Authentication & Transfer Relay Service
//!
//! Wallets sign in by signing a server-issued challenge, register a
//! username, and send SOL, SPL or EVM tokens to other users by username.
//! The server builds unsigned transactions, checks the signed result and
//! relays it; it never holds private keys.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Challenge signing, signature verification, sessions
//! - `blockchain` - Solana and EVM transaction building and RPC
//! - `identity` - Usernames, profiles, contacts
//! - `storage` - Embedded database (redb)

pub mod api;
pub mod auth;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod identity;
pub mod state;
pub mod storage;
