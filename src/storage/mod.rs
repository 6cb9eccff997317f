// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives in a single redb file: challenges, sessions,
//! identities, contacts and the transfer ledger. Nothing here ever holds a
//! private key; the server only stores public addresses and signatures.

pub mod database;
pub mod repository;

pub use database::{Store, StoreError, StoreResult};
pub use repository::{
    ChallengeRepository, ContactRepository, Direction, IdentityRepository, LedgerError,
    LinkOutcome, PendingPage, RecordOutcome, RegisterOutcome, SessionRepository,
    StoredChallenge, StoredContact, StoredIdentity, StoredSession, TransactionLedger,
    TransferPage, TransferRecord, TransferStatus,
};
