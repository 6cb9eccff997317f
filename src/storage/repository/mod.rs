// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the embedded database.
//!
//! Each repository borrows the [`Store`](crate::storage::Store) and owns the
//! transactions for one entity type.

pub mod challenges;
pub mod contacts;
pub mod identities;
pub mod sessions;
pub mod transfers;

pub use challenges::{ChallengeRepository, StoredChallenge};
pub use contacts::{ContactRepository, StoredContact};
pub use identities::{IdentityRepository, LinkOutcome, RegisterOutcome, StoredIdentity};
pub use sessions::{SessionRepository, StoredSession};
pub use transfers::{
    Direction, LedgerError, PendingPage, RecordOutcome, TransactionLedger, TransferPage,
    TransferRecord, TransferStatus,
};
