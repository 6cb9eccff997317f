// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Unsigned transfer construction.
//!
//! `prepare` resolves a recipient username to an address on the sender's
//! chain, scales the amount to base units and assembles the chain-native
//! transaction for the wallet to sign. It only reads chain state (blockhash,
//! nonce, fees, token decimals); nothing is persisted.
//!
//! The same resolution (`resolve_intent`) is repeated by the relay when the
//! signed transaction comes back, so the checks there compare against the
//! request and not against whatever the client echoes.

use base64::Engine;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::amount::{format_amount, parse_amount, AmountError};
use super::rpc::{
    with_retry, ChainRpc, ChainState, RetryPolicy, RpcError, RpcRegistry, UnsignedCall,
};
use super::types::{ChainAddress, ChainFamily, ChainKind, ResolvedToken, TokenKind};
use super::{evm, solana};
use crate::storage::{IdentityRepository, Store, StoreError};

/// Longest memo accepted, in characters.
pub const MAX_MEMO_CHARS: usize = 280;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("Unsupported token: {0}")]
    UnsupportedToken(String),

    #[error("Memo exceeds {MAX_MEMO_CHARS} characters")]
    InvalidMemo,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Chain rejected the request: {0}")]
    ChainRejected(String),

    #[error("Relay unavailable: {0}")]
    RelayUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BuildError {
    /// Map a read-side RPC failure.
    pub fn from_rpc(err: RpcError) -> Self {
        match err {
            RpcError::Rejected(msg) => BuildError::ChainRejected(msg),
            other => BuildError::RelayUnavailable(other.to_string()),
        }
    }
}

/// A fully resolved transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    pub chain: ChainFamily,
    /// Sender's canonical address (the session wallet)
    pub from: String,
    /// Recipient's canonical address on `chain`
    pub to: String,
    pub to_username: String,
    pub token: ResolvedToken,
    pub base_units: u128,
    /// Normalised decimal amount
    pub amount: String,
    pub memo: Option<String>,
}

/// How the unsigned transaction in a [`PreparedTransfer`] is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// Legacy Solana wire format
    Base64,
    /// `0x`-prefixed EIP-2718 signing payload
    Hex,
}

/// Mirrors of the EIP-1559 fields, for wallets that rebuild the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EvmTransactionFields {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: String,
    pub max_priority_fee_per_gas: String,
    pub to: String,
    pub value: String,
    pub data: String,
}

/// Unsigned transaction ready for the wallet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PreparedTransfer {
    pub chain: ChainFamily,
    pub encoding: PayloadEncoding,
    /// Unsigned transaction
    pub transaction: String,
    pub from_address: String,
    pub to_address: String,
    pub to_username: String,
    /// Normalised decimal amount
    pub amount: String,
    /// Amount in the token's smallest unit
    pub base_units: String,
    pub token: ResolvedToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evm: Option<EvmTransactionFields>,
}

pub struct TransactionBuilder<'a> {
    store: &'a Store,
    rpc: &'a RpcRegistry,
    retry: RetryPolicy,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(store: &'a Store, rpc: &'a RpcRegistry) -> Self {
        Self {
            store,
            rpc,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn client(&self, chain: ChainFamily) -> Result<std::sync::Arc<dyn ChainRpc>, BuildError> {
        self.rpc
            .get(chain)
            .ok_or_else(|| BuildError::RelayUnavailable(format!("no RPC configured for {chain}")))
    }

    /// Resolve recipient, token and amount for a transfer from `sender`.
    pub async fn resolve_intent(
        &self,
        sender: &ChainAddress,
        recipient_username: &str,
        amount: &str,
        token: &str,
        memo: Option<&str>,
    ) -> Result<TransferIntent, BuildError> {
        let chain = sender.chain;
        let memo = memo.map(str::trim).filter(|m| !m.is_empty());
        if memo.is_some_and(|m| m.chars().count() > MAX_MEMO_CHARS) {
            return Err(BuildError::InvalidMemo);
        }

        let recipient = IdentityRepository::new(self.store)
            .get_by_username(recipient_username.trim())?
            .ok_or_else(|| BuildError::RecipientNotFound(recipient_username.to_string()))?;
        let to = recipient
            .address_for(chain)
            .ok_or_else(|| {
                BuildError::RecipientNotFound(format!(
                    "{} has no {chain} wallet",
                    recipient.username
                ))
            })?
            .to_string();

        let token = self.resolve_token(chain, token).await?;
        let base_units = parse_amount(amount, token.decimals)?;
        if chain.kind() == ChainKind::Solana && u64::try_from(base_units).is_err() {
            return Err(BuildError::InvalidAmount(AmountError::Overflow));
        }

        Ok(TransferIntent {
            chain,
            from: sender.address.clone(),
            to,
            to_username: recipient.username,
            amount: format_amount(base_units, token.decimals),
            token,
            base_units,
            memo: memo.map(str::to_string),
        })
    }

    async fn resolve_token(&self, chain: ChainFamily, raw: &str) -> Result<ResolvedToken, BuildError> {
        let token = TokenKind::parse(chain, raw)
            .map_err(|e| BuildError::UnsupportedToken(format!("{raw}: {e}")))?;
        let caps = chain.capabilities();
        match &token {
            TokenKind::Native => Ok(ResolvedToken {
                token,
                symbol: caps.native_symbol.to_string(),
                decimals: caps.native_decimals,
            }),
            TokenKind::Token(address) => {
                if let Some(known) = token.known(chain) {
                    return Ok(ResolvedToken {
                        symbol: known.symbol.to_string(),
                        decimals: known.decimals,
                        token,
                    });
                }
                let client = self.client(chain)?;
                let decimals = with_retry(&self.retry, "token_decimals", || {
                    client.token_decimals(address)
                })
                .await
                .map_err(|e| match e {
                    RpcError::Rejected(_) | RpcError::InvalidResponse(_) => {
                        BuildError::UnsupportedToken(format!("{address}: {e}"))
                    }
                    other => BuildError::RelayUnavailable(other.to_string()),
                })?;
                Ok(ResolvedToken {
                    symbol: short_symbol(address),
                    decimals,
                    token,
                })
            }
        }
    }

    /// Build the unsigned transaction for a transfer.
    pub async fn prepare(
        &self,
        sender: &ChainAddress,
        recipient_username: &str,
        amount: &str,
        token: &str,
        memo: Option<&str>,
    ) -> Result<PreparedTransfer, BuildError> {
        let intent = self
            .resolve_intent(sender, recipient_username, amount, token, memo)
            .await?;
        let client = self.client(intent.chain)?;

        let (encoding, transaction, evm_fields) = match intent.chain.kind() {
            ChainKind::Solana => {
                let call = UnsignedCall {
                    from: intent.from.clone(),
                    to: intent.to.clone(),
                    value: intent.base_units,
                    data: Vec::new(),
                };
                let state = with_retry(&self.retry, "chain_state", || client.chain_state(&call))
                    .await
                    .map_err(BuildError::from_rpc)?;
                let ChainState::Solana { recent_blockhash } = state else {
                    return Err(BuildError::RelayUnavailable(
                        "unexpected chain state for Solana".to_string(),
                    ));
                };
                let tx = solana::transfer::build_transfer(&intent, recent_blockhash)?;
                let encoded = base64::engine::general_purpose::STANDARD.encode(tx.serialize());
                (PayloadEncoding::Base64, encoded, None)
            }
            ChainKind::Evm => {
                let call = evm::transfer::transfer_call(&intent)?;
                let state = with_retry(&self.retry, "chain_state", || client.chain_state(&call))
                    .await
                    .map_err(BuildError::from_rpc)?;
                let tx = evm::transfer::build_transfer(&intent, &call, &state)?;
                (
                    PayloadEncoding::Hex,
                    evm::transfer::signing_payload(&tx),
                    Some(evm::transfer::mirror_fields(&tx)),
                )
            }
        };

        tracing::info!(
            chain = %intent.chain,
            from = %intent.from,
            to = %intent.to,
            to_username = %intent.to_username,
            amount = %intent.amount,
            token = intent.token.token.identifier(),
            "Prepared transfer"
        );

        Ok(PreparedTransfer {
            chain: intent.chain,
            encoding,
            transaction,
            from_address: intent.from,
            to_address: intent.to,
            to_username: intent.to_username,
            amount: intent.amount,
            base_units: intent.base_units.to_string(),
            token: intent.token,
            memo: intent.memo,
            evm: evm_fields,
        })
    }
}

/// Display symbol for an unlisted token: the first characters of its address.
fn short_symbol(address: &str) -> String {
    address.chars().take(6).collect()
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::test_support::*;
    use super::*;
    use crate::storage::database::test_support::temp_store;

    fn alice() -> ChainAddress {
        ChainAddress::parse(ChainFamily::Solana, ALICE).unwrap()
    }

    fn registry() -> RpcRegistry {
        RpcRegistry::new().with(Arc::new(MockRpc::new(ChainFamily::Solana)))
    }

    #[tokio::test]
    async fn resolves_username_case_insensitively() {
        let (store, _dir) = temp_store();
        register(&store, ChainFamily::Solana, BOB, "Bob");
        let rpc = registry();
        let builder = TransactionBuilder::new(&store, &rpc);

        let intent = builder
            .resolve_intent(&alice(), "BOB", "1.50", "SOL", Some(" lunch "))
            .await
            .unwrap();
        assert_eq!(intent.to, BOB);
        assert_eq!(intent.to_username, "Bob");
        assert_eq!(intent.base_units, 1_500_000_000);
        assert_eq!(intent.amount, "1.5");
        assert_eq!(intent.memo.as_deref(), Some("lunch"));
    }

    #[tokio::test]
    async fn unknown_recipient_or_missing_chain_wallet() {
        let (store, _dir) = temp_store();
        register(&store, ChainFamily::Base, BOB_EVM, "bob");
        let rpc = registry();
        let builder = TransactionBuilder::new(&store, &rpc);

        assert!(matches!(
            builder.resolve_intent(&alice(), "nobody", "1", "SOL", None).await,
            Err(BuildError::RecipientNotFound(_))
        ));
        // bob exists but has no Solana wallet
        assert!(matches!(
            builder.resolve_intent(&alice(), "bob", "1", "SOL", None).await,
            Err(BuildError::RecipientNotFound(_))
        ));
    }

    #[tokio::test]
    async fn zero_and_over_precise_amounts_are_rejected() {
        let (store, _dir) = temp_store();
        register(&store, ChainFamily::Solana, BOB, "bob");
        let rpc = registry();
        let builder = TransactionBuilder::new(&store, &rpc);

        assert!(matches!(
            builder.resolve_intent(&alice(), "bob", "0", "SOL", None).await,
            Err(BuildError::InvalidAmount(AmountError::Zero))
        ));
        assert!(matches!(
            builder.resolve_intent(&alice(), "bob", "0.0000001", "USDC", None).await,
            Err(BuildError::InvalidAmount(AmountError::TooPrecise { max: 6 }))
        ));
        assert!(matches!(
            builder.resolve_intent(&alice(), "bob", "99999999999", "SOL", None).await,
            Err(BuildError::InvalidAmount(AmountError::Overflow))
        ));
    }

    #[tokio::test]
    async fn long_memo_is_rejected() {
        let (store, _dir) = temp_store();
        register(&store, ChainFamily::Solana, BOB, "bob");
        let rpc = registry();
        let builder = TransactionBuilder::new(&store, &rpc);
        let memo = "x".repeat(MAX_MEMO_CHARS + 1);
        assert!(matches!(
            builder.resolve_intent(&alice(), "bob", "1", "SOL", Some(&memo)).await,
            Err(BuildError::InvalidMemo)
        ));
    }

    #[tokio::test]
    async fn unlisted_mint_reads_decimals_from_chain() {
        let (store, _dir) = temp_store();
        register(&store, ChainFamily::Solana, BOB, "bob");
        let rpc = registry();
        let builder = TransactionBuilder::new(&store, &rpc);

        let mint = "So11111111111111111111111111111111111111112";
        let intent = builder
            .resolve_intent(&alice(), "bob", "2", mint, None)
            .await
            .unwrap();
        assert_eq!(intent.token.decimals, 9);
        assert_eq!(intent.token.token, TokenKind::Token(mint.to_string()));
        assert_eq!(intent.base_units, 2_000_000_000);
    }

    #[tokio::test]
    async fn prepare_without_rpc_is_relay_unavailable() {
        let (store, _dir) = temp_store();
        register(&store, ChainFamily::Solana, BOB, "bob");
        let rpc = RpcRegistry::new();
        let builder = TransactionBuilder::new(&store, &rpc);
        assert!(matches!(
            builder.prepare(&alice(), "bob", "1", "SOL", None).await,
            Err(BuildError::RelayUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn prepare_solana_returns_unsigned_base64() {
        let (store, _dir) = temp_store();
        register(&store, ChainFamily::Solana, BOB, "bob");
        let rpc = registry();
        let builder = TransactionBuilder::new(&store, &rpc);

        let prepared = builder
            .prepare(&alice(), "bob", "0.25", "SOL", Some("hi"))
            .await
            .unwrap();
        assert_eq!(prepared.encoding, PayloadEncoding::Base64);
        assert_eq!(prepared.base_units, "250000000");
        assert_eq!(prepared.to_address, BOB);

        let raw = base64::engine::general_purpose::STANDARD
            .decode(&prepared.transaction)
            .unwrap();
        let tx = solana::wire::Transaction::deserialize(&raw).unwrap();
        assert_eq!(tx.fee_payer().unwrap().to_base58(), ALICE);
        assert!(tx.signatures.iter().all(|s| s.iter().all(|b| *b == 0)));
        assert_eq!(tx.message.recent_blockhash, [5u8; 32]);
    }
}
