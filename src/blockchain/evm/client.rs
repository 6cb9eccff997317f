// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM JSON-RPC client (Ethereum, Polygon, Arbitrum, Optimism, Base, BSC).

use std::future::IntoFuture;
use std::str::FromStr;
use std::time::Duration;

use alloy::{
    network::Ethereum,
    primitives::{keccak256, Address, TxHash, U256},
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::types::TransactionRequest,
    transports::TransportError,
};
use async_trait::async_trait;

use super::erc20::Erc20Contract;
use crate::blockchain::rpc::{ChainRpc, ChainState, OnChainStatus, RpcError, UnsignedCall};
use crate::blockchain::types::ChainFamily;

/// HTTP provider type (with all fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// Fallback when the latest block carries no base fee.
const DEFAULT_BASE_FEE: u128 = 25_000_000_000; // 25 gwei

/// Tip offered on every transfer.
const PRIORITY_FEE: u128 = 1_500_000_000; // 1.5 gwei

/// Node error for a transaction already in its mempool.
const ALREADY_KNOWN: &str = "already known";

/// Classify an alloy transport error.
///
/// `sent` marks requests that may have had an effect (broadcasts): a
/// transport failure there is reported as `Timeout`, not `Unavailable`.
pub(crate) fn classify(context: &str, err: TransportError, sent: bool) -> RpcError {
    if let Some(payload) = err.as_error_resp() {
        return RpcError::Rejected(format!("{context}: {}", payload.message));
    }
    if err.is_transport_error() {
        return if sent {
            RpcError::Timeout(format!("{context}: {err}"))
        } else {
            RpcError::Unavailable(format!("{context}: {err}"))
        };
    }
    RpcError::InvalidResponse(format!("{context}: {err}"))
}

fn parse_address(raw: &str) -> Result<Address, RpcError> {
    Address::from_str(raw).map_err(|e| RpcError::Rejected(format!("invalid address {raw}: {e}")))
}

/// Client for one EVM chain family.
pub struct EvmRpcClient {
    family: ChainFamily,
    provider: HttpProvider,
    timeout: Duration,
}

impl EvmRpcClient {
    pub fn new(family: ChainFamily, rpc_url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| RpcError::Unavailable(format!("invalid RPC URL: {e}")))?;

        let provider = ProviderBuilder::new().connect_http(url);

        Ok(Self {
            family,
            provider,
            timeout,
        })
    }

    /// Run one RPC call under the client timeout.
    async fn timed<T, F>(&self, context: &str, call: F, sent: bool) -> Result<T, RpcError>
    where
        F: IntoFuture<Output = Result<T, TransportError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(context, e, sent)),
            Err(_) => Err(RpcError::Timeout(format!(
                "{context}: no response within {:?}",
                self.timeout
            ))),
        }
    }

    /// Current fees: max fee = 2 * base fee + tip (allows for base fee increase).
    async fn gas_prices(&self) -> Result<(u128, u128), RpcError> {
        let block = self
            .timed(
                "get_block",
                self.provider
                    .get_block_by_number(alloy::eips::BlockNumberOrTag::Latest),
                false,
            )
            .await?
            .ok_or_else(|| RpcError::InvalidResponse("No latest block".to_string()))?;

        let base_fee: u128 = block
            .header
            .base_fee_per_gas
            .map(|f| f as u128)
            .unwrap_or(DEFAULT_BASE_FEE);

        let max_fee = base_fee.saturating_mul(2).saturating_add(PRIORITY_FEE);
        Ok((max_fee, PRIORITY_FEE))
    }
}

#[async_trait]
impl ChainRpc for EvmRpcClient {
    fn family(&self) -> ChainFamily {
        self.family
    }

    async fn token_decimals(&self, token: &str) -> Result<u8, RpcError> {
        let contract = Erc20Contract::new(&self.provider, parse_address(token)?);
        match tokio::time::timeout(self.timeout, contract.decimals()).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout("decimals: no response".to_string())),
        }
    }

    async fn chain_state(&self, call: &UnsignedCall) -> Result<ChainState, RpcError> {
        let from = parse_address(&call.from)?;
        let to = parse_address(&call.to)?;

        let chain_id = self
            .timed("get_chain_id", self.provider.get_chain_id(), false)
            .await?;
        let nonce = self
            .timed(
                "get_transaction_count",
                self.provider.get_transaction_count(from).pending(),
                false,
            )
            .await?;

        let request = TransactionRequest::default()
            .from(from)
            .to(to)
            .value(U256::from(call.value))
            .input(call.data.clone().into());
        let gas_limit = self
            .timed("estimate_gas", self.provider.estimate_gas(request), false)
            .await?;

        let (max_fee_per_gas, max_priority_fee_per_gas) = self.gas_prices().await?;

        Ok(ChainState::Evm {
            chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas,
            max_priority_fee_per_gas,
        })
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, RpcError> {
        let sent = self
            .timed(
                "send_raw_transaction",
                self.provider.send_raw_transaction(raw),
                true,
            )
            .await;
        match sent {
            Ok(pending) => Ok(format!("{:?}", pending.tx_hash())),
            Err(RpcError::Rejected(message)) if message.contains(ALREADY_KNOWN) => {
                Ok(format!("{:?}", keccak256(raw)))
            }
            Err(e) => Err(e),
        }
    }

    async fn transaction_status(&self, signature: &str) -> Result<OnChainStatus, RpcError> {
        let hash = TxHash::from_str(signature)
            .map_err(|e| RpcError::Rejected(format!("Invalid tx hash: {e}")))?;

        let receipt = self
            .timed(
                "get_transaction_receipt",
                self.provider.get_transaction_receipt(hash),
                false,
            )
            .await?;
        if let Some(receipt) = receipt {
            return Ok(if receipt.status() {
                OnChainStatus::Confirmed
            } else {
                OnChainStatus::Failed
            });
        }

        let seen = self
            .timed(
                "get_transaction_by_hash",
                self.provider.get_transaction_by_hash(hash),
                false,
            )
            .await?;
        Ok(if seen.is_some() {
            OnChainStatus::Pending
        } else {
            OnChainStatus::Unknown
        })
    }
    async fn mined_nonce(&self, address: &str) -> Result<Option<u64>, RpcError> {
        let from = parse_address(address)?;
        let count = self
            .timed(
                "get_transaction_count",
                self.provider.get_transaction_count(from).latest(),
                false,
            )
            .await?;
        Ok(Some(count))
    }
}
