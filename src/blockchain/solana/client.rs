// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Solana JSON-RPC client.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::blockchain::rpc::{ChainRpc, ChainState, OnChainStatus, RpcError, UnsignedCall};
use crate::blockchain::types::ChainFamily;

/// Commitment used for blockhashes and confirmation.
const COMMITMENT: &str = "confirmed";

/// Preflight error the node reports in `error.data.err` for a transaction it
/// has already seen.
const ALREADY_PROCESSED: &str = "AlreadyProcessed";
const ALREADY_PROCESSED_MESSAGE: &str = "already been processed";

#[derive(Debug, Clone)]
pub struct SolanaRpcClient {
    url: String,
    http: Client,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcErrorObject {
    fn is_already_processed(&self) -> bool {
        let data_err = self
            .data
            .as_ref()
            .and_then(|data| data.get("err"))
            .and_then(Value::as_str);
        data_err == Some(ALREADY_PROCESSED) || self.message.contains(ALREADY_PROCESSED_MESSAGE)
    }

    fn into_error(self, method: &str) -> RpcError {
        RpcError::Rejected(format!("{method} failed ({}): {}", self.code, self.message))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    err: Option<Value>,
    confirmation_status: Option<String>,
}

impl SolanaRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let parsed = self.request(method, params).await?;
        if let Some(err) = parsed.error {
            return Err(err.into_error(method));
        }
        parsed
            .result
            .ok_or_else(|| RpcError::InvalidResponse(format!("{method} returned no result")))
    }

    /// Send one JSON-RPC request; node-level errors are left in the response.
    async fn request(&self, method: &str, params: Value) -> Result<RpcResponse, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::from_transport(method, &e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::from_status(method, status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| RpcError::InvalidResponse(format!("{method} invalid JSON: {e}")))
    }

    pub async fn latest_blockhash(&self) -> Result<[u8; 32], RpcError> {
        let result = self
            .call("getLatestBlockhash", json!([{ "commitment": COMMITMENT }]))
            .await?;
        let encoded = result
            .pointer("/value/blockhash")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::InvalidResponse("missing blockhash".to_string()))?;
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| RpcError::InvalidResponse(format!("blockhash not base58: {e}")))?;
        bytes
            .try_into()
            .map_err(|_| RpcError::InvalidResponse("blockhash is not 32 bytes".to_string()))
    }
}

#[async_trait]
impl ChainRpc for SolanaRpcClient {
    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    async fn token_decimals(&self, token: &str) -> Result<u8, RpcError> {
        let result = self.call("getTokenSupply", json!([token])).await?;
        result
            .pointer("/value/decimals")
            .and_then(Value::as_u64)
            .and_then(|d| u8::try_from(d).ok())
            .ok_or_else(|| RpcError::InvalidResponse("missing token decimals".to_string()))
    }

    async fn chain_state(&self, _call: &UnsignedCall) -> Result<ChainState, RpcError> {
        Ok(ChainState::Solana {
            recent_blockhash: self.latest_blockhash().await?,
        })
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, RpcError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        let sent = self
            .request(
                "sendTransaction",
                json!([encoded, {
                    "encoding": "base64",
                    "preflightCommitment": COMMITMENT,
                }]),
            )
            .await?;

        match sent.error {
            // Retried broadcast of a transaction that already landed.
            Some(err) if err.is_already_processed() => first_signature(raw),
            Some(err) => Err(err.into_error("sendTransaction")),
            None => sent
                .result
                .as_ref()
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| RpcError::InvalidResponse("signature is not a string".to_string())),
        }
    }

    async fn transaction_status(&self, signature: &str) -> Result<OnChainStatus, RpcError> {
        let result = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;
        let entry = result
            .pointer("/value/0")
            .cloned()
            .unwrap_or(Value::Null);
        if entry.is_null() {
            return Ok(OnChainStatus::Unknown);
        }
        let status: SignatureStatus = serde_json::from_value(entry)
            .map_err(|e| RpcError::InvalidResponse(format!("signature status: {e}")))?;
        Ok(map_signature_status(&status))
    }
}

fn map_signature_status(status: &SignatureStatus) -> OnChainStatus {
    if status.err.as_ref().is_some_and(|e| !e.is_null()) {
        return OnChainStatus::Failed;
    }
    match status.confirmation_status.as_deref() {
        Some("confirmed") | Some("finalized") => OnChainStatus::Confirmed,
        _ => OnChainStatus::Pending,
    }
}

fn first_signature(raw: &[u8]) -> Result<String, RpcError> {
    super::wire::Transaction::deserialize(raw)
        .ok()
        .and_then(|tx| tx.id())
        .ok_or_else(|| RpcError::InvalidResponse("cannot recover signature".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(value: Value) -> OnChainStatus {
        map_signature_status(&serde_json::from_value(value).unwrap())
    }

    fn error_object(body: Value) -> RpcErrorObject {
        let response: RpcResponse = serde_json::from_value(body).unwrap();
        response.error.unwrap()
    }

    #[test]
    fn already_processed_is_read_from_error_data() {
        let err = error_object(json!({
            "jsonrpc": "2.0",
            "error": {
                "code": -32002,
                "message": "Transaction simulation failed: This transaction has already been processed",
                "data": {
                    "accounts": null,
                    "err": "AlreadyProcessed",
                    "innerInstructions": null,
                    "logs": [],
                    "replacementBlockhash": null,
                    "returnData": null,
                    "unitsConsumed": 0
                }
            },
            "id": 1
        }));
        assert!(err.is_already_processed());

        let data_only = error_object(json!({
            "jsonrpc": "2.0",
            "error": {"code": -32002, "message": "Transaction simulation failed", "data": {"err": "AlreadyProcessed"}},
            "id": 1
        }));
        assert!(data_only.is_already_processed());
    }

    #[test]
    fn other_preflight_failures_are_rejections() {
        let err = error_object(json!({
            "jsonrpc": "2.0",
            "error": {
                "code": -32002,
                "message": "Transaction simulation failed: Blockhash not found",
                "data": {"err": "BlockhashNotFound", "logs": []}
            },
            "id": 1
        }));
        assert!(!err.is_already_processed());
        assert!(matches!(err.into_error("sendTransaction"), RpcError::Rejected(_)));

        let no_data = error_object(json!({
            "jsonrpc": "2.0",
            "error": {"code": -32602, "message": "invalid params"},
            "id": 1
        }));
        assert!(!no_data.is_already_processed());
    }

    #[test]
    fn signature_status_mapping() {
        assert_eq!(
            status(json!({"err": null, "confirmationStatus": "finalized", "slot": 1})),
            OnChainStatus::Confirmed
        );
        assert_eq!(
            status(json!({"err": null, "confirmationStatus": "processed"})),
            OnChainStatus::Pending
        );
        assert_eq!(
            status(json!({"err": {"InstructionError": [0, "Custom"]}, "confirmationStatus": "confirmed"})),
            OnChainStatus::Failed
        );
    }
}
