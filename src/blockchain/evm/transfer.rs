// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EIP-1559 transfer assembly and re-validation.
//!
//! Native transfers carry the memo as calldata. ERC-20 transfers are a bare
//! `transfer(to, amount)` call; their memo lives only in the ledger.

use std::str::FromStr;

use alloy::{
    consensus::{SignableTransaction, TxEip1559, TxEnvelope},
    eips::eip2718::Decodable2718,
    primitives::{Address, Bytes, TxKind, U256},
    sol_types::SolCall,
};

use super::erc20::IERC20;
use crate::blockchain::builder::{BuildError, EvmTransactionFields, TransferIntent};
use crate::blockchain::relay::SubmitError;
use crate::blockchain::rpc::{ChainState, UnsignedCall};
use crate::blockchain::types::TokenKind;

fn address(raw: &str) -> Result<Address, BuildError> {
    Address::from_str(raw).map_err(|_| BuildError::InvalidAddress(raw.to_string()))
}

/// The call a transfer makes: target, value and calldata.
pub fn transfer_call(intent: &TransferIntent) -> Result<UnsignedCall, BuildError> {
    match &intent.token.token {
        TokenKind::Native => Ok(UnsignedCall {
            from: intent.from.clone(),
            to: intent.to.clone(),
            value: intent.base_units,
            data: intent
                .memo
                .as_deref()
                .map(|m| m.as_bytes().to_vec())
                .unwrap_or_default(),
        }),
        TokenKind::Token(contract) => {
            let call = IERC20::transferCall {
                to: address(&intent.to)?,
                amount: U256::from(intent.base_units),
            };
            Ok(UnsignedCall {
                from: intent.from.clone(),
                to: contract.clone(),
                value: 0,
                data: call.abi_encode(),
            })
        }
    }
}

/// Assemble the unsigned EIP-1559 transaction.
pub fn build_transfer(
    intent: &TransferIntent,
    call: &UnsignedCall,
    state: &ChainState,
) -> Result<TxEip1559, BuildError> {
    let ChainState::Evm {
        chain_id,
        nonce,
        gas_limit,
        max_fee_per_gas,
        max_priority_fee_per_gas,
    } = *state
    else {
        return Err(BuildError::RelayUnavailable(
            "unexpected chain state for EVM".to_string(),
        ));
    };
    if let Some(expected) = intent.chain.capabilities().chain_id {
        if expected != chain_id {
            return Err(BuildError::RelayUnavailable(format!(
                "RPC endpoint for {} reports chain id {chain_id}",
                intent.chain
            )));
        }
    }

    Ok(TxEip1559 {
        chain_id,
        nonce,
        gas_limit,
        max_fee_per_gas,
        max_priority_fee_per_gas,
        to: TxKind::Call(address(&call.to)?),
        value: U256::from(call.value),
        input: Bytes::from(call.data.clone()),
        ..Default::default()
    })
}

/// Hex of the EIP-2718 signing payload (`0x02 || rlp(fields)`).
pub fn signing_payload(tx: &TxEip1559) -> String {
    format!("0x{}", alloy::hex::encode(tx.encoded_for_signing()))
}

pub fn mirror_fields(tx: &TxEip1559) -> EvmTransactionFields {
    let to = match tx.to {
        TxKind::Call(address) => address.to_string().to_lowercase(),
        TxKind::Create => String::new(),
    };
    EvmTransactionFields {
        chain_id: tx.chain_id,
        nonce: tx.nonce,
        gas_limit: tx.gas_limit,
        max_fee_per_gas: tx.max_fee_per_gas.to_string(),
        max_priority_fee_per_gas: tx.max_priority_fee_per_gas.to_string(),
        to,
        value: tx.value.to_string(),
        data: format!("0x{}", alloy::hex::encode(&tx.input)),
    }
}

/// A signed transfer that matched its intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedTransfer {
    pub hash: String,
    pub nonce: u64,
}

/// Decode a signed EIP-2718 envelope and check it against `intent`.
pub fn check_transfer(raw: &[u8], intent: &TransferIntent) -> Result<CheckedTransfer, SubmitError> {
    let mismatch = |reason: &str| SubmitError::TransactionMismatch(reason.to_string());
    let malformed = |reason: String| SubmitError::MalformedTransaction(reason);

    let envelope = TxEnvelope::decode_2718(&mut &raw[..])
        .map_err(|e| malformed(format!("not an EIP-2718 transaction: {e}")))?;
    let TxEnvelope::Eip1559(signed) = envelope else {
        return Err(mismatch("expected an EIP-1559 transaction"));
    };
    let tx = signed.tx();

    let signer = signed
        .signature()
        .recover_address_from_prehash(&tx.signature_hash())
        .map_err(|e| malformed(format!("signature recovery failed: {e}")))?;
    let sender = Address::from_str(&intent.from)
        .map_err(|_| malformed("invalid sender".to_string()))?;
    let recipient = Address::from_str(&intent.to)
        .map_err(|_| malformed("invalid recipient".to_string()))?;
    if signer != sender {
        return Err(mismatch("signer is not the session wallet"));
    }

    if let Some(expected) = intent.chain.capabilities().chain_id {
        if tx.chain_id != expected {
            return Err(mismatch("chain id does not match"));
        }
    }

    let expected = transfer_call(intent).map_err(|e| malformed(e.to_string()))?;
    let expected_to =
        Address::from_str(&expected.to).map_err(|_| malformed("invalid recipient".to_string()))?;
    if tx.to != TxKind::Call(expected_to) {
        return Err(match intent.token.token {
            TokenKind::Native => mismatch("recipient does not match"),
            TokenKind::Token(_) => mismatch("token does not match"),
        });
    }
    if tx.value != U256::from(expected.value) {
        return Err(mismatch("amount does not match"));
    }

    match &intent.token.token {
        TokenKind::Native => {
            if tx.input.as_ref() != expected.data.as_slice() {
                return Err(mismatch("memo does not match"));
            }
        }
        TokenKind::Token(_) => {
            let decoded = IERC20::transferCall::abi_decode(&tx.input)
                .map_err(|_| mismatch("calldata is not an ERC-20 transfer"))?;
            if decoded.to != recipient {
                return Err(mismatch("recipient does not match"));
            }
            if decoded.amount != U256::from(intent.base_units) {
                return Err(mismatch("amount does not match"));
            }
        }
    }

    Ok(CheckedTransfer {
        hash: format!("{:?}", signed.hash()),
        nonce: tx.nonce,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use alloy::{
        consensus::{SignableTransaction, TxEip1559, TxEnvelope},
        eips::eip2718::Encodable2718,
        signers::{local::PrivateKeySigner, SignerSync},
    };

    /// Hardhat account #0
    pub const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    pub fn signer() -> PrivateKeySigner {
        TEST_KEY.parse().unwrap()
    }

    /// Sign as a wallet would and return the raw EIP-2718 bytes.
    pub fn sign(tx: TxEip1559, signer: &PrivateKeySigner) -> Vec<u8> {
        let signature = signer.sign_hash_sync(&tx.signature_hash()).unwrap();
        TxEnvelope::Eip1559(tx.into_signed(signature)).encoded_2718()
    }
}
