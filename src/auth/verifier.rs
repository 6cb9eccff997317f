// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Signature Verification
//!
//! Checks that a message was signed by the holder of a wallet address.
//!
//! | Family | Scheme | Signature bytes |
//! |--------|--------|-----------------|
//! | Solana | ed25519 over the raw UTF-8 message | 64 |
//! | EVM | EIP-191 `personal_sign`, Keccak-256, secp256k1 recovery | 65 (`r ‖ s ‖ v`) |
//!
//! Verification is pure: no I/O and no panics. Any malformed input
//! yields `false`.

use alloy::primitives::keccak256;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::blockchain::{ChainFamily, SignatureScheme};

const EIP191_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Whether `signature` over `message` was produced by `claimed_address`.
pub fn verify(message: &str, signature: &[u8], claimed_address: &str, chain: ChainFamily) -> bool {
    match chain.capabilities().scheme {
        SignatureScheme::Ed25519 => verify_ed25519(message.as_bytes(), signature, claimed_address),
        SignatureScheme::Eip191Secp256k1 => {
            verify_personal_sign(message.as_bytes(), signature, claimed_address)
        }
    }
}

/// Decode a signature as wallets send it.
///
/// Solana wallets return base58 (Phantom) or base64; EVM wallets return
/// hex with or without `0x`.
pub fn decode_signature(chain: ChainFamily, encoded: &str) -> Option<Vec<u8>> {
    let encoded = encoded.trim();
    match chain.capabilities().scheme {
        SignatureScheme::Ed25519 => bs58::decode(encoded)
            .into_vec()
            .ok()
            .filter(|bytes| bytes.len() == 64)
            .or_else(|| STANDARD.decode(encoded).ok().filter(|b| b.len() == 64)),
        SignatureScheme::Eip191Secp256k1 => {
            let hex = encoded.strip_prefix("0x").unwrap_or(encoded);
            alloy::hex::decode(hex).ok().filter(|bytes| bytes.len() == 65)
        }
    }
}

fn verify_ed25519(message: &[u8], signature: &[u8], claimed_address: &str) -> bool {
    use ed25519_dalek::{Signature, VerifyingKey};

    let Ok(key_bytes) = bs58::decode(claimed_address.trim()).into_vec() else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    key.verify_strict(message, &Signature::from_bytes(&sig_bytes))
        .is_ok()
}

/// Keccak-256 of the EIP-191 prefixed message.
fn personal_sign_hash(message: &[u8]) -> [u8; 32] {
    let mut prefixed = format!("{EIP191_PREFIX}{}", message.len()).into_bytes();
    prefixed.extend_from_slice(message);
    keccak256(&prefixed).0
}

fn verify_personal_sign(message: &[u8], signature: &[u8], claimed_address: &str) -> bool {
    recover_signer(message, signature)
        .map(|recovered| {
            let claimed = claimed_address.trim();
            let claimed = claimed
                .strip_prefix("0x")
                .or_else(|| claimed.strip_prefix("0X"))
                .unwrap_or(claimed);
            claimed.eq_ignore_ascii_case(&alloy::hex::encode(recovered))
        })
        .unwrap_or(false)
}

/// Recover the 20-byte signer address of a `personal_sign` signature.
fn recover_signer(message: &[u8], signature: &[u8]) -> Option<[u8; 20]> {
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    if signature.len() != 65 {
        return None;
    }
    let mut parity = match signature[64] {
        0 | 1 => signature[64],
        27 | 28 => signature[64] - 27,
        _ => return None,
    };
    let mut sig = Signature::from_slice(&signature[..64]).ok()?;
    // Negating s flips the parity of R's y coordinate.
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        parity ^= 1;
    }

    let recovery_id = RecoveryId::from_byte(parity)?;
    let key =
        VerifyingKey::recover_from_prehash(&personal_sign_hash(message), &sig, recovery_id).ok()?;
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Some(address)
}
