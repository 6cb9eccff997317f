// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Solana legacy transaction wire format.
//!
//! ## Layout
//!
//! ```text
//! transaction = compact_u16(n) signature[n] message
//! message     = header(3 bytes) compact_u16(k) pubkey[k] blockhash(32)
//!               compact_u16(m) instruction[m]
//! instruction = program_index(u8) compact_u16(a) account_index[a]
//!               compact_u16(d) data[d]
//! ```
//!
//! Account keys are ordered: writable signers, read-only signers, writable
//! non-signers, read-only non-signers. The fee payer is always key 0.
//! Versioned (v0) messages are not accepted.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signature, VerifyingKey};

pub const PUBKEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

/// Prefix bit marking a versioned message.
const VERSION_PREFIX: u8 = 0x80;

/// Wire codec failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),

    #[error("invalid compact-u16 length prefix")]
    InvalidCompactU16,

    #[error("versioned transactions are not supported")]
    UnsupportedVersion,

    #[error("expected {expected} signatures, found {actual}")]
    SignatureCountMismatch { expected: usize, actual: usize },

    #[error("message references more than 256 accounts")]
    TooManyAccounts,

    #[error("account index {0} out of range")]
    AccountIndexOutOfRange(u8),

    #[error("invalid public key")]
    InvalidPubkey,

    #[error("{0} is not a required signer")]
    NotASigner(Pubkey),
}

// =============================================================================
// Primitives
// =============================================================================

/// 32-byte account address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey(pub [u8; PUBKEY_LEN]);

impl Pubkey {
    pub const fn new(bytes: [u8; PUBKEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_LEN] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Whether the bytes decode to an ed25519 curve point.
    pub fn is_on_curve(&self) -> bool {
        VerifyingKey::from_bytes(&self.0).is_ok()
    }
}

impl FromStr for Pubkey {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s.trim())
            .into_vec()
            .map_err(|_| WireError::InvalidPubkey)?;
        let array: [u8; PUBKEY_LEN] = bytes.try_into().map_err(|_| WireError::InvalidPubkey)?;
        Ok(Self(array))
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self.to_base58())
    }
}

/// Recent blockhash (base58 on the JSON-RPC side).
pub type Blockhash = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn new_readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// Uncompiled instruction with full account metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

// =============================================================================
// Message
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

/// Instruction referencing accounts by index into `Message::account_keys`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// Compile instructions into a legacy message paid for by `payer`.
    pub fn compile(
        instructions: &[Instruction],
        payer: &Pubkey,
        recent_blockhash: Blockhash,
    ) -> Result<Self, WireError> {
        // (key, signer, writable) in first-seen order, payer first
        let mut keys: Vec<(Pubkey, bool, bool)> = vec![(*payer, true, true)];
        let mut merge = |pubkey: Pubkey, signer: bool, writable: bool| {
            match keys.iter_mut().find(|(k, _, _)| *k == pubkey) {
                Some(entry) => {
                    entry.1 |= signer;
                    entry.2 |= writable;
                }
                None => keys.push((pubkey, signer, writable)),
            }
        };
        for ix in instructions {
            for meta in &ix.accounts {
                merge(meta.pubkey, meta.is_signer, meta.is_writable);
            }
            merge(ix.program_id, false, false);
        }

        let account_keys: Vec<Pubkey> = [(true, true), (true, false), (false, true), (false, false)]
            .into_iter()
            .flat_map(|(signer, writable)| partition(&keys, signer, writable))
            .collect();
        if account_keys.len() > 256 {
            return Err(WireError::TooManyAccounts);
        }

        let count = |signer: bool, writable: bool| partition(&keys, signer, writable).count() as u8;
        let header = MessageHeader {
            num_required_signatures: count(true, true) + count(true, false),
            num_readonly_signed_accounts: count(true, false),
            num_readonly_unsigned_accounts: count(false, false),
        };

        let index_of = |pubkey: &Pubkey| -> Result<u8, WireError> {
            account_keys
                .iter()
                .position(|k| k == pubkey)
                .map(|i| i as u8)
                .ok_or(WireError::InvalidPubkey)
        };
        let instructions = instructions
            .iter()
            .map(|ix| {
                Ok(CompiledInstruction {
                    program_id_index: index_of(&ix.program_id)?,
                    accounts: ix
                        .accounts
                        .iter()
                        .map(|meta| index_of(&meta.pubkey))
                        .collect::<Result<_, _>>()?,
                    data: ix.data.clone(),
                })
            })
            .collect::<Result<Vec<_>, WireError>>()?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.account_keys.first()
    }

    pub fn is_signer(&self, index: usize) -> bool {
        index < self.header.num_required_signatures as usize
    }

    pub fn is_writable(&self, index: usize) -> bool {
        let total = self.account_keys.len();
        let signers = self.header.num_required_signatures as usize;
        if index >= total {
            return false;
        }
        if index < signers {
            index < signers - self.header.num_readonly_signed_accounts as usize
        } else {
            index < total - self.header.num_readonly_unsigned_accounts as usize
        }
    }

    pub fn signer_keys(&self) -> &[Pubkey] {
        let n = (self.header.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..n]
    }

    /// Program invoked by `ix`.
    pub fn program_id(&self, ix: &CompiledInstruction) -> Result<&Pubkey, WireError> {
        self.account_keys
            .get(ix.program_id_index as usize)
            .ok_or(WireError::AccountIndexOutOfRange(ix.program_id_index))
    }

    /// The `n`-th account passed to `ix`.
    pub fn instruction_account(
        &self,
        ix: &CompiledInstruction,
        n: usize,
    ) -> Result<&Pubkey, WireError> {
        let index = *ix.accounts.get(n).ok_or(WireError::UnexpectedEof)?;
        self.account_keys
            .get(index as usize)
            .ok_or(WireError::AccountIndexOutOfRange(index))
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + 1 + self.account_keys.len() * PUBKEY_LEN + 32 + 64);
        out.push(self.header.num_required_signatures);
        out.push(self.header.num_readonly_signed_accounts);
        out.push(self.header.num_readonly_unsigned_accounts);
        write_compact_u16(&mut out, self.account_keys.len());
        for key in &self.account_keys {
            out.extend_from_slice(&key.0);
        }
        out.extend_from_slice(&self.recent_blockhash);
        write_compact_u16(&mut out, self.instructions.len());
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            write_compact_u16(&mut out, ix.accounts.len());
            out.extend_from_slice(&ix.accounts);
            write_compact_u16(&mut out, ix.data.len());
            out.extend_from_slice(&ix.data);
        }
        out
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        let first = reader.read_u8()?;
        if first & VERSION_PREFIX != 0 {
            return Err(WireError::UnsupportedVersion);
        }
        let header = MessageHeader {
            num_required_signatures: first,
            num_readonly_signed_accounts: reader.read_u8()?,
            num_readonly_unsigned_accounts: reader.read_u8()?,
        };

        let key_count = reader.read_compact_u16()?;
        let account_keys = (0..key_count)
            .map(|_| reader.read_array::<PUBKEY_LEN>().map(Pubkey))
            .collect::<Result<Vec<_>, _>>()?;
        let recent_blockhash = reader.read_array::<32>()?;

        let ix_count = reader.read_compact_u16()?;
        let mut instructions = Vec::with_capacity(ix_count);
        for _ in 0..ix_count {
            let program_id_index = reader.read_u8()?;
            let account_count = reader.read_compact_u16()?;
            let accounts = reader.read_bytes(account_count)?.to_vec();
            let data_len = reader.read_compact_u16()?;
            let data = reader.read_bytes(data_len)?.to_vec();
            for index in std::iter::once(program_id_index).chain(accounts.iter().copied()) {
                if index as usize >= account_keys.len() {
                    return Err(WireError::AccountIndexOutOfRange(index));
                }
            }
            instructions.push(CompiledInstruction {
                program_id_index,
                accounts,
                data,
            });
        }

        if header.num_required_signatures as usize
            + header.num_readonly_unsigned_accounts as usize
            > account_keys.len()
            || header.num_readonly_signed_accounts > header.num_required_signatures
        {
            return Err(WireError::AccountIndexOutOfRange(header.num_required_signatures));
        }

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(bytes);
        let message = Self::read(&mut reader)?;
        reader.finish()?;
        Ok(message)
    }
}

fn partition(
    keys: &[(Pubkey, bool, bool)],
    signer: bool,
    writable: bool,
) -> impl Iterator<Item = Pubkey> + '_ {
    keys.iter()
        .filter(move |(_, s, w)| *s == signer && *w == writable)
        .map(|(k, _, _)| *k)
}

// =============================================================================
// Transaction
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signatures: Vec<[u8; SIGNATURE_LEN]>,
    pub message: Message,
}

impl Transaction {
    /// Wrap a message with zeroed signature slots for the wallet to fill.
    pub fn new_unsigned(message: Message) -> Self {
        let slots = message.header.num_required_signatures as usize;
        Self {
            signatures: vec![[0u8; SIGNATURE_LEN]; slots],
            message,
        }
    }

    pub fn message_bytes(&self) -> Vec<u8> {
        self.message.serialize()
    }

    /// Put `signature` in the slot belonging to `signer`.
    pub fn add_signature(
        &mut self,
        signer: &Pubkey,
        signature: [u8; SIGNATURE_LEN],
    ) -> Result<(), WireError> {
        let index = self
            .message
            .signer_keys()
            .iter()
            .position(|k| k == signer)
            .ok_or(WireError::NotASigner(*signer))?;
        self.signatures[index] = signature;
        Ok(())
    }

    /// Check every required signature against its signer key.
    pub fn verify_signatures(&self) -> bool {
        let message = self.message_bytes();
        let signers = self.message.signer_keys();
        if signers.len() != self.signatures.len() {
            return false;
        }
        signers.iter().zip(&self.signatures).all(|(key, sig)| {
            let Ok(verifying_key) = VerifyingKey::from_bytes(&key.0) else {
                return false;
            };
            verifying_key
                .verify_strict(&message, &Signature::from_bytes(sig))
                .is_ok()
        })
    }

    /// Transaction id: base58 of the fee payer's signature.
    pub fn id(&self) -> Option<String> {
        self.signatures
            .first()
            .map(|sig| bs58::encode(sig).into_string())
    }

    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.message.fee_payer()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_compact_u16(&mut out, self.signatures.len());
        for sig in &self.signatures {
            out.extend_from_slice(sig);
        }
        out.extend_from_slice(&self.message.serialize());
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(bytes);
        let count = reader.read_compact_u16()?;
        let signatures = (0..count)
            .map(|_| reader.read_array::<SIGNATURE_LEN>())
            .collect::<Result<Vec<_>, _>>()?;
        let message = Message::read(&mut reader)?;
        reader.finish()?;

        let expected = message.header.num_required_signatures as usize;
        if signatures.len() != expected {
            return Err(WireError::SignatureCountMismatch {
                expected,
                actual: signatures.len(),
            });
        }
        Ok(Self {
            signatures,
            message,
        })
    }
}

// =============================================================================
// Encoding helpers
// =============================================================================

/// Append a compact-u16 (1–3 byte LEB128) length.
pub fn write_compact_u16(out: &mut Vec<u8>, value: usize) {
    let mut rem = value as u16;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            break;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, WireError> {
        let byte = *self.bytes.get(self.pos).ok_or(WireError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(len).ok_or(WireError::UnexpectedEof)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(WireError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let slice = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_compact_u16(&mut self) -> Result<usize, WireError> {
        let mut value: usize = 0;
        for i in 0..3 {
            let byte = self.read_u8()?;
            // alias encodings (trailing zero group) and values above u16::MAX
            if (i > 0 && byte == 0) || (i == 2 && byte > 0x03) {
                return Err(WireError::InvalidCompactU16);
            }
            value |= ((byte & 0x7f) as usize) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(WireError::InvalidCompactU16)
    }

    fn finish(&self) -> Result<(), WireError> {
        match self.bytes.len() - self.pos {
            0 => Ok(()),
            n => Err(WireError::TrailingBytes(n)),
        }
    }
}
