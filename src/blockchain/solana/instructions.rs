// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Instruction builders and decoders for the programs a transfer touches.
//!
//! Only the handful of instructions a wallet-to-wallet transfer needs are
//! supported: System `Transfer`, SPL Token `TransferChecked`, idempotent
//! associated-token-account creation, Memo v2 and Compute Budget.

use sha2::{Digest, Sha256};

use super::wire::{AccountMeta, CompiledInstruction, Instruction, Message, Pubkey, WireError};

pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::new([0u8; 32]);

/// `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: Pubkey = Pubkey::new([
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133, 237,
    95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);

/// `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = Pubkey::new([
    140, 151, 37, 143, 78, 36, 137, 241, 187, 61, 16, 41, 20, 142, 13, 131, 11, 90, 19, 153, 218,
    255, 16, 132, 4, 142, 123, 216, 219, 233, 248, 89,
]);

/// `MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr`
pub const MEMO_PROGRAM_ID: Pubkey = Pubkey::new([
    5, 74, 83, 90, 153, 41, 33, 6, 77, 36, 232, 113, 96, 218, 56, 124, 124, 53, 181, 221, 188, 146,
    187, 129, 228, 31, 168, 64, 65, 5, 68, 141,
]);

/// `ComputeBudget111111111111111111111111111111`
pub const COMPUTE_BUDGET_PROGRAM_ID: Pubkey = Pubkey::new([
    3, 6, 70, 111, 229, 33, 23, 50, 255, 236, 173, 186, 114, 195, 155, 231, 188, 140, 229, 187, 197,
    247, 18, 107, 44, 67, 155, 58, 64, 0, 0, 0,
]);

const SYSTEM_TRANSFER_TAG: u32 = 2;
const TOKEN_TRANSFER_CHECKED_TAG: u8 = 12;
const ATA_CREATE_IDEMPOTENT_TAG: u8 = 1;
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

// =============================================================================
// Builders
// =============================================================================

/// System program lamport transfer.
pub fn system_transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER_TAG.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data,
    }
}

/// Memo v2 signed by `signer`.
pub fn memo(signer: &Pubkey, text: &str) -> Instruction {
    Instruction {
        program_id: MEMO_PROGRAM_ID,
        accounts: vec![AccountMeta::new_readonly(*signer, true)],
        data: text.as_bytes().to_vec(),
    }
}

/// Create `owner`'s token account for `mint` unless it already exists.
pub fn create_associated_token_account_idempotent(
    payer: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
) -> Instruction {
    let ata = get_associated_token_address(owner, mint);
    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(ata, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: vec![ATA_CREATE_IDEMPOTENT_TAG],
    }
}

/// SPL Token `TransferChecked` between two token accounts.
pub fn transfer_checked(
    source: &Pubkey,
    mint: &Pubkey,
    destination: &Pubkey,
    owner: &Pubkey,
    amount: u64,
    decimals: u8,
) -> Instruction {
    let mut data = Vec::with_capacity(10);
    data.push(TOKEN_TRANSFER_CHECKED_TAG);
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(decimals);
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*source, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(*destination, false),
            AccountMeta::new_readonly(*owner, true),
        ],
        data,
    }
}

// =============================================================================
// Program-derived addresses
// =============================================================================

/// Hash seeds into an address that must not lie on the ed25519 curve.
pub fn create_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<Pubkey> {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    let candidate = Pubkey::new(hasher.finalize().into());
    (!candidate.is_on_curve()).then_some(candidate)
}

/// Search bump seeds from 255 down for the first off-curve address.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<(Pubkey, u8)> {
    (0..=u8::MAX).rev().find_map(|bump| {
        let bump_seed = [bump];
        let mut with_bump: Vec<&[u8]> = seeds.to_vec();
        with_bump.push(&bump_seed);
        create_program_address(&with_bump, program_id).map(|address| (address, bump))
    })
}

/// Associated token account of `owner` for `mint`.
pub fn get_associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    find_program_address(
        &[owner.as_bytes(), TOKEN_PROGRAM_ID.as_bytes(), mint.as_bytes()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    // A bump is found for all but ~2^-256 of inputs.
    .map(|(address, _)| address)
    .unwrap_or_default()
}

// =============================================================================
// Decoding
// =============================================================================

/// A compiled instruction interpreted against its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInstruction {
    SystemTransfer {
        from: Pubkey,
        to: Pubkey,
        lamports: u64,
    },
    TransferChecked {
        source: Pubkey,
        mint: Pubkey,
        destination: Pubkey,
        owner: Pubkey,
        amount: u64,
        decimals: u8,
    },
    CreateAssociatedTokenAccount {
        payer: Pubkey,
        account: Pubkey,
        owner: Pubkey,
        mint: Pubkey,
    },
    Memo(String),
    ComputeBudget,
    /// Anything else, including malformed data for a known program.
    Other(Pubkey),
}

impl ParsedInstruction {
    /// Moves value (as opposed to setup or annotation).
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            ParsedInstruction::SystemTransfer { .. } | ParsedInstruction::TransferChecked { .. }
        )
    }
}

pub fn parse_instruction(
    message: &Message,
    ix: &CompiledInstruction,
) -> Result<ParsedInstruction, WireError> {
    let program = *message.program_id(ix)?;
    let account = |n: usize| message.instruction_account(ix, n).copied();

    let parsed = if program == SYSTEM_PROGRAM_ID {
        match ix.data.as_slice() {
            [2, 0, 0, 0, rest @ ..] if rest.len() == 8 && ix.accounts.len() == 2 => {
                ParsedInstruction::SystemTransfer {
                    from: account(0)?,
                    to: account(1)?,
                    lamports: u64::from_le_bytes(le_array(rest)),
                }
            }
            _ => ParsedInstruction::Other(program),
        }
    } else if program == TOKEN_PROGRAM_ID {
        match ix.data.as_slice() {
            [TOKEN_TRANSFER_CHECKED_TAG, rest @ ..] if rest.len() == 9 && ix.accounts.len() == 4 => {
                ParsedInstruction::TransferChecked {
                    source: account(0)?,
                    mint: account(1)?,
                    destination: account(2)?,
                    owner: account(3)?,
                    amount: u64::from_le_bytes(le_array(&rest[..8])),
                    decimals: rest[8],
                }
            }
            _ => ParsedInstruction::Other(program),
        }
    } else if program == ASSOCIATED_TOKEN_PROGRAM_ID {
        match ix.data.as_slice() {
            // Create (empty data) or CreateIdempotent
            [] | [0] | [ATA_CREATE_IDEMPOTENT_TAG] if ix.accounts.len() >= 4 => {
                ParsedInstruction::CreateAssociatedTokenAccount {
                    payer: account(0)?,
                    account: account(1)?,
                    owner: account(2)?,
                    mint: account(3)?,
                }
            }
            _ => ParsedInstruction::Other(program),
        }
    } else if program == MEMO_PROGRAM_ID {
        match std::str::from_utf8(&ix.data) {
            Ok(text) => ParsedInstruction::Memo(text.to_string()),
            Err(_) => ParsedInstruction::Other(program),
        }
    } else if program == COMPUTE_BUDGET_PROGRAM_ID {
        ParsedInstruction::ComputeBudget
    } else {
        ParsedInstruction::Other(program)
    };
    Ok(parsed)
}

fn le_array(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[..8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk(s: &str) -> Pubkey {
        s.parse().unwrap()
    }

    #[test]
    fn program_ids_match_their_addresses() {
        assert_eq!(SYSTEM_PROGRAM_ID, pk("11111111111111111111111111111111"));
        assert_eq!(TOKEN_PROGRAM_ID, pk("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"));
        assert_eq!(
            ASSOCIATED_TOKEN_PROGRAM_ID,
            pk("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL")
        );
        assert_eq!(MEMO_PROGRAM_ID, pk("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr"));
        assert_eq!(
            COMPUTE_BUDGET_PROGRAM_ID,
            pk("ComputeBudget111111111111111111111111111111")
        );
    }

    #[test]
    fn associated_token_address_derivation() {
        let owner = pk("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM");
        let usdc = pk("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
        let (ata, bump) = find_program_address(
            &[owner.as_bytes(), TOKEN_PROGRAM_ID.as_bytes(), usdc.as_bytes()],
            &ASSOCIATED_TOKEN_PROGRAM_ID,
        )
        .unwrap();
        assert_eq!(ata, pk("FGETo8T8wMcN2wCjav8VK6eh3dLk63evNDPxzLSJra8B"));
        assert_eq!(bump, 254);
        assert_eq!(get_associated_token_address(&owner, &usdc), ata);
        assert!(!ata.is_on_curve());
    }

    #[test]
    fn system_transfer_layout() {
        let from = Pubkey::new([1u8; 32]);
        let to = Pubkey::new([2u8; 32]);
        let ix = system_transfer(&from, &to, 1_500_000_000);
        assert_eq!(&ix.data[..4], &[2, 0, 0, 0]);
        assert_eq!(&ix.data[4..], &1_500_000_000u64.to_le_bytes());

        let message = Message::compile(&[ix], &from, [0u8; 32]).unwrap();
        let parsed = parse_instruction(&message, &message.instructions[0]).unwrap();
        assert_eq!(
            parsed,
            ParsedInstruction::SystemTransfer {
                from,
                to,
                lamports: 1_500_000_000
            }
        );
        assert!(parsed.is_transfer());
    }

    #[test]
    fn spl_transfer_parses_back() {
        let owner = Pubkey::new([1u8; 32]);
        let recipient = pk("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM");
        let mint = pk("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
        let source = get_associated_token_address(&owner, &mint);
        let destination = get_associated_token_address(&recipient, &mint);
        let instructions = [
            create_associated_token_account_idempotent(&owner, &recipient, &mint),
            transfer_checked(&source, &mint, &destination, &owner, 2_500_000, 6),
            memo(&owner, "lunch"),
        ];
        let message = Message::compile(&instructions, &owner, [0u8; 32]).unwrap();
        let parsed: Vec<_> = message
            .instructions
            .iter()
            .map(|ix| parse_instruction(&message, ix).unwrap())
            .collect();

        assert_eq!(
            parsed[0],
            ParsedInstruction::CreateAssociatedTokenAccount {
                payer: owner,
                account: destination,
                owner: recipient,
                mint
            }
        );
        assert_eq!(
            parsed[1],
            ParsedInstruction::TransferChecked {
                source,
                mint,
                destination,
                owner,
                amount: 2_500_000,
                decimals: 6
            }
        );
        assert_eq!(parsed[2], ParsedInstruction::Memo("lunch".to_string()));
    }

    #[test]
    fn unknown_programs_are_other() {
        let payer = Pubkey::new([1u8; 32]);
        let program = Pubkey::new([42u8; 32]);
        let ix = Instruction {
            program_id: program,
            accounts: vec![],
            data: vec![2, 0, 0, 0],
        };
        let message = Message::compile(&[ix], &payer, [0u8; 32]).unwrap();
        assert_eq!(
            parse_instruction(&message, &message.instructions[0]).unwrap(),
            ParsedInstruction::Other(program)
        );
    }
}
