// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SOL and SPL transfer assembly and re-validation.

use std::str::FromStr;

use super::instructions::{
    create_associated_token_account_idempotent, get_associated_token_address, memo,
    parse_instruction, system_transfer, transfer_checked, ParsedInstruction,
};
use super::wire::{Blockhash, Message, Pubkey, Transaction};
use crate::blockchain::amount::AmountError;
use crate::blockchain::builder::{BuildError, TransferIntent};
use crate::blockchain::relay::SubmitError;
use crate::blockchain::types::TokenKind;

fn pubkey(address: &str) -> Result<Pubkey, BuildError> {
    Pubkey::from_str(address).map_err(|_| BuildError::InvalidAddress(address.to_string()))
}

/// Assemble the unsigned legacy transaction for `intent`, paid for by the sender.
pub fn build_transfer(
    intent: &TransferIntent,
    recent_blockhash: Blockhash,
) -> Result<Transaction, BuildError> {
    let from = pubkey(&intent.from)?;
    let to = pubkey(&intent.to)?;
    let amount = u64::try_from(intent.base_units)
        .map_err(|_| BuildError::InvalidAmount(AmountError::Overflow))?;

    let mut instructions = match &intent.token.token {
        TokenKind::Native => vec![system_transfer(&from, &to, amount)],
        TokenKind::Token(mint) => {
            let mint = pubkey(mint)?;
            let source = get_associated_token_address(&from, &mint);
            let destination = get_associated_token_address(&to, &mint);
            vec![
                create_associated_token_account_idempotent(&from, &to, &mint),
                transfer_checked(
                    &source,
                    &mint,
                    &destination,
                    &from,
                    amount,
                    intent.token.decimals,
                ),
            ]
        }
    };
    if let Some(text) = &intent.memo {
        instructions.push(memo(&from, text));
    }

    let message = Message::compile(&instructions, &from, recent_blockhash)
        .map_err(|e| BuildError::InvalidAddress(e.to_string()))?;
    Ok(Transaction::new_unsigned(message))
}

/// Check that a signed transaction moves exactly what `intent` describes.
///
/// Accepts one value-moving instruction plus optional memo and
/// compute-budget instructions. For SPL intents the sender may also pay to
/// create the recipient's associated account for the intent's mint; any
/// other account creation is rejected.
pub fn check_transfer(tx: &Transaction, intent: &TransferIntent) -> Result<(), SubmitError> {
    let mismatch = |reason: &str| SubmitError::TransactionMismatch(reason.to_string());
    let sender = Pubkey::from_str(&intent.from)
        .map_err(|_| SubmitError::MalformedTransaction("invalid sender".to_string()))?;
    let recipient = Pubkey::from_str(&intent.to)
        .map_err(|_| SubmitError::MalformedTransaction("invalid recipient".to_string()))?;

    if tx.fee_payer() != Some(&sender) {
        return Err(mismatch("fee payer is not the session wallet"));
    }
    if !tx.verify_signatures() {
        return Err(SubmitError::MalformedTransaction(
            "signature verification failed".to_string(),
        ));
    }

    let intent_mint = match &intent.token.token {
        TokenKind::Native => None,
        TokenKind::Token(mint) => Some(
            Pubkey::from_str(mint)
                .map_err(|_| SubmitError::MalformedTransaction("invalid mint".to_string()))?,
        ),
    };
    let creates_recipient_account =
        |payer: &Pubkey, account: &Pubkey, owner: &Pubkey, mint: &Pubkey| {
            intent_mint.as_ref() == Some(mint)
                && *payer == sender
                && *owner == recipient
                && *account == get_associated_token_address(&recipient, mint)
        };

    let mut transfers = Vec::new();
    let mut memos = Vec::new();
    for ix in &tx.message.instructions {
        let parsed = parse_instruction(&tx.message, ix)
            .map_err(|e| SubmitError::MalformedTransaction(e.to_string()))?;
        match parsed {
            ParsedInstruction::Memo(text) => memos.push(text),
            ParsedInstruction::ComputeBudget => {}
            ParsedInstruction::CreateAssociatedTokenAccount {
                payer,
                account,
                owner,
                mint,
            } if creates_recipient_account(&payer, &account, &owner, &mint) => {}
            p if p.is_transfer() => transfers.push(p),
            _ => return Err(mismatch("unexpected instruction")),
        }
    }

    let [transfer] = transfers.as_slice() else {
        return Err(mismatch("expected exactly one transfer instruction"));
    };

    match memos.as_slice() {
        [] if intent.memo.is_none() => {}
        [text] if intent.memo.as_deref() == Some(text.as_str()) => {}
        _ => return Err(mismatch("memo does not match")),
    }

    let expected_amount = u64::try_from(intent.base_units).map_err(|_| mismatch("amount"))?;
    match (&intent.token.token, transfer) {
        (
            TokenKind::Native,
            ParsedInstruction::SystemTransfer { from, to, lamports },
        ) => {
            if *from != sender {
                return Err(mismatch("transfer source is not the session wallet"));
            }
            if *to != recipient {
                return Err(mismatch("recipient does not match"));
            }
            if *lamports != expected_amount {
                return Err(mismatch("amount does not match"));
            }
        }
        (
            TokenKind::Token(expected_mint),
            ParsedInstruction::TransferChecked {
                source,
                mint,
                destination,
                owner,
                amount,
                decimals,
            },
        ) => {
            let expected_mint = Pubkey::from_str(expected_mint)
                .map_err(|_| SubmitError::MalformedTransaction("invalid mint".to_string()))?;
            if *mint != expected_mint {
                return Err(mismatch("token does not match"));
            }
            if *owner != sender || *source != get_associated_token_address(&sender, mint) {
                return Err(mismatch("transfer source is not the session wallet"));
            }
            if *destination != get_associated_token_address(&recipient, mint) {
                return Err(mismatch("recipient does not match"));
            }
            if *amount != expected_amount || *decimals != intent.token.decimals {
                return Err(mismatch("amount does not match"));
            }
        }
        _ => return Err(mismatch("token does not match")),
    }
    Ok(())
}
