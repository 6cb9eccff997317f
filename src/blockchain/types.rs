// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain families, their capability table, and known tokens.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Chain family tag carried by every address, challenge, session and transfer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Solana,
    Ethereum,
    Polygon,
    Arbitrum,
    Optimism,
    Base,
    Bsc,
}

/// Transaction model shared by a group of families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    Solana,
    Evm,
}

/// Wallet message-signature scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// Raw ed25519 over the exact message bytes.
    Ed25519,
    /// `personal_sign`: EIP-191 prefix, Keccak-256, secp256k1 recovery.
    Eip191Secp256k1,
}

/// Static per-family policy.
#[derive(Debug, Clone)]
pub struct ChainCapabilities {
    pub family: ChainFamily,
    pub kind: ChainKind,
    pub scheme: SignatureScheme,
    /// Display name used in the sign-in message
    pub name: &'static str,
    pub native_symbol: &'static str,
    pub native_decimals: u8,
    /// EIP-155 chain id (EVM only)
    pub chain_id: Option<u64>,
    pub default_rpc_url: &'static str,
    /// Environment variable overriding `default_rpc_url`
    pub rpc_url_env: &'static str,
    pub explorer_url: &'static str,
}

const CAPABILITIES: [ChainCapabilities; 7] = [
    ChainCapabilities {
        family: ChainFamily::Solana,
        kind: ChainKind::Solana,
        scheme: SignatureScheme::Ed25519,
        name: "Solana",
        native_symbol: "SOL",
        native_decimals: 9,
        chain_id: None,
        default_rpc_url: "https://api.mainnet-beta.solana.com",
        rpc_url_env: "SOLANA_RPC_URL",
        explorer_url: "https://solscan.io",
    },
    ChainCapabilities {
        family: ChainFamily::Ethereum,
        kind: ChainKind::Evm,
        scheme: SignatureScheme::Eip191Secp256k1,
        name: "Ethereum",
        native_symbol: "ETH",
        native_decimals: 18,
        chain_id: Some(1),
        default_rpc_url: "https://eth.llamarpc.com",
        rpc_url_env: "ETHEREUM_RPC_URL",
        explorer_url: "https://etherscan.io",
    },
    ChainCapabilities {
        family: ChainFamily::Polygon,
        kind: ChainKind::Evm,
        scheme: SignatureScheme::Eip191Secp256k1,
        name: "Polygon",
        native_symbol: "POL",
        native_decimals: 18,
        chain_id: Some(137),
        default_rpc_url: "https://polygon-rpc.com",
        rpc_url_env: "POLYGON_RPC_URL",
        explorer_url: "https://polygonscan.com",
    },
    ChainCapabilities {
        family: ChainFamily::Arbitrum,
        kind: ChainKind::Evm,
        scheme: SignatureScheme::Eip191Secp256k1,
        name: "Arbitrum One",
        native_symbol: "ETH",
        native_decimals: 18,
        chain_id: Some(42161),
        default_rpc_url: "https://arb1.arbitrum.io/rpc",
        rpc_url_env: "ARBITRUM_RPC_URL",
        explorer_url: "https://arbiscan.io",
    },
    ChainCapabilities {
        family: ChainFamily::Optimism,
        kind: ChainKind::Evm,
        scheme: SignatureScheme::Eip191Secp256k1,
        name: "OP Mainnet",
        native_symbol: "ETH",
        native_decimals: 18,
        chain_id: Some(10),
        default_rpc_url: "https://mainnet.optimism.io",
        rpc_url_env: "OPTIMISM_RPC_URL",
        explorer_url: "https://optimistic.etherscan.io",
    },
    ChainCapabilities {
        family: ChainFamily::Base,
        kind: ChainKind::Evm,
        scheme: SignatureScheme::Eip191Secp256k1,
        name: "Base",
        native_symbol: "ETH",
        native_decimals: 18,
        chain_id: Some(8453),
        default_rpc_url: "https://mainnet.base.org",
        rpc_url_env: "BASE_RPC_URL",
        explorer_url: "https://basescan.org",
    },
    ChainCapabilities {
        family: ChainFamily::Bsc,
        kind: ChainKind::Evm,
        scheme: SignatureScheme::Eip191Secp256k1,
        name: "BNB Smart Chain",
        native_symbol: "BNB",
        native_decimals: 18,
        chain_id: Some(56),
        default_rpc_url: "https://bsc-dataseed.binance.org",
        rpc_url_env: "BSC_RPC_URL",
        explorer_url: "https://bscscan.com",
    },
];

impl ChainFamily {
    pub const ALL: [ChainFamily; 7] = [
        ChainFamily::Solana,
        ChainFamily::Ethereum,
        ChainFamily::Polygon,
        ChainFamily::Arbitrum,
        ChainFamily::Optimism,
        ChainFamily::Base,
        ChainFamily::Bsc,
    ];

    pub fn capabilities(self) -> &'static ChainCapabilities {
        &CAPABILITIES[self as usize]
    }

    pub fn kind(self) -> ChainKind {
        self.capabilities().kind
    }

    pub fn is_evm(self) -> bool {
        self.kind() == ChainKind::Evm
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChainFamily::Solana => "solana",
            ChainFamily::Ethereum => "ethereum",
            ChainFamily::Polygon => "polygon",
            ChainFamily::Arbitrum => "arbitrum",
            ChainFamily::Optimism => "optimism",
            ChainFamily::Base => "base",
            ChainFamily::Bsc => "bsc",
        }
    }

    /// Validate an address for this family and return its canonical form.
    ///
    /// Solana addresses keep their base58 spelling; EVM addresses are
    /// lowercased so uniqueness checks are case-insensitive.
    pub fn normalize_address(self, raw: &str) -> Result<String, AddressError> {
        let raw = raw.trim();
        match self.kind() {
            ChainKind::Solana => {
                let bytes = bs58::decode(raw)
                    .into_vec()
                    .map_err(|_| AddressError::Encoding(self))?;
                if bytes.len() != 32 {
                    return Err(AddressError::Length {
                        family: self,
                        expected: 32,
                        actual: bytes.len(),
                    });
                }
                Ok(bs58::encode(bytes).into_string())
            }
            ChainKind::Evm => {
                let hex = raw
                    .strip_prefix("0x")
                    .or_else(|| raw.strip_prefix("0X"))
                    .ok_or(AddressError::Encoding(self))?;
                if hex.len() != 40 {
                    return Err(AddressError::Length {
                        family: self,
                        expected: 20,
                        actual: hex.len() / 2,
                    });
                }
                if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(AddressError::Encoding(self));
                }
                Ok(format!("0x{}", hex.to_ascii_lowercase()))
            }
        }
    }

    /// Block-explorer link for a transaction id.
    pub fn explorer_tx_url(self, signature: &str) -> String {
        format!("{}/tx/{}", self.capabilities().explorer_url, signature)
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainFamily {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ChainFamily::ALL
            .into_iter()
            .find(|family| family.as_str() == lower)
            .ok_or_else(|| AddressError::UnknownChain(s.to_string()))
    }
}

/// Address validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("unknown chain family: {0}")]
    UnknownChain(String),

    #[error("address is not a valid {0} address")]
    Encoding(ChainFamily),

    #[error("{family} address must be {expected} bytes, got {actual}")]
    Length {
        family: ChainFamily,
        expected: usize,
        actual: usize,
    },
}

/// An address tagged with its chain family, always in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct ChainAddress {
    pub chain: ChainFamily,
    pub address: String,
}

impl ChainAddress {
    pub fn parse(chain: ChainFamily, raw: &str) -> Result<Self, AddressError> {
        Ok(Self {
            chain,
            address: chain.normalize_address(raw)?,
        })
    }

    /// Storage key: `family:address`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.chain, self.address)
    }

    /// Whether `other` names the same address (after normalisation).
    pub fn matches(&self, other: &str) -> bool {
        self.chain
            .normalize_address(other)
            .map(|normalized| normalized == self.address)
            .unwrap_or(false)
    }
}

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.address)
    }
}

// =============================================================================
// Tokens
// =============================================================================

/// Well-known fungible tokens per family.
#[derive(Debug, Clone)]
pub struct KnownToken {
    pub chain: ChainFamily,
    pub symbol: &'static str,
    pub decimals: u8,
    /// SPL mint or ERC-20 contract
    pub address: &'static str,
}

pub const KNOWN_TOKENS: &[KnownToken] = &[
    KnownToken {
        chain: ChainFamily::Solana,
        symbol: "USDC",
        decimals: 6,
        address: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
    },
    KnownToken {
        chain: ChainFamily::Solana,
        symbol: "USDT",
        decimals: 6,
        address: "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
    },
    KnownToken {
        chain: ChainFamily::Ethereum,
        symbol: "USDC",
        decimals: 6,
        address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
    },
    KnownToken {
        chain: ChainFamily::Ethereum,
        symbol: "USDT",
        decimals: 6,
        address: "0xdac17f958d2ee523a2206206994597c13d831ec7",
    },
    KnownToken {
        chain: ChainFamily::Polygon,
        symbol: "USDC",
        decimals: 6,
        address: "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359",
    },
    KnownToken {
        chain: ChainFamily::Arbitrum,
        symbol: "USDC",
        decimals: 6,
        address: "0xaf88d065e77c8cc2239327c5edb3a432268e5831",
    },
    KnownToken {
        chain: ChainFamily::Optimism,
        symbol: "USDC",
        decimals: 6,
        address: "0x0b2c639c533813f4aa9d7837caf62653d097ff85",
    },
    KnownToken {
        chain: ChainFamily::Base,
        symbol: "USDC",
        decimals: 6,
        address: "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
    },
    KnownToken {
        chain: ChainFamily::Bsc,
        symbol: "USDC",
        decimals: 18,
        address: "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d",
    },
];

/// What a transfer moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "address", rename_all = "lowercase")]
pub enum TokenKind {
    /// SOL / ETH / POL / BNB
    Native,
    /// SPL mint or ERC-20 contract (canonical address)
    Token(String),
}

impl TokenKind {
    /// Parse a client token identifier: `native`, the native symbol, a known
    /// token symbol, or a raw mint/contract address.
    pub fn parse(chain: ChainFamily, raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("native")
            || trimmed.eq_ignore_ascii_case(chain.capabilities().native_symbol)
        {
            return Ok(TokenKind::Native);
        }
        if let Some(known) = KNOWN_TOKENS
            .iter()
            .find(|t| t.chain == chain && t.symbol.eq_ignore_ascii_case(trimmed))
        {
            return Ok(TokenKind::Token(known.address.to_string()));
        }
        Ok(TokenKind::Token(chain.normalize_address(trimmed)?))
    }

    /// Identifier persisted on transfer records.
    pub fn identifier(&self) -> &str {
        match self {
            TokenKind::Native => "native",
            TokenKind::Token(address) => address,
        }
    }

    /// Registry entry, if this is a well-known token.
    pub fn known(&self, chain: ChainFamily) -> Option<&'static KnownToken> {
        match self {
            TokenKind::Native => None,
            TokenKind::Token(address) => KNOWN_TOKENS
                .iter()
                .find(|t| t.chain == chain && t.address == address.as_str()),
        }
    }
}

/// A token together with the metadata needed to scale amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResolvedToken {
    pub token: TokenKind,
    pub symbol: String,
    pub decimals: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_table_is_indexed_by_family() {
        for family in ChainFamily::ALL {
            assert_eq!(family.capabilities().family, family);
        }
    }

    #[test]
    fn only_solana_uses_ed25519() {
        for family in ChainFamily::ALL {
            let expected = if family == ChainFamily::Solana {
                SignatureScheme::Ed25519
            } else {
                SignatureScheme::Eip191Secp256k1
            };
            assert_eq!(family.capabilities().scheme, expected);
        }
    }

    #[test]
    fn parse_family_names() {
        assert_eq!("Solana".parse::<ChainFamily>().unwrap(), ChainFamily::Solana);
        assert_eq!("bsc".parse::<ChainFamily>().unwrap(), ChainFamily::Bsc);
        assert!("dogecoin".parse::<ChainFamily>().is_err());
    }

    #[test]
    fn evm_addresses_are_lowercased() {
        let normalized = ChainFamily::Ethereum
            .normalize_address("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
            .unwrap();
        assert_eq!(normalized, "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    }

    #[test]
    fn evm_address_validation() {
        assert!(ChainFamily::Base.normalize_address("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266").is_err());
        assert!(ChainFamily::Base.normalize_address("0x1234").is_err());
        assert!(ChainFamily::Base
            .normalize_address("0xZZ9Fd6e51aad88F6F4ce6aB8827279cffFb92266")
            .is_err());
    }

    #[test]
    fn solana_address_validation() {
        let system = "11111111111111111111111111111111";
        assert_eq!(ChainFamily::Solana.normalize_address(system).unwrap(), system);
        assert!(ChainFamily::Solana.normalize_address("0OIl").is_err());
        assert!(matches!(
            ChainFamily::Solana.normalize_address("abc"),
            Err(AddressError::Length { .. })
        ));
    }

    #[test]
    fn chain_address_matches_ignores_evm_case() {
        let addr = ChainAddress::parse(
            ChainFamily::Polygon,
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
        )
        .unwrap();
        assert!(addr.matches("0xF39FD6E51AAD88F6F4CE6AB8827279CFFFB92266"));
        assert!(!addr.matches("0x0000000000000000000000000000000000000001"));
        assert_eq!(addr.key(), "polygon:0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    }

    #[test]
    fn token_identifiers() {
        assert_eq!(TokenKind::parse(ChainFamily::Solana, "SOL").unwrap(), TokenKind::Native);
        assert_eq!(TokenKind::parse(ChainFamily::Bsc, "native").unwrap(), TokenKind::Native);
        assert_eq!(
            TokenKind::parse(ChainFamily::Solana, "usdc").unwrap(),
            TokenKind::Token("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string())
        );
        let contract = TokenKind::parse(
            ChainFamily::Ethereum,
            "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
        )
        .unwrap();
        assert_eq!(contract.known(ChainFamily::Ethereum).unwrap().symbol, "USDC");
        assert!(TokenKind::parse(ChainFamily::Ethereum, "NOTATOKEN").is_err());
    }
}
