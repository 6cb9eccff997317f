// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ERC-20 token contract interactions.

use alloy::{primitives::Address, providers::Provider, sol};

use crate::blockchain::rpc::RpcError;

// Only the calls a transfer needs
sol! {
    #[sol(rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// ERC-20 contract wrapper.
pub struct Erc20Contract<P> {
    contract: IERC20::IERC20Instance<P>,
}

impl<P: Provider + Clone> Erc20Contract<P> {
    pub fn new(provider: &P, address: Address) -> Self {
        Self {
            contract: IERC20::new(address, provider.clone()),
        }
    }

    /// Get the token decimals.
    pub async fn decimals(&self) -> Result<u8, RpcError> {
        self.contract
            .decimals()
            .call()
            .await
            .map_err(|e| match e {
                alloy::contract::Error::TransportError(err) => {
                    super::client::classify("decimals", err, false)
                }
                other => RpcError::Rejected(format!("decimals: {other}")),
            })
    }
}
