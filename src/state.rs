// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::AuthConfig;
use crate::blockchain::rpc::RetryPolicy;
use crate::blockchain::RpcRegistry;
use crate::storage::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub rpc: Arc<RpcRegistry>,
    pub auth: Arc<AuthConfig>,
    /// Backoff for RPC calls made on behalf of requests
    pub retry: RetryPolicy,
}

impl AppState {
    pub fn new(store: Arc<Store>, rpc: Arc<RpcRegistry>, auth: AuthConfig) -> Self {
        Self {
            store,
            rpc,
            auth: Arc::new(auth),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
