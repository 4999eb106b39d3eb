// Copyright (C) 2025 gridconsole developers
//
// This file is part of gridconsole.
//
// gridconsole is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// gridconsole is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with gridconsole.  If
// not, see <http://www.gnu.org/licenses/>.

//! # storage
//!
//! Abstractions for the gridconsole storage layer. A [Backend] holds the console's documents:
//! accounts, spaces, cluster & cache configurations, and login sessions. The service is handed an
//! implementation at startup ([memory] for development & test, [scylla] for production) and never
//! touches a store directly.
//!
//! [memory]: crate::memory
//! [scylla]: crate::scylla

use async_trait::async_trait;
use snafu::{prelude::*, Backtrace, IntoError};

use crate::entities::{
    Account, AccountId, Cache, CacheId, Cluster, ClusterId, Session, Space, SpaceId,
};

// The context selectors are used by the implementations in `memory` & `scylla`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("An account already exists for {email}"))]
    DuplicateAccount { email: String, backtrace: Backtrace },
    #[snafu(display("No {kind} with id {id}"))]
    NotFound {
        kind: &'static str,
        id: String,
        backtrace: Backtrace,
    },
    #[snafu(display("Storage backend failure: {source}"))]
    Backend {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        backtrace: Backtrace,
    },
}

impl Error {
    /// Wrap a backend-specific failure
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        BackendSnafu.into_error(Box::new(err) as Box<dyn std::error::Error + Send + Sync + 'static>)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The gridconsole storage abstraction
///
/// One method per access the service performs; no generic query surface. All writes are
/// last-write-wins at the store.
#[async_trait]
pub trait Backend {
    // accounts
    /// Insert a new account; fails with [Error::DuplicateAccount] if one already exists for the
    /// same e-mail address.
    async fn add_account(&self, account: &Account) -> Result<()>;
    /// Retrieve an account by id. None means no such account.
    async fn account_by_id(&self, id: &AccountId) -> Result<Option<Account>>;
    /// Retrieve an account by e-mail address. None means no such account.
    async fn account_for_email(&self, email: &str) -> Result<Option<Account>>;
    /// Delete an account; the compensating action for a failed registration. Idempotent.
    async fn remove_account(&self, id: &AccountId) -> Result<()>;

    // spaces
    /// Insert a new space.
    async fn add_space(&self, space: &Space) -> Result<()>;
    /// Retrieve a space by id. None means no such space.
    async fn space_by_id(&self, id: &SpaceId) -> Result<Option<Space>>;
    /// Retrieve every space the given account owns or appears in the `used_by` of, at either
    /// permission level.
    async fn spaces_for_account(&self, account: &AccountId) -> Result<Vec<Space>>;
    /// Replace a space document; fails with [Error::NotFound] if absent.
    async fn update_space(&self, space: &Space) -> Result<()>;

    // clusters
    /// Insert a new cluster configuration.
    async fn add_cluster(&self, cluster: &Cluster) -> Result<()>;
    /// Retrieve a cluster by id. None means no such cluster.
    async fn cluster_by_id(&self, id: &ClusterId) -> Result<Option<Cluster>>;
    /// Retrieve the clusters belonging to any of the given spaces.
    async fn clusters_in_spaces(&self, spaces: &[SpaceId]) -> Result<Vec<Cluster>>;
    /// Remove a cluster by id; fails with [Error::NotFound] if absent.
    async fn remove_cluster(&self, id: &ClusterId) -> Result<()>;
    /// Replace a cluster document; fails with [Error::NotFound] if absent.
    async fn update_cluster(&self, cluster: &Cluster) -> Result<()>;

    // caches
    /// Insert a new cache configuration.
    async fn add_cache(&self, cache: &Cache) -> Result<()>;
    /// Retrieve a cache by id. None means no such cache.
    async fn cache_by_id(&self, id: &CacheId) -> Result<Option<Cache>>;
    /// Retrieve the caches belonging to any of the given spaces.
    async fn caches_in_spaces(&self, spaces: &[SpaceId]) -> Result<Vec<Cache>>;
    /// Clear `cluster` from the `clusters` set of every cache in `space`; follow-up to removing
    /// the cluster itself.
    async fn detach_cluster(&self, space: &SpaceId, cluster: &ClusterId) -> Result<()>;
    /// Remove a cache by id; fails with [Error::NotFound] if absent.
    async fn remove_cache(&self, id: &CacheId) -> Result<()>;
    /// Replace a cache document; fails with [Error::NotFound] if absent.
    async fn update_cache(&self, cache: &Cache) -> Result<()>;

    // sessions
    /// Record a freshly-minted login session.
    async fn add_session(&self, session: &Session) -> Result<()>;
    /// Retrieve a session by token. None means no such session (never minted, or destroyed).
    async fn session_for_token(&self, token: &str) -> Result<Option<Session>>;
    /// Destroy a session. Idempotent: destroying a session that never existed is Ok.
    async fn remove_session(&self, token: &str) -> Result<()>;
}
