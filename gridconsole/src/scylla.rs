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

//! # scylla
//!
//! [Backend] implementation for ScyllaDB, in the keyspace `gridconsole`:
//!
//! ```cql
//! create table accounts (id uuid primary key, email text, username text, password_hash text,
//!                        pepper_version text, created_at timestamp);
//! create table spaces (id uuid primary key, name text, owner uuid, used_by map<uuid,text>);
//! create table clusters (id uuid primary key, space uuid, name text, discovery_kind text,
//!                        discovery_addresses list<text>, pub_pool_size int, sys_pool_size int,
//!                        mgmt_pool_size int, p2p_pool_size int);
//! create table caches (id uuid primary key, space uuid, name text, mode text, backups int,
//!                      atomicity text, clusters set<uuid>);
//! create table sessions (token text primary key, account uuid, expires_at timestamp);
//! ```
//!
//! Documents are keyed by id; the secondary lookups (account by e-mail, entities by space) go
//! through `allow filtering`, which is fine at console scale.
//!
//! [Backend]: crate::storage::Backend

use std::collections::HashSet;

use async_trait::async_trait;
use enum_map::{Enum, EnumMap};
use futures::stream;
use itertools::Itertools;
use scylla::{
    prepared_statement::PreparedStatement, transport::errors::QueryError, SessionBuilder,
};
use secrecy::ExposeSecret;
use snafu::{Backtrace, ResultExt, Snafu};
use tap::Pipe;

use crate::{
    entities::{
        Account, AccountId, Cache, CacheId, Cluster, ClusterId, Discovery, DiscoveryKind,
        Session as LoginSession, Space, SpaceId,
    },
    storage::{self, DuplicateAccountSnafu, NotFoundSnafu},
    util::Credentials,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("A query was expected to produce at most one row & did not."))]
    AtMostOneRow { backtrace: Backtrace },
    #[snafu(display(
        "The number of prepared statements isn't consistent; this is a bug & should be reported!"
    ))]
    BadPreparedStatementCount { backtrace: Backtrace },
    #[snafu(display("Failed to set keyspace: {source}"))]
    Keyspace {
        source: scylla::transport::errors::QueryError,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to create a ScyllaDB session: {source}"))]
    NewSession {
        source: scylla::transport::errors::NewSessionError,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to prepare statement: {stmt}: {source}"))]
    Prepare {
        stmt: String,
        source: scylla::transport::errors::QueryError,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                               gridconsole ScyllaDB session type                                //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The set of prepared statements used by gridconsole
///
/// Used as both a mnemonic tag identifying prepared statements and as the key type in an [EnumMap]
/// from said tags to the actual [PreparedStatement]s; the [Enum] derive is what makes the latter
/// possible.
#[derive(Clone, Debug, Enum, Eq, PartialEq)]
enum PreparedStatements {
    InsertAccount,
    SelectAccountById,
    SelectAccountByEmail,
    DeleteAccount,
    InsertSpace,
    SelectSpace,
    SelectSpacesByOwner,
    SelectSpacesByGrant,
    InsertCluster,
    SelectCluster,
    SelectClustersInSpaces,
    DeleteCluster,
    InsertCache,
    SelectCache,
    SelectCachesInSpaces,
    DeleteCache,
    DetachCluster,
    InsertSession,
    SelectSession,
    DeleteSession,
}

/// `gridconsole`-specific ScyllaDB Session type
///
/// Instantiate this via [Session::new] with connection info & credentials if need be; when dropped
/// the ScyllaDB session will be terminated.
pub struct Session {
    session: ::scylla::Session,
    /// An [EnumMap] is a map whose keys are enum values where all values are guaranteed to be
    /// represented. As a result, the index operator is guaranteed to succeed-- no need to unwrap
    /// [Option]s or [Result]s or some such.
    prepared_statements: EnumMap<PreparedStatements, PreparedStatement>,
}

impl Session {
    /// Prepare a statement
    async fn prepare(scylla: &::scylla::Session, stmt: &str) -> Result<PreparedStatement> {
        scylla.prepare(stmt).await.context(PrepareSnafu {
            stmt: stmt.to_owned(),
        })
    }

    /// [Session] constructor
    ///
    /// Construct with a collection of ScyllaDB hosts. The `Item`s are regrettably typed as `&str`,
    /// but they need to be parsable as `IpAddress`es. `credentials`, if non-None, is the database
    /// username & password.
    pub async fn new(
        hosts: impl IntoIterator<Item = impl AsRef<str>>,
        credentials: &Option<Credentials>,
    ) -> Result<Session> {
        let mut builder = SessionBuilder::new().known_nodes(hosts);
        if let Some(Credentials((user, pass))) = credentials {
            builder = builder.user(user.expose_secret(), pass.expose_secret())
        }
        let scylla = builder.build().await.context(NewSessionSnafu)?;
        scylla
            .use_keyspace("gridconsole", false)
            .await
            .context(KeyspaceSnafu)?;

        use futures::stream::StreamExt;
        // All the prepared statements we use, in the same order as [PreparedStatements].
        let prepared_statements = stream::iter(vec![
            "insert into accounts (id,email,username,password_hash,pepper_version,created_at) values (?,?,?,?,?,?)",
            "select id,email,username,password_hash,pepper_version,created_at from accounts where id=?",
            "select id,email,username,password_hash,pepper_version,created_at from accounts where email=? allow filtering",
            "delete from accounts where id=?",
            "insert into spaces (id,name,owner,used_by) values (?,?,?,?)",
            "select id,name,owner,used_by from spaces where id=?",
            "select id,name,owner,used_by from spaces where owner=? allow filtering",
            "select id,name,owner,used_by from spaces where used_by contains key ? allow filtering",
            "insert into clusters (id,space,name,discovery_kind,discovery_addresses,pub_pool_size,sys_pool_size,mgmt_pool_size,p2p_pool_size) values (?,?,?,?,?,?,?,?,?)",
            "select id,space,name,discovery_kind,discovery_addresses,pub_pool_size,sys_pool_size,mgmt_pool_size,p2p_pool_size from clusters where id=?",
            "select id,space,name,discovery_kind,discovery_addresses,pub_pool_size,sys_pool_size,mgmt_pool_size,p2p_pool_size from clusters where space in ? allow filtering",
            "delete from clusters where id=?",
            "insert into caches (id,space,name,mode,backups,atomicity,clusters) values (?,?,?,?,?,?,?)",
            "select id,space,name,mode,backups,atomicity,clusters from caches where id=?",
            "select id,space,name,mode,backups,atomicity,clusters from caches where space in ? allow filtering",
            "delete from caches where id=?",
            "update caches set clusters = clusters - ? where id=?",
            "insert into sessions (token,account,expires_at) values (?,?,?)",
            "select token,account,expires_at from sessions where token=?",
            "delete from sessions where token=?",
        ])
            .then(|s| async { Self::prepare(&scylla, s).await })
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<PreparedStatement>>>()?;
        // `EnumMap::from_array` needs a slice of *precisely the right length*, in the right
        // order. We can't test for the latter, but we can for the former.
        let prepared_statements: [PreparedStatement; 20] = prepared_statements
            .try_into()
            .map_err(|_| BadPreparedStatementCountSnafu.build())?;

        Ok(Session {
            session: scylla,
            prepared_statements: EnumMap::from_array(prepared_statements),
        })
    }
}

use storage::Error as StorError;

// Use these if you don't want to add any context to a failed query.
impl std::convert::From<scylla::transport::errors::QueryError> for StorError {
    fn from(value: QueryError) -> Self {
        StorError::backend(value)
    }
}

impl std::convert::From<scylla::transport::query_result::IntoRowsResultError> for StorError {
    fn from(value: scylla::transport::query_result::IntoRowsResultError) -> Self {
        StorError::backend(value)
    }
}

impl std::convert::From<scylla::transport::query_result::RowsError> for StorError {
    fn from(value: scylla::transport::query_result::RowsError) -> Self {
        StorError::backend(value)
    }
}

impl std::convert::From<scylla::deserialize::DeserializationError> for StorError {
    fn from(value: scylla::deserialize::DeserializationError) -> Self {
        StorError::backend(value)
    }
}

/// The positional row type for the clusters table; [Discovery] flattens to two columns on disk
type ClusterRow = (
    ClusterId,
    SpaceId,
    String,
    DiscoveryKind,
    Vec<String>,
    i32,
    i32,
    i32,
    i32,
);

fn cluster_from_row(row: ClusterRow) -> Cluster {
    let (id, space, name, kind, addresses, pub_pool, sys_pool, mgmt_pool, p2p_pool) = row;
    Cluster::from_columns(
        id,
        space,
        name,
        Discovery { kind, addresses },
        pub_pool,
        sys_pool,
        mgmt_pool,
        p2p_pool,
    )
}

#[async_trait]
impl storage::Backend for Session {
    async fn add_account(&self, account: &Account) -> StdResult<(), StorError> {
        // Two round trips rather than an LWT; registrations are rare & this service is the
        // keyspace's only writer.
        if self
            .account_for_email(account.email().as_ref())
            .await?
            .is_some()
        {
            return DuplicateAccountSnafu {
                email: account.email().to_string(),
            }
            .fail();
        }
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::InsertAccount],
                (
                    &account.id(),
                    account.email(),
                    account.username(),
                    &account.hash(),
                    &account.pepper_version(),
                    &account.created_at(),
                ),
            )
            .await?;
        Ok(())
    }

    async fn account_by_id(&self, id: &AccountId) -> StdResult<Option<Account>, StorError> {
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::SelectAccountById],
                (id,),
            )
            .await?
            .into_rows_result()?
            .rows::<Account>()?
            .at_most_one()
            .map_err(|_| StorError::backend(AtMostOneRowSnafu.build()))?
            .transpose()?
            .pipe(Ok)
    }

    async fn account_for_email(&self, email: &str) -> StdResult<Option<Account>, StorError> {
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::SelectAccountByEmail],
                (email,),
            )
            .await?
            .into_rows_result()?
            .rows::<Account>()?
            .at_most_one()
            .map_err(|_| StorError::backend(AtMostOneRowSnafu.build()))?
            .transpose()?
            .pipe(Ok)
    }

    async fn remove_account(&self, id: &AccountId) -> StdResult<(), StorError> {
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::DeleteAccount],
                (id,),
            )
            .await?;
        Ok(())
    }

    async fn add_space(&self, space: &Space) -> StdResult<(), StorError> {
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::InsertSpace],
                (&space.id(), space.name(), &space.owner(), space.used_by()),
            )
            .await?;
        Ok(())
    }

    async fn space_by_id(&self, id: &SpaceId) -> StdResult<Option<Space>, StorError> {
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::SelectSpace],
                (id,),
            )
            .await?
            .into_rows_result()?
            .rows::<Space>()?
            .at_most_one()
            .map_err(|_| StorError::backend(AtMostOneRowSnafu.build()))?
            .transpose()?
            .pipe(Ok)
    }

    async fn spaces_for_account(&self, account: &AccountId) -> StdResult<Vec<Space>, StorError> {
        let owned = self
            .session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::SelectSpacesByOwner],
                (account,),
            )
            .await?
            .into_rows_result()?
            .rows::<Space>()?
            .collect::<StdResult<Vec<Space>, _>>()?;
        let granted = self
            .session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::SelectSpacesByGrant],
                (account,),
            )
            .await?
            .into_rows_result()?
            .rows::<Space>()?
            .collect::<StdResult<Vec<Space>, _>>()?;
        // an owner granting themselves access is filtered out at write time, but belt & braces
        owned
            .into_iter()
            .chain(granted)
            .unique_by(Space::id)
            .collect::<Vec<Space>>()
            .pipe(Ok)
    }

    async fn update_space(&self, space: &Space) -> StdResult<(), StorError> {
        if self.space_by_id(&space.id()).await?.is_none() {
            return NotFoundSnafu {
                kind: "space",
                id: space.id().to_string(),
            }
            .fail();
        }
        self.add_space(space).await
    }

    async fn add_cluster(&self, cluster: &Cluster) -> StdResult<(), StorError> {
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::InsertCluster],
                (
                    &cluster.id(),
                    &cluster.space(),
                    cluster.name(),
                    &cluster.discovery().kind,
                    &cluster.discovery().addresses,
                    cluster.pub_pool_size(),
                    cluster.sys_pool_size(),
                    cluster.mgmt_pool_size(),
                    cluster.p2p_pool_size(),
                ),
            )
            .await?;
        Ok(())
    }

    async fn cluster_by_id(&self, id: &ClusterId) -> StdResult<Option<Cluster>, StorError> {
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::SelectCluster],
                (id,),
            )
            .await?
            .into_rows_result()?
            .rows::<ClusterRow>()?
            .at_most_one()
            .map_err(|_| StorError::backend(AtMostOneRowSnafu.build()))?
            .transpose()?
            .map(cluster_from_row)
            .pipe(Ok)
    }

    async fn clusters_in_spaces(&self, spaces: &[SpaceId]) -> StdResult<Vec<Cluster>, StorError> {
        if spaces.is_empty() {
            return Ok(Vec::new());
        }
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::SelectClustersInSpaces],
                (spaces.to_vec(),),
            )
            .await?
            .into_rows_result()?
            .rows::<ClusterRow>()?
            .map_ok(cluster_from_row)
            .collect::<StdResult<Vec<Cluster>, _>>()?
            .pipe(Ok)
    }

    async fn remove_cluster(&self, id: &ClusterId) -> StdResult<(), StorError> {
        if self.cluster_by_id(id).await?.is_none() {
            return NotFoundSnafu {
                kind: "cluster",
                id: id.to_string(),
            }
            .fail();
        }
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::DeleteCluster],
                (id,),
            )
            .await?;
        Ok(())
    }

    async fn update_cluster(&self, cluster: &Cluster) -> StdResult<(), StorError> {
        if self.cluster_by_id(&cluster.id()).await?.is_none() {
            return NotFoundSnafu {
                kind: "cluster",
                id: cluster.id().to_string(),
            }
            .fail();
        }
        self.add_cluster(cluster).await
    }

    async fn add_cache(&self, cache: &Cache) -> StdResult<(), StorError> {
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::InsertCache],
                (
                    &cache.id(),
                    &cache.space(),
                    cache.name(),
                    cache.mode(),
                    cache.backups(),
                    cache.atomicity(),
                    cache.clusters(),
                ),
            )
            .await?;
        Ok(())
    }

    async fn cache_by_id(&self, id: &CacheId) -> StdResult<Option<Cache>, StorError> {
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::SelectCache],
                (id,),
            )
            .await?
            .into_rows_result()?
            .rows::<Cache>()?
            .at_most_one()
            .map_err(|_| StorError::backend(AtMostOneRowSnafu.build()))?
            .transpose()?
            .pipe(Ok)
    }

    async fn caches_in_spaces(&self, spaces: &[SpaceId]) -> StdResult<Vec<Cache>, StorError> {
        if spaces.is_empty() {
            return Ok(Vec::new());
        }
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::SelectCachesInSpaces],
                (spaces.to_vec(),),
            )
            .await?
            .into_rows_result()?
            .rows::<Cache>()?
            .collect::<StdResult<Vec<Cache>, _>>()?
            .pipe(Ok)
    }

    async fn detach_cluster(
        &self,
        space: &SpaceId,
        cluster: &ClusterId,
    ) -> StdResult<(), StorError> {
        let caches = self.caches_in_spaces(&[*space]).await?;
        for cache in caches
            .iter()
            .filter(|cache| cache.clusters().contains(cluster))
        {
            self.session
                .execute_unpaged(
                    &self.prepared_statements[PreparedStatements::DetachCluster],
                    (HashSet::from([*cluster]), &cache.id()),
                )
                .await?;
        }
        Ok(())
    }

    async fn remove_cache(&self, id: &CacheId) -> StdResult<(), StorError> {
        if self.cache_by_id(id).await?.is_none() {
            return NotFoundSnafu {
                kind: "cache",
                id: id.to_string(),
            }
            .fail();
        }
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::DeleteCache],
                (id,),
            )
            .await?;
        Ok(())
    }

    async fn update_cache(&self, cache: &Cache) -> StdResult<(), StorError> {
        if self.cache_by_id(&cache.id()).await?.is_none() {
            return NotFoundSnafu {
                kind: "cache",
                id: cache.id().to_string(),
            }
            .fail();
        }
        self.add_cache(cache).await
    }

    async fn add_session(&self, session: &LoginSession) -> StdResult<(), StorError> {
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::InsertSession],
                (
                    session.token(),
                    &session.account(),
                    &session.expires_at(),
                ),
            )
            .await?;
        Ok(())
    }

    async fn session_for_token(&self, token: &str) -> StdResult<Option<LoginSession>, StorError> {
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::SelectSession],
                (token,),
            )
            .await?
            .into_rows_result()?
            .rows::<LoginSession>()?
            .at_most_one()
            .map_err(|_| StorError::backend(AtMostOneRowSnafu.build()))?
            .transpose()?
            .pipe(Ok)
    }

    async fn remove_session(&self, token: &str) -> StdResult<(), StorError> {
        self.session
            .execute_unpaged(
                &self.prepared_statements[PreparedStatements::DeleteSession],
                (token,),
            )
            .await?;
        Ok(())
    }
}
