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

//! # visibility
//!
//! The space-scoped view of the console's documents, and every mutation thereof.
//!
//! An account's *accessible* spaces are those it owns plus those shared with it through a space's
//! `used_by`, at either permission level. Cluster & cache listings are always computed fresh from
//! that set: spaces first, then the entities whose `space` lies within. Nothing here is cached
//! across requests.
//!
//! Writes take an explicit [Save] tag. The console decides insert-versus-update from the presence
//! of `_id` in the request document and says so; this module never infers it. Every write
//! requires [Permission::Full] on the target space (the owner has it implicitly); `View` is
//! read-only. Saves & removes return the refreshed listing, never just the mutated record, so the
//! console can redraw its tables from one response.

use axum::http::StatusCode;
use snafu::{prelude::*, Backtrace};

use crate::{
    entities::{
        Account, AccountId, Cache, CacheId, CacheAtomicity, CacheMode, Cluster, ClusterId,
        Discovery, Permission, Space, SpaceId,
    },
    entities,
    storage::{self, Backend},
};

use std::collections::{HashMap, HashSet};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Cluster {cluster} does not belong to space {space}"))]
    ClusterSpaceMismatch {
        cluster: ClusterId,
        space: SpaceId,
        backtrace: Backtrace,
    },
    #[snafu(display("Bad document: {source}"))]
    Document {
        source: entities::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Space {space} is not writable by this account"))]
    Forbidden { space: SpaceId, backtrace: Backtrace },
    #[snafu(display("No such account {account}"))]
    NoSuchAccount {
        account: AccountId,
        backtrace: Backtrace,
    },
    #[snafu(display("No such cluster {cluster}"))]
    NoSuchClusterRef {
        cluster: ClusterId,
        backtrace: Backtrace,
    },
    #[snafu(display("No such space {space}"))]
    NoSuchSpace { space: SpaceId, backtrace: Backtrace },
    #[snafu(display("No {kind} with id {id}"))]
    NotFound {
        kind: &'static str,
        id: String,
        backtrace: Backtrace,
    },
    #[snafu(display("Storage failure: {source}"))]
    Storage {
        source: storage::Error,
        backtrace: Backtrace,
    },
}

impl Error {
    /// Map this failure onto the console's error taxonomy: 400 for bad documents & bad
    /// references, 403 for insufficient permission, 404 for missing identities, 500 for storage
    /// trouble (whose detail is logged, not echoed).
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            Error::ClusterSpaceMismatch { .. }
            | Error::Document { .. }
            | Error::NoSuchAccount { .. }
            | Error::NoSuchClusterRef { .. }
            | Error::NoSuchSpace { .. } => (StatusCode::BAD_REQUEST, format!("{}", self)),
            Error::Forbidden { .. } => (StatusCode::FORBIDDEN, format!("{}", self)),
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, format!("{}", self)),
            Error::Storage {
                source: storage::Error::NotFound { kind, id, .. },
                ..
            } => (StatusCode::NOT_FOUND, format!("No {} with id {}", kind, id)),
            Error::Storage { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            ),
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            listings                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The spaces `account` may at least view: those it owns, union those shared with it
pub async fn accessible_spaces(
    storage: &(dyn Backend + Send + Sync),
    account: &AccountId,
) -> Result<Vec<Space>> {
    let mut spaces = storage
        .spaces_for_account(account)
        .await
        .context(StorageSnafu)?;
    spaces.sort_by(|lhs, rhs| lhs.name().cmp(rhs.name()));
    Ok(spaces)
}

fn space_ids(spaces: &[Space]) -> Vec<SpaceId> {
    spaces.iter().map(Space::id).collect()
}

/// Everything the console needs to draw its clusters page: the caller's spaces & the clusters
/// within them
pub async fn list_clusters(
    storage: &(dyn Backend + Send + Sync),
    account: &AccountId,
) -> Result<(Vec<Space>, Vec<Cluster>)> {
    let spaces = accessible_spaces(storage, account).await?;
    let mut clusters = storage
        .clusters_in_spaces(&space_ids(&spaces))
        .await
        .context(StorageSnafu)?;
    clusters.sort_by(|lhs, rhs| lhs.name().cmp(rhs.name()));
    Ok((spaces, clusters))
}

/// Everything the console needs to draw its caches page: the caller's spaces & the caches within
/// them
pub async fn list_caches(
    storage: &(dyn Backend + Send + Sync),
    account: &AccountId,
) -> Result<(Vec<Space>, Vec<Cache>)> {
    let spaces = accessible_spaces(storage, account).await?;
    let mut caches = storage
        .caches_in_spaces(&space_ids(&spaces))
        .await
        .context(StorageSnafu)?;
    caches.sort_by(|lhs, rhs| lhs.name().cmp(rhs.name()));
    Ok((spaces, caches))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            mutation                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A tagged save operation
///
/// Insert-versus-update is decided by the caller, up-front; never inferred down here.
#[derive(Clone, Debug)]
pub enum Save<I, D> {
    /// Create a fresh document; the server assigns the id
    Insert(D),
    /// Fully replace the identified document; fails with a 404 if it's gone
    Update(I, D),
}

/// A cluster document as submitted for a save, sans identity
#[derive(Clone, Debug)]
pub struct ClusterDraft {
    pub space: SpaceId,
    pub name: String,
    pub discovery: Discovery,
    pub pub_pool_size: u32,
    pub sys_pool_size: u32,
    pub mgmt_pool_size: u32,
    pub p2p_pool_size: u32,
}

/// A cache document as submitted for a save, sans identity
#[derive(Clone, Debug)]
pub struct CacheDraft {
    pub space: SpaceId,
    pub name: String,
    pub mode: CacheMode,
    pub backups: u32,
    pub atomicity: CacheAtomicity,
    pub clusters: HashSet<ClusterId>,
}

/// A space document as submitted for a save, sans identity & owner
#[derive(Clone, Debug)]
pub struct SpaceDraft {
    pub name: String,
    pub used_by: HashMap<AccountId, Permission>,
}

/// Fetch `space` & prove the caller may write into it
///
/// A space that doesn't exist is a bad reference (400); one the caller can't write into, whether
/// unshared or shared read-only, is forbidden (403).
async fn writable_space(
    storage: &(dyn Backend + Send + Sync),
    account: &AccountId,
    space: &SpaceId,
) -> Result<Space> {
    let space = storage
        .space_by_id(space)
        .await
        .context(StorageSnafu)?
        .context(NoSuchSpaceSnafu { space: *space })?;
    match space.effective_permission(account) {
        Some(Permission::Full) => Ok(space),
        _ => ForbiddenSnafu { space: space.id() }.fail(),
    }
}

/// Save a cluster configuration & return the refreshed clusters listing
pub async fn save_cluster(
    storage: &(dyn Backend + Send + Sync),
    account: &Account,
    save: Save<ClusterId, ClusterDraft>,
) -> Result<(Vec<Space>, Vec<Cluster>)> {
    match save {
        Save::Insert(draft) => {
            writable_space(storage, &account.id(), &draft.space).await?;
            let cluster = draft_to_cluster(ClusterId::new(), draft)?;
            storage.add_cluster(&cluster).await.context(StorageSnafu)?;
        }
        Save::Update(id, draft) => {
            let extant = storage
                .cluster_by_id(&id)
                .await
                .context(StorageSnafu)?
                .context(NotFoundSnafu {
                    kind: "cluster",
                    id: id.to_string(),
                })?;
            writable_space(storage, &account.id(), &extant.space()).await?;
            // A save may move a cluster between spaces; the destination needs checking, too
            let moved = draft.space != extant.space();
            if moved {
                writable_space(storage, &account.id(), &draft.space).await?;
            }
            let cluster = draft_to_cluster(id, draft)?;
            storage
                .update_cluster(&cluster)
                .await
                .context(StorageSnafu)?;
            // A move strands the old space's cache references, which must never point outside
            // their own space; clear them just as a remove would.
            if moved {
                storage
                    .detach_cluster(&extant.space(), &id)
                    .await
                    .context(StorageSnafu)?;
            }
        }
    }
    list_clusters(storage, &account.id()).await
}

fn draft_to_cluster(id: ClusterId, draft: ClusterDraft) -> Result<Cluster> {
    Cluster::new(
        id,
        draft.space,
        &draft.name,
        draft.discovery,
        draft.pub_pool_size,
        draft.sys_pool_size,
        draft.mgmt_pool_size,
        draft.p2p_pool_size,
    )
    .context(DocumentSnafu)
}

/// Remove a cluster configuration & return the refreshed clusters listing
///
/// Clears the removed cluster from the `clusters` set of caches in the same space. Removing an
/// already-removed cluster is a 404; removing one whose space the caller can't even see is,
/// deliberately, also a 404.
pub async fn remove_cluster(
    storage: &(dyn Backend + Send + Sync),
    account: &Account,
    id: &ClusterId,
) -> Result<(Vec<Space>, Vec<Cluster>)> {
    let extant = storage
        .cluster_by_id(id)
        .await
        .context(StorageSnafu)?
        .context(NotFoundSnafu {
            kind: "cluster",
            id: id.to_string(),
        })?;
    let space = storage
        .space_by_id(&extant.space())
        .await
        .context(StorageSnafu)?
        .context(NoSuchSpaceSnafu {
            space: extant.space(),
        })?;
    match space.effective_permission(&account.id()) {
        Some(Permission::Full) => (),
        Some(Permission::View) => return ForbiddenSnafu { space: space.id() }.fail(),
        None => {
            return NotFoundSnafu {
                kind: "cluster",
                id: id.to_string(),
            }
            .fail()
        }
    }
    storage.remove_cluster(id).await.context(StorageSnafu)?;
    storage
        .detach_cluster(&space.id(), id)
        .await
        .context(StorageSnafu)?;
    list_clusters(storage, &account.id()).await
}

/// Save a cache configuration & return the refreshed caches listing
///
/// Every cluster the cache references must exist & live in the cache's own space.
pub async fn save_cache(
    storage: &(dyn Backend + Send + Sync),
    account: &Account,
    save: Save<CacheId, CacheDraft>,
) -> Result<(Vec<Space>, Vec<Cache>)> {
    match save {
        Save::Insert(draft) => {
            writable_space(storage, &account.id(), &draft.space).await?;
            check_cluster_refs(storage, &draft).await?;
            let cache = draft_to_cache(CacheId::new(), draft)?;
            storage.add_cache(&cache).await.context(StorageSnafu)?;
        }
        Save::Update(id, draft) => {
            let extant = storage
                .cache_by_id(&id)
                .await
                .context(StorageSnafu)?
                .context(NotFoundSnafu {
                    kind: "cache",
                    id: id.to_string(),
                })?;
            writable_space(storage, &account.id(), &extant.space()).await?;
            if draft.space != extant.space() {
                writable_space(storage, &account.id(), &draft.space).await?;
            }
            check_cluster_refs(storage, &draft).await?;
            let cache = draft_to_cache(id, draft)?;
            storage.update_cache(&cache).await.context(StorageSnafu)?;
        }
    }
    list_caches(storage, &account.id()).await
}

async fn check_cluster_refs(
    storage: &(dyn Backend + Send + Sync),
    draft: &CacheDraft,
) -> Result<()> {
    for id in &draft.clusters {
        let cluster = storage
            .cluster_by_id(id)
            .await
            .context(StorageSnafu)?
            .context(NoSuchClusterRefSnafu { cluster: *id })?;
        ensure!(
            cluster.space() == draft.space,
            ClusterSpaceMismatchSnafu {
                cluster: *id,
                space: draft.space,
            }
        );
    }
    Ok(())
}

fn draft_to_cache(id: CacheId, draft: CacheDraft) -> Result<Cache> {
    Cache::new(
        id,
        draft.space,
        &draft.name,
        draft.mode,
        draft.backups,
        draft.atomicity,
        draft.clusters,
    )
    .context(DocumentSnafu)
}

/// Remove a cache configuration & return the refreshed caches listing
pub async fn remove_cache(
    storage: &(dyn Backend + Send + Sync),
    account: &Account,
    id: &CacheId,
) -> Result<(Vec<Space>, Vec<Cache>)> {
    let extant = storage
        .cache_by_id(id)
        .await
        .context(StorageSnafu)?
        .context(NotFoundSnafu {
            kind: "cache",
            id: id.to_string(),
        })?;
    let space = storage
        .space_by_id(&extant.space())
        .await
        .context(StorageSnafu)?
        .context(NoSuchSpaceSnafu {
            space: extant.space(),
        })?;
    match space.effective_permission(&account.id()) {
        Some(Permission::Full) => (),
        Some(Permission::View) => return ForbiddenSnafu { space: space.id() }.fail(),
        None => {
            return NotFoundSnafu {
                kind: "cache",
                id: id.to_string(),
            }
            .fail()
        }
    }
    storage.remove_cache(id).await.context(StorageSnafu)?;
    list_caches(storage, &account.id()).await
}

/// Save a space & return the caller's refreshed space listing
///
/// Inserting creates a space owned by the caller. Updating replaces name & sharing; only the
/// owner may do so, and the owner & id never change. Grants naming unknown accounts are bad
/// references; a grant naming the owner is dropped (the owner's access is implicit).
pub async fn save_space(
    storage: &(dyn Backend + Send + Sync),
    account: &Account,
    save: Save<SpaceId, SpaceDraft>,
) -> Result<Vec<Space>> {
    match save {
        Save::Insert(draft) => {
            check_grants(storage, &draft.used_by).await?;
            let mut space = Space::new(&draft.name, account.id());
            for (grantee, permission) in draft.used_by {
                if grantee != account.id() {
                    space.share(grantee, permission);
                }
            }
            storage.add_space(&space).await.context(StorageSnafu)?;
        }
        Save::Update(id, draft) => {
            let extant = storage
                .space_by_id(&id)
                .await
                .context(StorageSnafu)?
                .context(NotFoundSnafu {
                    kind: "space",
                    id: id.to_string(),
                })?;
            ensure!(
                extant.owner() == account.id(),
                ForbiddenSnafu { space: id }
            );
            check_grants(storage, &draft.used_by).await?;
            let used_by = draft
                .used_by
                .into_iter()
                .filter(|(grantee, _)| *grantee != extant.owner())
                .collect();
            let space = extant.updated(&draft.name, used_by);
            storage.update_space(&space).await.context(StorageSnafu)?;
        }
    }
    accessible_spaces(storage, &account.id()).await
}

async fn check_grants(
    storage: &(dyn Backend + Send + Sync),
    used_by: &HashMap<AccountId, Permission>,
) -> Result<()> {
    for grantee in used_by.keys() {
        storage
            .account_by_id(grantee)
            .await
            .context(StorageSnafu)?
            .context(NoSuchAccountSnafu { account: *grantee })?;
    }
    Ok(())
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::{
        entities::{AccountEmail, DiscoveryKind, Username},
        memory::Store,
        peppers::Peppers,
    };

    use secrecy::SecretString;

    async fn test_account(store: &Store, username: &str, email: &str) -> Account {
        let peppers = Peppers::default();
        let (version, pepper) = peppers.current_pepper().unwrap();
        let account = Account::new(
            &version,
            &pepper,
            &Username::new(username).unwrap(),
            &SecretString::from("correct horse battery staple"),
            &AccountEmail::new(email).unwrap(),
        )
        .unwrap();
        store.add_account(&account).await.unwrap();
        account
    }

    fn cluster_draft(space: SpaceId, name: &str) -> ClusterDraft {
        ClusterDraft {
            space,
            name: name.to_owned(),
            discovery: Discovery {
                kind: DiscoveryKind::Vm,
                addresses: vec!["127.0.0.1:47500".to_owned()],
            },
            pub_pool_size: 8,
            sys_pool_size: 8,
            mgmt_pool_size: 4,
            p2p_pool_size: 2,
        }
    }

    fn cache_draft(space: SpaceId, name: &str, clusters: HashSet<ClusterId>) -> CacheDraft {
        CacheDraft {
            space,
            name: name.to_owned(),
            mode: CacheMode::Partitioned,
            backups: 1,
            atomicity: CacheAtomicity::Atomic,
            clusters,
        }
    }

    #[tokio::test]
    async fn test_owner_visibility() {
        let store = Store::new();
        let alice = test_account(&store, "alice", "alice@example.com").await;
        let bob = test_account(&store, "bob", "bob@example.com").await;
        let space = Space::new("Personal space", alice.id());
        store.add_space(&space).await.unwrap();

        let (spaces, clusters) =
            save_cluster(&store, &alice, Save::Insert(cluster_draft(space.id(), "prod")))
                .await
                .unwrap();
        assert_eq!(spaces.len(), 1);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].name(), "prod");

        // bob was never granted anything; he sees an empty console
        let (spaces, clusters) = list_clusters(&store, &bob.id()).await.unwrap();
        assert!(spaces.is_empty());
        assert!(clusters.is_empty());
    }

    #[tokio::test]
    async fn test_view_share_is_read_only() {
        let store = Store::new();
        let alice = test_account(&store, "alice", "alice@example.com").await;
        let bob = test_account(&store, "bob", "bob@example.com").await;
        let mut space = Space::new("Personal space", alice.id());
        space.share(bob.id(), Permission::View);
        store.add_space(&space).await.unwrap();

        let (_, clusters) =
            save_cluster(&store, &alice, Save::Insert(cluster_draft(space.id(), "prod")))
                .await
                .unwrap();

        // bob can see alice's cluster...
        let (spaces, visible) = list_clusters(&store, &bob.id()).await.unwrap();
        assert_eq!(spaces.len(), 1);
        assert_eq!(visible.len(), 1);

        // ...but writes bounce off, creating nothing
        let err = save_cluster(&store, &bob, Save::Insert(cluster_draft(space.id(), "rogue")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
        let err = remove_cluster(&store, &bob, &clusters[0].id())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
        let (_, still_there) = list_clusters(&store, &alice.id()).await.unwrap();
        assert_eq!(still_there.len(), 1);
    }

    #[tokio::test]
    async fn test_full_share_may_write() {
        let store = Store::new();
        let alice = test_account(&store, "alice", "alice@example.com").await;
        let bob = test_account(&store, "bob", "bob@example.com").await;
        let mut space = Space::new("Personal space", alice.id());
        space.share(bob.id(), Permission::Full);
        store.add_space(&space).await.unwrap();

        let (_, clusters) =
            save_cluster(&store, &bob, Save::Insert(cluster_draft(space.id(), "prod")))
                .await
                .unwrap();
        assert_eq!(clusters.len(), 1);

        // and the owner sees bob's work
        let (_, clusters) = list_clusters(&store, &alice.id()).await.unwrap();
        assert_eq!(clusters.len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let store = Store::new();
        let alice = test_account(&store, "alice", "alice@example.com").await;
        let space = Space::new("Personal space", alice.id());
        store.add_space(&space).await.unwrap();

        let (_, clusters) =
            save_cluster(&store, &alice, Save::Insert(cluster_draft(space.id(), "prod")))
                .await
                .unwrap();
        let id = clusters[0].id();

        let mut draft = cluster_draft(space.id(), "prod-2");
        draft.pub_pool_size = 16;
        let (_, clusters) = save_cluster(&store, &alice, Save::Update(id, draft))
            .await
            .unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].id(), id);
        assert_eq!(clusters[0].name(), "prod-2");
        assert_eq!(clusters[0].pub_pool_size(), 16);

        // updating a vanished cluster is a 404, not an upsert
        store.remove_cluster(&id).await.unwrap();
        let err = save_cluster(
            &store,
            &alice,
            Save::Update(id, cluster_draft(space.id(), "ghost")),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_twice() {
        let store = Store::new();
        let alice = test_account(&store, "alice", "alice@example.com").await;
        let space = Space::new("Personal space", alice.id());
        store.add_space(&space).await.unwrap();

        let (_, clusters) =
            save_cluster(&store, &alice, Save::Insert(cluster_draft(space.id(), "prod")))
                .await
                .unwrap();
        let id = clusters[0].id();
        let (_, clusters) = remove_cluster(&store, &alice, &id).await.unwrap();
        assert!(clusters.is_empty());
        let err = remove_cluster(&store, &alice, &id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_cache_cluster_refs() {
        let store = Store::new();
        let alice = test_account(&store, "alice", "alice@example.com").await;
        let space = Space::new("Personal space", alice.id());
        let other = Space::new("Second space", alice.id());
        store.add_space(&space).await.unwrap();
        store.add_space(&other).await.unwrap();

        let (_, clusters) =
            save_cluster(&store, &alice, Save::Insert(cluster_draft(space.id(), "prod")))
                .await
                .unwrap();
        let cluster = clusters[0].id();

        // a cache may reference clusters in its own space...
        let (_, caches) = save_cache(
            &store,
            &alice,
            Save::Insert(cache_draft(space.id(), "hot", HashSet::from([cluster]))),
        )
        .await
        .unwrap();
        assert_eq!(caches.len(), 1);

        // ...but not in another, even one the caller owns
        let err = save_cache(
            &store,
            &alice,
            Save::Insert(cache_draft(other.id(), "cold", HashSet::from([cluster]))),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ClusterSpaceMismatch { .. }));

        // and never a cluster that doesn't exist
        let err = save_cache(
            &store,
            &alice,
            Save::Insert(cache_draft(
                space.id(),
                "dangling",
                HashSet::from([ClusterId::new()]),
            )),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NoSuchClusterRef { .. }));
    }

    #[tokio::test]
    async fn test_remove_cluster_detaches_caches() {
        let store = Store::new();
        let alice = test_account(&store, "alice", "alice@example.com").await;
        let space = Space::new("Personal space", alice.id());
        store.add_space(&space).await.unwrap();

        let (_, clusters) =
            save_cluster(&store, &alice, Save::Insert(cluster_draft(space.id(), "prod")))
                .await
                .unwrap();
        let cluster = clusters[0].id();
        save_cache(
            &store,
            &alice,
            Save::Insert(cache_draft(space.id(), "hot", HashSet::from([cluster]))),
        )
        .await
        .unwrap();

        remove_cluster(&store, &alice, &cluster).await.unwrap();
        let (_, caches) = list_caches(&store, &alice.id()).await.unwrap();
        assert_eq!(caches.len(), 1);
        assert!(caches[0].clusters().is_empty());
    }

    #[tokio::test]
    async fn test_space_save() {
        let store = Store::new();
        let alice = test_account(&store, "alice", "alice@example.com").await;
        let bob = test_account(&store, "bob", "bob@example.com").await;
        let personal = Space::new("Personal space", alice.id());
        store.add_space(&personal).await.unwrap();

        // a second space, shared with bob read-only
        let spaces = save_space(
            &store,
            &alice,
            Save::Insert(SpaceDraft {
                name: "Team space".to_owned(),
                used_by: HashMap::from([(bob.id(), Permission::View)]),
            }),
        )
        .await
        .unwrap();
        assert_eq!(spaces.len(), 2);
        let team = spaces
            .iter()
            .find(|space| space.name() == "Team space")
            .unwrap()
            .clone();

        // only the owner may re-share
        let err = save_space(
            &store,
            &bob,
            Save::Update(
                team.id(),
                SpaceDraft {
                    name: "Bob's now".to_owned(),
                    used_by: HashMap::new(),
                },
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));

        // granting an unknown account is a bad reference
        let err = save_space(
            &store,
            &alice,
            Save::Update(
                team.id(),
                SpaceDraft {
                    name: "Team space".to_owned(),
                    used_by: HashMap::from([(AccountId::new(), Permission::Full)]),
                },
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NoSuchAccount { .. }));

        // promote bob to Full
        save_space(
            &store,
            &alice,
            Save::Update(
                team.id(),
                SpaceDraft {
                    name: "Team space".to_owned(),
                    used_by: HashMap::from([(bob.id(), Permission::Full)]),
                },
            ),
        )
        .await
        .unwrap();
        let refreshed = store.space_by_id(&team.id()).await.unwrap().unwrap();
        assert_eq!(
            refreshed.effective_permission(&bob.id()),
            Some(Permission::Full)
        );
    }
}
