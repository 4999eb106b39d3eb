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

//! # memory
//!
//! In-process implementation of [storage::Backend] over `RwLock`ed maps. Used for development and
//! for tests; it holds nothing across restarts. Every method clones on the way in & out, so no
//! caller can alias the store's own state.

use std::{
    collections::HashMap,
    sync::RwLock,
};

use async_trait::async_trait;

use crate::{
    entities::{Account, AccountId, Cache, CacheId, Cluster, ClusterId, Session, Space, SpaceId},
    storage::{self, DuplicateAccountSnafu, NotFoundSnafu},
};

type Result<T> = std::result::Result<T, storage::Error>;

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    spaces: HashMap<SpaceId, Space>,
    clusters: HashMap<ClusterId, Cluster>,
    caches: HashMap<CacheId, Cache>,
    sessions: HashMap<String, Session>,
}

/// An in-memory document store
#[derive(Debug, Default)]
pub struct Store {
    state: RwLock<State>,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }
}

#[async_trait]
impl storage::Backend for Store {
    async fn add_account(&self, account: &Account) -> Result<()> {
        use snafu::ensure;
        let mut state = self.state.write().expect("lock poisoned");
        ensure!(
            !state
                .accounts
                .values()
                .any(|extant| extant.email() == account.email()),
            DuplicateAccountSnafu {
                email: account.email().to_string(),
            }
        );
        state.accounts.insert(account.id(), account.clone());
        Ok(())
    }
    async fn account_by_id(&self, id: &AccountId) -> Result<Option<Account>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.accounts.get(id).cloned())
    }
    async fn account_for_email(&self, email: &str) -> Result<Option<Account>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .accounts
            .values()
            .find(|account| account.email().as_ref() == email)
            .cloned())
    }
    async fn remove_account(&self, id: &AccountId) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state.accounts.remove(id);
        Ok(())
    }

    async fn add_space(&self, space: &Space) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state.spaces.insert(space.id(), space.clone());
        Ok(())
    }
    async fn space_by_id(&self, id: &SpaceId) -> Result<Option<Space>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.spaces.get(id).cloned())
    }
    async fn spaces_for_account(&self, account: &AccountId) -> Result<Vec<Space>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .spaces
            .values()
            .filter(|space| space.owner() == *account || space.used_by().contains_key(account))
            .cloned()
            .collect())
    }
    async fn update_space(&self, space: &Space) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        match state.spaces.get_mut(&space.id()) {
            Some(extant) => {
                *extant = space.clone();
                Ok(())
            }
            None => NotFoundSnafu {
                kind: "space",
                id: space.id().to_string(),
            }
            .fail(),
        }
    }

    async fn add_cluster(&self, cluster: &Cluster) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state.clusters.insert(cluster.id(), cluster.clone());
        Ok(())
    }
    async fn cluster_by_id(&self, id: &ClusterId) -> Result<Option<Cluster>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.clusters.get(id).cloned())
    }
    async fn clusters_in_spaces(&self, spaces: &[SpaceId]) -> Result<Vec<Cluster>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .clusters
            .values()
            .filter(|cluster| spaces.contains(&cluster.space()))
            .cloned()
            .collect())
    }
    async fn remove_cluster(&self, id: &ClusterId) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state
            .clusters
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| {
                NotFoundSnafu {
                    kind: "cluster",
                    id: id.to_string(),
                }
                .build()
            })
    }
    async fn update_cluster(&self, cluster: &Cluster) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        match state.clusters.get_mut(&cluster.id()) {
            Some(extant) => {
                *extant = cluster.clone();
                Ok(())
            }
            None => NotFoundSnafu {
                kind: "cluster",
                id: cluster.id().to_string(),
            }
            .fail(),
        }
    }

    async fn add_cache(&self, cache: &Cache) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state.caches.insert(cache.id(), cache.clone());
        Ok(())
    }
    async fn cache_by_id(&self, id: &CacheId) -> Result<Option<Cache>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.caches.get(id).cloned())
    }
    async fn caches_in_spaces(&self, spaces: &[SpaceId]) -> Result<Vec<Cache>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .caches
            .values()
            .filter(|cache| spaces.contains(&cache.space()))
            .cloned()
            .collect())
    }
    async fn detach_cluster(&self, space: &SpaceId, cluster: &ClusterId) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state
            .caches
            .values_mut()
            .filter(|cache| cache.space() == *space)
            .for_each(|cache| {
                cache.detach_cluster(cluster);
            });
        Ok(())
    }
    async fn remove_cache(&self, id: &CacheId) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state
            .caches
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| {
                NotFoundSnafu {
                    kind: "cache",
                    id: id.to_string(),
                }
                .build()
            })
    }
    async fn update_cache(&self, cache: &Cache) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        match state.caches.get_mut(&cache.id()) {
            Some(extant) => {
                *extant = cache.clone();
                Ok(())
            }
            None => NotFoundSnafu {
                kind: "cache",
                id: cache.id().to_string(),
            }
            .fail(),
        }
    }

    async fn add_session(&self, session: &Session) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state
            .sessions
            .insert(session.token().to_owned(), session.clone());
        Ok(())
    }
    async fn session_for_token(&self, token: &str) -> Result<Option<Session>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.sessions.get(token).cloned())
    }
    async fn remove_session(&self, token: &str) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state.sessions.remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::{
        entities::{AccountEmail, Permission, Username},
        peppers::Peppers,
        storage::Backend,
    };

    use secrecy::SecretString;

    fn test_account(username: &str, email: &str, peppers: &Peppers) -> Account {
        let (version, pepper) = peppers.current_pepper().unwrap();
        Account::new(
            &version,
            &pepper,
            &Username::new(username).unwrap(),
            &SecretString::from("correct horse battery staple"),
            &AccountEmail::new(email).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_accounts() {
        let peppers = Peppers::default();
        let store = Store::new();
        let alice = test_account("alice", "alice@example.com", &peppers);
        store.add_account(&alice).await.unwrap();
        // Same address, different display name: still a collision
        let also_alice = test_account("alice2", "alice@example.com", &peppers);
        assert!(matches!(
            store.add_account(&also_alice).await,
            Err(storage::Error::DuplicateAccount { .. })
        ));
        let found = store
            .account_for_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id(), alice.id());
    }

    #[tokio::test]
    async fn test_space_visibility() {
        let peppers = Peppers::default();
        let store = Store::new();
        let alice = test_account("alice", "alice@example.com", &peppers);
        let bob = test_account("bob", "bob@example.com", &peppers);
        store.add_account(&alice).await.unwrap();
        store.add_account(&bob).await.unwrap();

        let mut space = Space::new("Personal space", alice.id());
        store.add_space(&space).await.unwrap();
        assert_eq!(store.spaces_for_account(&alice.id()).await.unwrap().len(), 1);
        assert!(store.spaces_for_account(&bob.id()).await.unwrap().is_empty());

        space.share(bob.id(), Permission::View);
        store.update_space(&space).await.unwrap();
        assert_eq!(store.spaces_for_account(&bob.id()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_twice() {
        let store = Store::new();
        let space = SpaceId::new();
        let cluster = Cluster::new(
            ClusterId::new(),
            space,
            "staging",
            Default::default(),
            8,
            8,
            4,
            2,
        )
        .unwrap();
        store.add_cluster(&cluster).await.unwrap();
        store.remove_cluster(&cluster.id()).await.unwrap();
        assert!(matches!(
            store.remove_cluster(&cluster.id()).await,
            Err(storage::Error::NotFound { .. })
        ));
    }
}
