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

//! # Caches API
//!
//! The cache counterpart to [clusters]: list, save & remove cache configurations within the
//! caller's spaces. A cache may name the clusters it's deployed on, but only clusters in its own
//! space.
//!
//! [clusters]: crate::clusters

use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{rejection::ExtensionRejection, State},
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use snafu::{prelude::*, Snafu};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};
use tracing::{debug, error};

use crate::{
    authn, counter_add,
    entities::{Account, Cache, CacheAtomicity, CacheId, CacheMode, ClusterId, Space, SpaceId},
    http::{ErrorResponseBody, Gridconsole},
    metrics::{self, Sort},
    storage::Backend as StorageBackend,
    visibility::{self, CacheDraft, Save},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{source}"))]
    Visibility { source: visibility::Error },
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            Error::Visibility { source } => source.as_status_and_msg(),
        }
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (code, msg) = self.as_status_and_msg();
        (code, Json(ErrorResponseBody { error: msg })).into_response()
    }
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

fn unauthorized() -> axum::response::Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponseBody {
            error: "Unauthorized".to_owned(),
        }),
    )
        .into_response()
}

/// The caches page, scoped to the caller
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CachesRsp {
    pub spaces: Vec<Space>,
    pub caches: Vec<Cache>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             `GET /`                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("caches.lists.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("caches.lists.failures", Sort::IntegralCounter) }

async fn list(
    State(state): State<Arc<Gridconsole>>,
    account: StdResult<Extension<Account>, ExtensionRejection>,
) -> axum::response::Response {
    async fn list1(
        storage: &(dyn StorageBackend + Send + Sync),
        account: &Account,
    ) -> Result<CachesRsp> {
        let (spaces, caches) = visibility::list_caches(storage, &account.id())
            .await
            .context(VisibilitySnafu)?;
        Ok(CachesRsp { spaces, caches })
    }

    let Ok(Extension(account)) = account else {
        counter_add!(state.instruments, "caches.lists.failures", 1, &[]);
        return unauthorized();
    };
    match list1(state.storage.as_ref(), &account).await {
        Ok(rsp) => {
            counter_add!(state.instruments, "caches.lists.successful", 1, &[]);
            (StatusCode::OK, Json(rsp)).into_response()
        }
        Err(err) => {
            error!("{:#?}", err);
            counter_add!(state.instruments, "caches.lists.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           `POST /save`                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("caches.saves.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("caches.saves.failures", Sort::IntegralCounter) }

#[derive(Clone, Debug, Deserialize)]
struct CacheSaveReq {
    #[serde(rename = "_id")]
    id: Option<CacheId>,
    space: SpaceId,
    name: String,
    mode: CacheMode,
    #[serde(default)]
    backups: u32,
    atomicity: CacheAtomicity,
    #[serde(default)]
    clusters: HashSet<ClusterId>,
}

impl CacheSaveReq {
    fn into_save(self) -> Save<CacheId, CacheDraft> {
        let CacheSaveReq {
            id,
            space,
            name,
            mode,
            backups,
            atomicity,
            clusters,
        } = self;
        let draft = CacheDraft {
            space,
            name,
            mode,
            backups,
            atomicity,
            clusters,
        };
        match id {
            Some(id) => Save::Update(id, draft),
            None => Save::Insert(draft),
        }
    }
}

async fn save(
    State(state): State<Arc<Gridconsole>>,
    account: StdResult<Extension<Account>, ExtensionRejection>,
    Json(req): Json<CacheSaveReq>,
) -> axum::response::Response {
    async fn save1(
        storage: &(dyn StorageBackend + Send + Sync),
        account: &Account,
        req: CacheSaveReq,
    ) -> Result<CachesRsp> {
        let (spaces, caches) = visibility::save_cache(storage, account, req.into_save())
            .await
            .context(VisibilitySnafu)?;
        Ok(CachesRsp { spaces, caches })
    }

    let Ok(Extension(account)) = account else {
        counter_add!(state.instruments, "caches.saves.failures", 1, &[]);
        return unauthorized();
    };
    match save1(state.storage.as_ref(), &account, req).await {
        Ok(rsp) => {
            counter_add!(state.instruments, "caches.saves.successful", 1, &[]);
            (StatusCode::OK, Json(rsp)).into_response()
        }
        Err(err) => {
            debug!("cache save failed: {}", err);
            counter_add!(state.instruments, "caches.saves.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          `POST /remove`                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("caches.removes.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("caches.removes.failures", Sort::IntegralCounter) }

#[derive(Clone, Debug, Deserialize)]
struct CacheRemoveReq {
    #[serde(rename = "_id")]
    id: CacheId,
}

async fn remove(
    State(state): State<Arc<Gridconsole>>,
    account: StdResult<Extension<Account>, ExtensionRejection>,
    Json(req): Json<CacheRemoveReq>,
) -> axum::response::Response {
    async fn remove1(
        storage: &(dyn StorageBackend + Send + Sync),
        account: &Account,
        id: &CacheId,
    ) -> Result<CachesRsp> {
        let (spaces, caches) = visibility::remove_cache(storage, account, id)
            .await
            .context(VisibilitySnafu)?;
        Ok(CachesRsp { spaces, caches })
    }

    let Ok(Extension(account)) = account else {
        counter_add!(state.instruments, "caches.removes.failures", 1, &[]);
        return unauthorized();
    };
    match remove1(state.storage.as_ref(), &account, &req.id).await {
        Ok(rsp) => {
            counter_add!(state.instruments, "caches.removes.successful", 1, &[]);
            (StatusCode::OK, Json(rsp)).into_response()
        }
        Err(err) => {
            debug!("cache remove failed: {}", err);
            counter_add!(state.instruments, "caches.removes.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return a router for the Caches API; merged into the full REST surface
pub fn make_router(state: Arc<Gridconsole>) -> Router {
    Router::new()
        .route("/rest/caches", get(list))
        .route("/rest/caches/save", post(save))
        .route("/rest/caches/remove", post(remove))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            authn::authenticate,
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            CONTENT_TYPE,
            HeaderValue::from_static("text/json; charset=utf-8"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
