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

//! # Clusters API
//!
//! `GET /` lists the caller's spaces & the clusters within them; `POST /save` inserts or updates a
//! cluster configuration (insert-versus-update decided by the presence of `_id` in the request
//! document); `POST /remove` deletes one. Mutations answer with the refreshed listing so the
//! console can redraw from a single response.

use std::sync::Arc;

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
    entities::{Account, Cluster, ClusterId, Discovery, Space, SpaceId},
    http::{ErrorResponseBody, Gridconsole},
    metrics::{self, Sort},
    storage::Backend as StorageBackend,
    visibility::{self, ClusterDraft, Save},
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

/// The clusters page, scoped to the caller
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClustersRsp {
    pub spaces: Vec<Space>,
    pub clusters: Vec<Cluster>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             `GET /`                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("clusters.lists.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("clusters.lists.failures", Sort::IntegralCounter) }

async fn list(
    State(state): State<Arc<Gridconsole>>,
    account: StdResult<Extension<Account>, ExtensionRejection>,
) -> axum::response::Response {
    async fn list1(
        storage: &(dyn StorageBackend + Send + Sync),
        account: &Account,
    ) -> Result<ClustersRsp> {
        let (spaces, clusters) = visibility::list_clusters(storage, &account.id())
            .await
            .context(VisibilitySnafu)?;
        Ok(ClustersRsp { spaces, clusters })
    }

    let Ok(Extension(account)) = account else {
        counter_add!(state.instruments, "clusters.lists.failures", 1, &[]);
        return unauthorized();
    };
    match list1(state.storage.as_ref(), &account).await {
        Ok(rsp) => {
            counter_add!(state.instruments, "clusters.lists.successful", 1, &[]);
            (StatusCode::OK, Json(rsp)).into_response()
        }
        Err(err) => {
            error!("{:#?}", err);
            counter_add!(state.instruments, "clusters.lists.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           `POST /save`                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("clusters.saves.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("clusters.saves.failures", Sort::IntegralCounter) }

#[derive(Clone, Debug, Deserialize)]
struct ClusterSaveReq {
    #[serde(rename = "_id")]
    id: Option<ClusterId>,
    space: SpaceId,
    name: String,
    #[serde(default)]
    discovery: Discovery,
    #[serde(rename = "pubPoolSize", default)]
    pub_pool_size: u32,
    #[serde(rename = "sysPoolSize", default)]
    sys_pool_size: u32,
    #[serde(rename = "mgmtPoolSize", default)]
    mgmt_pool_size: u32,
    #[serde(rename = "p2pPoolSize", default)]
    p2p_pool_size: u32,
}

impl ClusterSaveReq {
    fn into_save(self) -> Save<ClusterId, ClusterDraft> {
        let ClusterSaveReq {
            id,
            space,
            name,
            discovery,
            pub_pool_size,
            sys_pool_size,
            mgmt_pool_size,
            p2p_pool_size,
        } = self;
        let draft = ClusterDraft {
            space,
            name,
            discovery,
            pub_pool_size,
            sys_pool_size,
            mgmt_pool_size,
            p2p_pool_size,
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
    Json(req): Json<ClusterSaveReq>,
) -> axum::response::Response {
    async fn save1(
        storage: &(dyn StorageBackend + Send + Sync),
        account: &Account,
        req: ClusterSaveReq,
    ) -> Result<ClustersRsp> {
        let (spaces, clusters) = visibility::save_cluster(storage, account, req.into_save())
            .await
            .context(VisibilitySnafu)?;
        Ok(ClustersRsp { spaces, clusters })
    }

    let Ok(Extension(account)) = account else {
        counter_add!(state.instruments, "clusters.saves.failures", 1, &[]);
        return unauthorized();
    };
    match save1(state.storage.as_ref(), &account, req).await {
        Ok(rsp) => {
            counter_add!(state.instruments, "clusters.saves.successful", 1, &[]);
            (StatusCode::OK, Json(rsp)).into_response()
        }
        Err(err) => {
            debug!("cluster save failed: {}", err);
            counter_add!(state.instruments, "clusters.saves.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          `POST /remove`                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("clusters.removes.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("clusters.removes.failures", Sort::IntegralCounter) }

#[derive(Clone, Debug, Deserialize)]
struct ClusterRemoveReq {
    #[serde(rename = "_id")]
    id: ClusterId,
}

async fn remove(
    State(state): State<Arc<Gridconsole>>,
    account: StdResult<Extension<Account>, ExtensionRejection>,
    Json(req): Json<ClusterRemoveReq>,
) -> axum::response::Response {
    async fn remove1(
        storage: &(dyn StorageBackend + Send + Sync),
        account: &Account,
        id: &ClusterId,
    ) -> Result<ClustersRsp> {
        let (spaces, clusters) = visibility::remove_cluster(storage, account, id)
            .await
            .context(VisibilitySnafu)?;
        Ok(ClustersRsp { spaces, clusters })
    }

    let Ok(Extension(account)) = account else {
        counter_add!(state.instruments, "clusters.removes.failures", 1, &[]);
        return unauthorized();
    };
    match remove1(state.storage.as_ref(), &account, &req.id).await {
        Ok(rsp) => {
            counter_add!(state.instruments, "clusters.removes.successful", 1, &[]);
            (StatusCode::OK, Json(rsp)).into_response()
        }
        Err(err) => {
            debug!("cluster remove failed: {}", err);
            counter_add!(state.instruments, "clusters.removes.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return a router for the Clusters API; merged into the full REST surface
pub fn make_router(state: Arc<Gridconsole>) -> Router {
    Router::new()
        .route("/rest/clusters", get(list))
        .route("/rest/clusters/save", post(save))
        .route("/rest/clusters/remove", post(remove))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            authn::authenticate,
        ))
        // All responses are JSON; add the appropriate Content-Type header (but leave the existing
        // Content-Type header should a handler set it specially).
        .layer(SetResponseHeaderLayer::if_not_present(
            CONTENT_TYPE,
            HeaderValue::from_static("text/json; charset=utf-8"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
