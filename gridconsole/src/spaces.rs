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

//! # Spaces API
//!
//! `GET /` lists the spaces the caller can see; `POST /save` creates a space owned by the caller,
//! or renames & re-shares one the caller owns. Ownership never moves, and there is no remove:
//! spaces anchor everything else in the console.

use std::{collections::HashMap, sync::Arc};

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
    entities::{Account, AccountId, Permission, Space, SpaceId},
    http::{ErrorResponseBody, Gridconsole},
    metrics::{self, Sort},
    storage::Backend as StorageBackend,
    visibility::{self, Save, SpaceDraft},
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

/// The spaces page, scoped to the caller
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SpacesRsp {
    pub spaces: Vec<Space>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             `GET /`                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("spaces.lists.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("spaces.lists.failures", Sort::IntegralCounter) }

async fn list(
    State(state): State<Arc<Gridconsole>>,
    account: StdResult<Extension<Account>, ExtensionRejection>,
) -> axum::response::Response {
    async fn list1(
        storage: &(dyn StorageBackend + Send + Sync),
        account: &Account,
    ) -> Result<SpacesRsp> {
        let spaces = visibility::accessible_spaces(storage, &account.id())
            .await
            .context(VisibilitySnafu)?;
        Ok(SpacesRsp { spaces })
    }

    let Ok(Extension(account)) = account else {
        counter_add!(state.instruments, "spaces.lists.failures", 1, &[]);
        return unauthorized();
    };
    match list1(state.storage.as_ref(), &account).await {
        Ok(rsp) => {
            counter_add!(state.instruments, "spaces.lists.successful", 1, &[]);
            (StatusCode::OK, Json(rsp)).into_response()
        }
        Err(err) => {
            error!("{:#?}", err);
            counter_add!(state.instruments, "spaces.lists.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           `POST /save`                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("spaces.saves.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("spaces.saves.failures", Sort::IntegralCounter) }

#[derive(Clone, Debug, Deserialize)]
struct SpaceSaveReq {
    #[serde(rename = "_id")]
    id: Option<SpaceId>,
    name: String,
    #[serde(rename = "usedBy", default)]
    used_by: HashMap<AccountId, Permission>,
}

impl SpaceSaveReq {
    fn into_save(self) -> Save<SpaceId, SpaceDraft> {
        let SpaceSaveReq { id, name, used_by } = self;
        let draft = SpaceDraft { name, used_by };
        match id {
            Some(id) => Save::Update(id, draft),
            None => Save::Insert(draft),
        }
    }
}

async fn save(
    State(state): State<Arc<Gridconsole>>,
    account: StdResult<Extension<Account>, ExtensionRejection>,
    Json(req): Json<SpaceSaveReq>,
) -> axum::response::Response {
    async fn save1(
        storage: &(dyn StorageBackend + Send + Sync),
        account: &Account,
        req: SpaceSaveReq,
    ) -> Result<SpacesRsp> {
        let spaces = visibility::save_space(storage, account, req.into_save())
            .await
            .context(VisibilitySnafu)?;
        Ok(SpacesRsp { spaces })
    }

    let Ok(Extension(account)) = account else {
        counter_add!(state.instruments, "spaces.saves.failures", 1, &[]);
        return unauthorized();
    };
    match save1(state.storage.as_ref(), &account, req).await {
        Ok(rsp) => {
            counter_add!(state.instruments, "spaces.saves.successful", 1, &[]);
            (StatusCode::OK, Json(rsp)).into_response()
        }
        Err(err) => {
            debug!("space save failed: {}", err);
            counter_add!(state.instruments, "spaces.saves.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return a router for the Spaces API; merged into the full REST surface
pub fn make_router(state: Arc<Gridconsole>) -> Router {
    Router::new()
        .route("/rest/spaces", get(list))
        .route("/rest/spaces/save", post(save))
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
