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

use std::sync::Arc;

use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::{
    auth, caches, clusters, metrics, peppers::Peppers, spaces, storage::Backend as StorageBackend,
};

/// A serializable struct for use in HTTP error responses
///
/// Every API module's error type funnels through this on its way to the wire, so that all error
/// responses carry the same JSON body: `{"error": "..."}`.
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponseBody {
    pub error: String,
}

impl axum::response::IntoResponse for ErrorResponseBody {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

/// Application state available to all handlers
pub struct Gridconsole {
    pub storage: Arc<dyn StorageBackend + Send + Sync>,
    pub registry: prometheus::Registry,
    pub instruments: metrics::Instruments,
    pub peppers: Peppers,
    /// Lifetime of each login session, measured from the moment of login
    pub session_lifetime: chrono::Duration,
}

impl Gridconsole {
    pub fn new(
        storage: Arc<dyn StorageBackend + Send + Sync>,
        registry: prometheus::Registry,
        instruments: metrics::Instruments,
        peppers: Peppers,
        session_lifetime: chrono::Duration,
    ) -> Gridconsole {
        Gridconsole {
            storage,
            registry,
            instruments,
            peppers,
            session_lifetime,
        }
    }
}

/// Assemble the `/rest` API surface from the per-module routers
///
/// Broken-out so that the integration tests can drive the very same router the daemon serves.
pub fn make_rest_router(state: Arc<Gridconsole>) -> Router {
    Router::new()
        .merge(auth::make_router(state.clone()))
        .merge(clusters::make_router(state.clone()))
        .merge(caches::make_router(state.clone()))
        .merge(spaces::make_router(state))
}
