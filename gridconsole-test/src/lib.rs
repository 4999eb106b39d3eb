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

//! # The gridconsole Integration Tests
//!
//! These tests drive the very same [Router](axum::Router) that `gridconsoled` serves, in-process,
//! by way of [tower::ServiceExt::oneshot]: no listening socket, no live database. The storage
//! backend is the in-memory [Store](gridconsole::memory::Store), which implements the same
//! [Backend](gridconsole::storage::Backend) contract as ScyllaDB. Anything that can only go
//! wrong against a real cluster (CQL serialization, prepared statements & so on) is out of scope
//! here.
//!
//! Code applicable to all of the integration tests (building a test state, sending requests,
//! registering & logging-in) belongs here; the test programs themselves go in `tests`.

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tower::ServiceExt;

use gridconsole::{
    auth::{AccountInfo, LoginRsp},
    entities::{AccountId, Permission, Space},
    http::{make_rest_router, Gridconsole},
    memory::Store,
    metrics::Instruments,
    peppers::Peppers,
    spaces::SpacesRsp,
};

pub type Error = Box<dyn std::error::Error>;

pub type Result<T> = std::result::Result<T, Error>;

/// Build application state backed by in-process storage
pub fn make_test_state() -> Arc<Gridconsole> {
    make_test_state_with_lifetime(chrono::Duration::hours(1))
}

/// [make_test_state], but with the given session lifetime (zero mints sessions born expired)
pub fn make_test_state_with_lifetime(session_lifetime: chrono::Duration) -> Arc<Gridconsole> {
    Arc::new(Gridconsole::new(
        Arc::new(Store::new()),
        prometheus::Registry::new(),
        Instruments::new("gridconsole"),
        Peppers::default(),
        session_lifetime,
    ))
}

/// Build the `/rest` router over fresh, empty, in-process storage
pub fn make_test_router() -> Router {
    make_rest_router(make_test_state())
}

pub fn get(target: &str, token: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(Method::GET).uri(target);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    Ok(builder.body(Body::empty())?)
}

pub fn post(target: &str, token: Option<&str>, body: &serde_json::Value) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(target)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    Ok(builder.body(Body::from(serde_json::to_vec(body)?))?)
}

/// Send `request` through `router`; hand back the response status & body
pub async fn call(router: &Router, request: Request<Body>) -> Result<(StatusCode, Vec<u8>)> {
    let rsp = router.clone().oneshot(request).await?;
    let status = rsp.status();
    let body = rsp.into_body().collect().await?.to_bytes().to_vec();
    Ok((status, body))
}

/// [call], deserializing the response body as `T`
pub async fn call_json<T: DeserializeOwned>(
    router: &Router,
    request: Request<Body>,
) -> Result<(StatusCode, T)> {
    let (status, body) = call(router, request).await?;
    Ok((status, serde_json::from_slice(&body)?))
}

pub async fn register(
    router: &Router,
    email: &str,
    username: &str,
    password: &str,
) -> Result<(StatusCode, Vec<u8>)> {
    call(
        router,
        post(
            "/rest/auth/register",
            None,
            &serde_json::json!({"email": email, "username": username, "password": password}),
        )?,
    )
    .await
}

pub async fn register_ok(
    router: &Router,
    email: &str,
    username: &str,
    password: &str,
) -> Result<AccountInfo> {
    let (status, body) = register(router, email, username, password).await?;
    assert_eq!(StatusCode::CREATED, status);
    Ok(serde_json::from_slice(&body)?)
}

pub async fn login_ok(router: &Router, email: &str, password: &str) -> Result<LoginRsp> {
    let (status, rsp) = call_json::<LoginRsp>(
        router,
        post(
            "/rest/auth/login",
            None,
            &serde_json::json!({"email": email, "password": password}),
        )?,
    )
    .await?;
    assert_eq!(StatusCode::OK, status);
    Ok(rsp)
}

pub async fn register_and_login(
    router: &Router,
    email: &str,
    username: &str,
    password: &str,
) -> Result<LoginRsp> {
    let _ = register_ok(router, email, username, password).await?;
    login_ok(router, email, password).await
}

/// Fetch the caller's personal space (i.e. the space registration made for them)
pub async fn personal_space(router: &Router, token: &str) -> Result<Space> {
    let (status, rsp) =
        call_json::<SpacesRsp>(router, get("/rest/spaces", Some(token))?).await?;
    assert_eq!(StatusCode::OK, status);
    rsp.spaces
        .into_iter()
        .find(|space| space.name() == "Personal space")
        .ok_or_else(|| Error::from("no personal space"))
}

/// JSON value for a `usedBy` share map; convenient for building space save requests
pub fn used_by(grants: &[(AccountId, Permission)]) -> Result<serde_json::Value> {
    let map: HashMap<AccountId, Permission> = grants.iter().copied().collect();
    Ok(serde_json::to_value(&map)?)
}
