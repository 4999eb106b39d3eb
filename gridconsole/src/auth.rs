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

//! # Auth API
//!
//! Registration, login & logout. Registration is all-or-nothing: every account comes with a
//! personal space, and if the space can't be created the account is taken back. Login mints an
//! opaque session token; logout destroys it & is idempotent.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use snafu::{prelude::*, IntoError, Snafu};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};
use tracing::{debug, error, info};

use crate::{
    authn::{self, check_password, AuthnScheme},
    counter_add,
    entities::{self, Account, AccountEmail, AccountId, Session, Space, Username},
    http::{ErrorResponseBody, Gridconsole},
    metrics::{self, Sort},
    peppers,
    storage::{self, Backend as StorageBackend},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to add account: {source}"))]
    AddAccount { source: storage::Error },
    #[snafu(display("Failed to record session: {source}"))]
    AddSession { source: storage::Error },
    #[snafu(display("Failed to create personal space: {source}"))]
    AddSpace { source: storage::Error },
    #[snafu(display("Failed to create account: {source}"))]
    CreateAccount { source: entities::Error },
    #[snafu(display("Invalid credentials: {source}"))]
    InvalidCredentials { source: authn::Error },
    #[snafu(display("{source}"))]
    NoPepper { source: peppers::Error },
    #[snafu(display("Failed to unwind account {account}: {source}"))]
    RemoveAccount {
        account: AccountId,
        source: storage::Error,
    },
    #[snafu(display("Failed to destroy session: {source}"))]
    RemoveSession { source: storage::Error },
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            // The caller's fault-- tell them how to fix it
            Error::AddAccount {
                source: storage::Error::DuplicateAccount { email, .. },
            } => (
                StatusCode::CONFLICT,
                format!("An account already exists for {}", email),
            ),
            Error::CreateAccount {
                source: entities::Error::PasswordEntropy { feedback, .. },
            } => (StatusCode::BAD_REQUEST, format!("{}", feedback)),
            Error::CreateAccount {
                source: entities::Error::PasswordWhitespace { .. },
            } => (
                StatusCode::BAD_REQUEST,
                "Password rejected due to leading and/or trailing whitespace".to_owned(),
            ),
            // Authentication failure-- don't tell a potential attacker which part was wrong
            Error::InvalidCredentials { .. } => {
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            // Internal failure-- log the detail, own up to nothing more
            Error::AddAccount { .. }
            | Error::AddSession { .. }
            | Error::AddSpace { .. }
            | Error::CreateAccount { .. }
            | Error::NoPepper { .. }
            | Error::RemoveAccount { .. }
            | Error::RemoveSession { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            ),
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

/// The public fields of an [Account]; what register & login hand back
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AccountInfo {
    #[serde(rename = "_id")]
    pub id: AccountId,
    pub email: AccountEmail,
    pub username: Username,
}

impl From<&Account> for AccountInfo {
    fn from(account: &Account) -> AccountInfo {
        AccountInfo {
            id: account.id(),
            email: account.email().clone(),
            username: account.username().clone(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         `POST /register`                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("auth.registrations.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("auth.registrations.failures", Sort::IntegralCounter) }

#[derive(Clone, Debug, Deserialize)]
struct RegisterReq {
    email: AccountEmail,
    username: Username,
    password: SecretString,
}

/// Register a new account
///
/// Parameters:
///
/// - email: the new account's e-mail address; this is the login identity & must be unique
///
/// - username: a display name; alphanumeric, '-' & '_', three to sixteen characters
///
/// - password: arbitrary UTF-8 text; gridconsole stores only an Argon2id hash of the salted &
///   peppered password
///
/// A personal space is created along with the account. Should that fail, the account is removed
/// again; a registration either fully happens or leaves no trace.
async fn register(
    State(state): State<Arc<Gridconsole>>,
    Json(req): Json<RegisterReq>,
) -> axum::response::Response {
    async fn register1(state: &Gridconsole, req: &RegisterReq) -> Result<AccountInfo> {
        let (pepper_ver, pepper_key) = state.peppers.current_pepper().context(NoPepperSnafu)?;
        let account = Account::new(
            &pepper_ver,
            &pepper_key,
            &req.username,
            &req.password,
            &req.email,
        )
        .context(CreateAccountSnafu)?;
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        storage.add_account(&account).await.context(AddAccountSnafu)?;
        let space = Space::new("Personal space", account.id());
        if let Err(err) = storage.add_space(&space).await {
            // Unwind: no account without its personal space
            storage
                .remove_account(&account.id())
                .await
                .context(RemoveAccountSnafu {
                    account: account.id(),
                })?;
            return Err(AddSpaceSnafu.into_error(err));
        }
        Ok(AccountInfo::from(&account))
    }

    match register1(&state, &req).await {
        Ok(rsp) => {
            info!("Created account {}", req.username);
            counter_add!(state.instruments, "auth.registrations.successful", 1, &[]);
            (StatusCode::CREATED, Json(rsp)).into_response()
        }
        Err(err) => {
            error!("{:#?}", err);
            counter_add!(state.instruments, "auth.registrations.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          `POST /login`                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("auth.logins.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("auth.logins.failures", Sort::IntegralCounter) }

#[derive(Clone, Debug, Deserialize)]
struct LoginReq {
    email: AccountEmail,
    password: SecretString,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LoginRsp {
    pub token: String,
    pub account: AccountInfo,
}

/// Login to an existing account
///
/// Vends the session token to be supplied in the Authorization header (with the bearer scheme) in
/// subsequent requests.
async fn login(
    State(state): State<Arc<Gridconsole>>,
    Json(req): Json<LoginReq>,
) -> axum::response::Response {
    async fn login1(state: &Gridconsole, req: &LoginReq) -> Result<LoginRsp> {
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let account = check_password(storage, &state.peppers, &req.email, req.password.clone())
            .await
            .context(InvalidCredentialsSnafu)?;
        let session = Session::new(account.id(), state.session_lifetime);
        storage.add_session(&session).await.context(AddSessionSnafu)?;
        Ok(LoginRsp {
            token: session.token().to_owned(),
            account: AccountInfo::from(&account),
        })
    }

    match login1(&state, &req).await {
        Ok(rsp) => {
            info!("Logged-in account {}", rsp.account.username);
            counter_add!(state.instruments, "auth.logins.successful", 1, &[]);
            (StatusCode::OK, Json(rsp)).into_response()
        }
        Err(err) => {
            debug!("login failed: {}", err);
            counter_add!(state.instruments, "auth.logins.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          `GET /logout`                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("auth.logouts.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("auth.logouts.failures", Sort::IntegralCounter) }

/// Destroy the presented session
///
/// Idempotent: a missing Authorization header, or a token that no longer names a live session, is
/// still a 204. This endpoint sits outside the authentication middleware for exactly that reason;
/// a second logout with a dead token mustn't bounce with a 401.
async fn logout(State(state): State<Arc<Gridconsole>>, headers: HeaderMap) -> axum::response::Response {
    async fn logout1(state: &Gridconsole, headers: &HeaderMap) -> Result<()> {
        let Some(header_val) = headers.get(header::AUTHORIZATION) else {
            return Ok(());
        };
        if let AuthnScheme::BearerToken(token) =
            AuthnScheme::try_from(header_val).context(InvalidCredentialsSnafu)?
        {
            state
                .storage
                .remove_session(&token)
                .await
                .context(RemoveSessionSnafu)?;
        }
        Ok(())
    }

    match logout1(&state, &headers).await {
        Ok(_) => {
            counter_add!(state.instruments, "auth.logouts.successful", 1, &[]);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            debug!("logout failed: {}", err);
            counter_add!(state.instruments, "auth.logouts.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return a router for the Auth API; merged into the full REST surface
///
/// Unlike the other API routers, this one carries no authentication middleware: registration &
/// login are how callers *become* authenticated, and logout must stay idempotent even for tokens
/// already destroyed.
pub fn make_router(state: Arc<Gridconsole>) -> Router {
    Router::new()
        .route("/rest/auth/register", post(register))
        .route("/rest/auth/login", post(login))
        .route("/rest/auth/logout", get(logout))
        .layer(SetResponseHeaderLayer::if_not_present(
            CONTENT_TYPE,
            HeaderValue::from_static("text/json; charset=utf-8"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
