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

//! # gridconsole authentication support
//!
//! The console logs in once with e-mail & password ("basic") and thereafter presents the session
//! token it was handed ("bearer"). Scheme parsing, credential checking & the authentication
//! middleware all live here; minting & destroying sessions is the [auth] API's business.
//!
//! [auth]: crate::auth

use std::{string::FromUtf8Error, sync::Arc};

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{prelude::BASE64_STANDARD, Engine};
use http::StatusCode;
use itertools::Itertools;
use secrecy::SecretString;
use snafu::{Backtrace, OptionExt, ResultExt, Snafu};
use tap::Pipe;
use tracing::debug;

use crate::{
    counter_add,
    entities::{self, Account, AccountEmail},
    http::{ErrorResponseBody, Gridconsole},
    metrics::{self, Sort},
    peppers::Peppers,
    storage::Backend as StorageBackend,
    util::exactly_two,
};

/// authentication Error type
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to lookup account {email}: {source}"))]
    Account {
        email: AccountEmail,
        source: crate::storage::Error,
    },
    #[snafu(display("An Authorization header had a value that couldn't be parsed."))]
    BadAuthHeaderParse {
        value: HeaderValue,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to decode base64 field: {source}"))]
    BadBase64Encoding {
        text: String,
        source: base64::DecodeError,
        backtrace: Backtrace,
    },
    #[snafu(display("{email} is not a valid e-mail address"))]
    BadEmail {
        email: String,
        #[snafu(source(from(entities::Error, Box::new)))]
        source: Box<entities::Error>,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to validate password for {email}: {source}"))]
    BadPassword {
        email: AccountEmail,
        #[snafu(source(from(entities::Error, Box::new)))]
        source: Box<entities::Error>,
    },
    #[snafu(display("The presented session has expired"))]
    ExpiredSession { backtrace: Backtrace },
    #[snafu(display("An Authorization header had a non-textual value: {source}"))]
    InvalidAuthHeaderValue {
        value: HeaderValue,
        source: axum::http::header::ToStrError,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to find a colon in '{text}'"))]
    MissingColon { text: String, backtrace: Backtrace },
    #[snafu(display("Multiple Authorization headers found"))]
    MultipleAuthnHeaders { backtrace: Backtrace },
    #[snafu(display("No authentication token found"))]
    NoAuthToken { backtrace: Backtrace },
    #[snafu(display("The text was not valid UTF-8"))]
    NotUtf8 {
        source: FromUtf8Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to lookup session: {source}"))]
    Session { source: crate::storage::Error },
    #[snafu(display("Unknown account {email}"))]
    UnknownAccount { email: AccountEmail },
    #[snafu(display("Unknown session token presented"))]
    UnknownSession { backtrace: Backtrace },
    #[snafu(display("Authorization scheme {scheme} not supported"))]
    UnsupportedAuthScheme { scheme: String, backtrace: Backtrace },
}

impl Error {
    /// Squash this failure down for the wire. Anything stemming from the credentials themselves
    /// comes back as a featureless 401; no caller gets to learn *which* part was wrong.
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            Error::BadAuthHeaderParse { .. }
            | Error::BadBase64Encoding { .. }
            | Error::BadEmail { .. }
            | Error::InvalidAuthHeaderValue { .. }
            | Error::MissingColon { .. }
            | Error::MultipleAuthnHeaders { .. }
            | Error::NotUtf8 { .. }
            | Error::UnsupportedAuthScheme { .. } => {
                (StatusCode::BAD_REQUEST, format!("{}", self))
            }
            Error::BadPassword { .. }
            | Error::ExpiredSession { .. }
            | Error::NoAuthToken { .. }
            | Error::UnknownAccount { .. }
            | Error::UnknownSession { .. } => {
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            Error::Account { .. } | Error::Session { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            ),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (code, msg) = self.as_status_and_msg();
        (code, axum::Json(ErrorResponseBody { error: msg })).into_response()
    }
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                     Authorization Schemes                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Authorization schemes
///
/// "Basic" carries e-mail & password (base64-encoded, as ever); it's how the console logs in.
/// "Bearer" carries the opaque session token minted at login; it's how everything else
/// authenticates.
#[derive(Clone, Debug)]
pub enum AuthnScheme {
    // Authorization: Bearer <64 hex digits>
    BearerToken(String),
    // Authorization: Basic base64(<email>:<password>)
    Basic((AccountEmail, SecretString)),
}

impl AuthnScheme {
    /// Create an AuthnScheme instance from the base64 encoding of "email:password"
    pub fn from_basic(payload: &str) -> Result<AuthnScheme> {
        let (email, password) = BASE64_STANDARD
            .decode(payload)
            .context(BadBase64EncodingSnafu {
                text: payload.to_owned(),
            })?
            .pipe(String::from_utf8)
            .context(NotUtf8Snafu)?
            .split_once(':')
            .context(MissingColonSnafu {
                text: payload.to_string(),
            })?
            .pipe(|(e, p)| (e.to_string(), p.to_string()));

        Ok(AuthnScheme::Basic((
            AccountEmail::new(&email).context(BadEmailSnafu {
                email: email.to_owned(),
            })?,
            password.into(),
        )))
    }
    /// Create an AuthnScheme instance from the plain-text session token
    pub fn from_token(payload: &str) -> Result<AuthnScheme> {
        Ok(AuthnScheme::BearerToken(payload.to_owned()))
    }
}

impl TryFrom<&HeaderValue> for AuthnScheme {
    type Error = Error;

    fn try_from(value: &HeaderValue) -> StdResult<Self, Self::Error> {
        let (scheme, payload) = value
            .to_str()
            .context(InvalidAuthHeaderValueSnafu {
                value: value.clone(),
            })?
            .split_ascii_whitespace()
            .pipe(exactly_two)
            .map_err(|_| {
                BadAuthHeaderParseSnafu {
                    value: value.clone(),
                }
                .build()
            })?;
        match scheme.to_ascii_lowercase().as_str() {
            "basic" => AuthnScheme::from_basic(payload),
            "bearer" => AuthnScheme::from_token(payload),
            _ => UnsupportedAuthSchemeSnafu {
                scheme: scheme.to_owned(),
            }
            .fail(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                Authentication Utility Functions                                //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Authenticate an account by e-mail & password. On success, return the full [Account]; on
/// failure return error.
pub async fn check_password(
    storage: &(dyn StorageBackend + Send + Sync),
    peppers: &Peppers,
    email: &AccountEmail,
    password: SecretString,
) -> Result<Account> {
    let account = storage
        .account_for_email(email.as_ref())
        .await
        .context(AccountSnafu {
            email: email.clone(),
        })?
        .context(UnknownAccountSnafu {
            email: email.clone(),
        })?;
    account
        .check_password(peppers, password)
        .context(BadPasswordSnafu {
            email: email.clone(),
        })?;
    Ok(account)
}

/// Authenticate an account by session token. On success, return the full [Account]; on failure
/// return error. An expired session is destroyed on sight.
pub async fn check_session(
    storage: &(dyn StorageBackend + Send + Sync),
    token: &str,
) -> Result<Account> {
    let session = storage
        .session_for_token(token)
        .await
        .context(SessionSnafu)?
        .context(UnknownSessionSnafu)?;
    if session.expired(chrono::Utc::now()) {
        storage
            .remove_session(token)
            .await
            .context(SessionSnafu)?;
        return ExpiredSessionSnafu.fail();
    }
    storage
        .account_by_id(&session.account())
        .await
        .context(SessionSnafu)?
        .context(UnknownSessionSnafu)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    authentication middleware                                   //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("authn.successes", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("authn.failures", Sort::IntegralCounter) }

/// axum middleware that authenticates each request
///
/// On success, deposits the [Account] into the request extensions for handlers to pick up. A
/// request bearing *no* credentials is passed through untouched; handlers that require an
/// authenticated caller will reject it when the extension turns up missing. A request bearing
/// *bad* credentials is answered here & goes no further.
pub async fn authenticate(
    State(state): State<Arc<Gridconsole>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    async fn authenticate1(state: &Gridconsole, headers: &HeaderMap) -> Result<Account> {
        let header_val = headers
            .get_all(header::AUTHORIZATION)
            .into_iter()
            .at_most_one()
            .map_err(|_| MultipleAuthnHeadersSnafu.build())?
            .context(NoAuthTokenSnafu)?;
        match AuthnScheme::try_from(header_val)? {
            AuthnScheme::Basic((email, password)) => {
                check_password(state.storage.as_ref(), &state.peppers, &email, password).await
            }
            AuthnScheme::BearerToken(token) => {
                check_session(state.storage.as_ref(), &token).await
            }
        }
    }
    match authenticate1(&state, &headers).await {
        Ok(account) => {
            counter_add!(state.instruments, "authn.successes", 1, &[]);
            request.extensions_mut().insert(account);
            next.run(request).await
        }
        Err(Error::NoAuthToken { .. }) => next.run(request).await,
        Err(err) => {
            debug!("Authentication failed: {}", err);
            counter_add!(state.instruments, "authn.failures", 1, &[]);
            err.into_response()
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_scheme_parsing() {
        // base64("alice@example.com:hunter2")
        let value = HeaderValue::from_static("Basic YWxpY2VAZXhhbXBsZS5jb206aHVudGVyMg==");
        assert!(matches!(
            AuthnScheme::try_from(&value),
            Ok(AuthnScheme::Basic((email, _))) if email.as_ref() == "alice@example.com"
        ));

        let value = HeaderValue::from_static("Bearer deadbeef");
        assert!(matches!(
            AuthnScheme::try_from(&value),
            Ok(AuthnScheme::BearerToken(token)) if token == "deadbeef"
        ));

        let value = HeaderValue::from_static("Digest whatever");
        assert!(matches!(
            AuthnScheme::try_from(&value),
            Err(Error::UnsupportedAuthScheme { .. })
        ));

        let value = HeaderValue::from_static("Bearer");
        assert!(matches!(
            AuthnScheme::try_from(&value),
            Err(Error::BadAuthHeaderParse { .. })
        ));
    }
}
