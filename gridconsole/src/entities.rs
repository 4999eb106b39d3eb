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

//! # gridconsole models
//!
//! ## Introduction
//!
//! The console's document types: accounts, spaces, cluster configurations & cache configurations,
//! along with the refined types (identifiers, usernames, e-mail addresses, enumerated codes) out
//! of which they're built. Everything else in the crate is expressed in terms of these.

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    ops::Deref,
    str::FromStr,
};

use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use chrono::{DateTime, Duration, Utc};
use email_address::EmailAddress;
use lazy_static::lazy_static;
use password_hash::{
    rand_core::{OsRng, RngCore},
    PasswordHashString, SaltString,
};
use regex::Regex;
use scylla::{
    deserialize::{DeserializationError, DeserializeValue, FrameSlice, TypeCheckError},
    frame::response::result::ColumnType,
    serialize::{
        value::SerializeValue,
        writers::{CellWriter, WrittenCellProof},
        SerializationError,
    },
    DeserializeRow,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use snafu::{prelude::*, Backtrace, IntoError};
use tracing::debug;
use uuid::Uuid;
use zxcvbn::{feedback::Feedback, zxcvbn, Score};

use crate::peppers::{self, Pepper, Peppers, Version as PepperVersion};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{text} is not a valid cache atomicity mode"))]
    BadCacheAtomicity { text: String, backtrace: Backtrace },
    #[snafu(display("{text} is not a valid cache mode"))]
    BadCacheMode { text: String, backtrace: Backtrace },
    #[snafu(display("{text} is not a valid discovery kind"))]
    BadDiscoveryKind { text: String, backtrace: Backtrace },
    #[snafu(display("{email} is not a valid e-mail address"))]
    BadEmail { email: String, backtrace: Backtrace },
    #[snafu(display("Incorrect password"))]
    BadPassword { backtrace: Backtrace },
    #[snafu(display("{text} is not a valid permission level"))]
    BadPermission { text: String, backtrace: Backtrace },
    #[snafu(display("{name} is not a valid gridconsole username"))]
    BadUsername { name: String },
    CheckPassword {
        email: AccountEmail,
        source: password_hash::errors::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to hash password: {source}"))]
    HashPassword {
        source: password_hash::errors::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Bad hash string: {source}"))]
    HashString {
        source: password_hash::errors::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to build an Argon2id password hasher: {source}"))]
    Hasher {
        source: argon2::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("No pepper found for account {email}: {source}"))]
    NoPepper {
        email: AccountEmail,
        source: peppers::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Password doesn't have enough entropy: {feedback}"))]
    PasswordEntropy {
        feedback: Feedback,
        backtrace: Backtrace,
    },
    #[snafu(display("Passwords may not begin or end in whitespace"))]
    PasswordWhitespace { backtrace: Backtrace },
    #[snafu(display("{value} is out of range for a pool size"))]
    PoolSize {
        value: u32,
        source: std::num::TryFromIntError,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

// A series of newtype structs to refine native types & to work around Rust's orphaned trait rules
// (implementing `DeserializeValue` & `SerializeValue` on types not defined in this crate). All
// boilerplate; nothing complex, but tedious, hence the macros.

fn mk_de_err(err: impl std::error::Error + Send + Sync + 'static) -> DeserializationError {
    DeserializationError::new(err)
}

fn mk_serde_de_err<'de, D: serde::Deserializer<'de>>(err: impl std::error::Error) -> D::Error {
    <D::Error as serde::de::Error>::custom(format!("{:?}", err))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          Identifiers                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// identifier!
///
/// In a document store we can't count on an auto-increment column to serve as an opaque
/// identifier; ids are assigned application-side as v4 UUIDs. Each document type gets its own
/// newtype over [Uuid] so that a cache id can never be handed to a function expecting a cluster
/// id.
///
/// This macro defines the newtype along with [Display], [DeserializeValue] and [SerializeValue].
macro_rules! define_id {
    ($type_name:ident) => {
        #[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
        #[serde(transparent)]
        pub struct $type_name(Uuid);
        impl $type_name {
            pub fn new() -> $type_name {
                $type_name(Uuid::new_v4())
            }
            pub fn from_raw_string(s: &str) -> StdResult<$type_name, uuid::Error> {
                Ok($type_name(Uuid::parse_str(s)?))
            }
            pub fn to_raw_string(&self) -> String {
                format!("{}", self.0.as_simple())
            }
        }
        impl Default for $type_name {
            fn default() -> Self {
                Self::new()
            }
        }
        impl Display for $type_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0.as_hyphenated())
            }
        }
        // The derive macro doesn't work with newtype structs.
        impl<'frame, 'metadata> DeserializeValue<'frame, 'metadata> for $type_name {
            fn type_check(typ: &ColumnType<'_>) -> StdResult<(), TypeCheckError> {
                Uuid::type_check(typ)
            }
            fn deserialize(
                typ: &'metadata ColumnType<'metadata>,
                v: Option<FrameSlice<'frame>>,
            ) -> StdResult<Self, DeserializationError> {
                Ok(Self(<Uuid as DeserializeValue>::deserialize(typ, v)?))
            }
        }
        impl SerializeValue for $type_name {
            fn serialize<'b>(
                &self,
                typ: &ColumnType<'_>,
                writer: CellWriter<'b>,
            ) -> StdResult<WrittenCellProof<'b>, SerializationError> {
                SerializeValue::serialize(&self.0, typ, writer)
            }
        }
    };
}

define_id!(AccountId);
define_id!(SpaceId);
define_id!(ClusterId);
define_id!(CacheId);

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        Enumerated codes                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Define an enumeration whose variants correspond to fixed code strings on the wire & in the
/// database (stored as text columns). Unknown codes fail deserialization rather than being
/// smuggled in as some default.
macro_rules! define_coded_enum {
    ($type_name:ident, $snafu:ident, $($variant:ident => $code:literal),+ $(,)?) => {
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        pub enum $type_name {
            $($variant,)+
        }
        impl $type_name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($type_name::$variant => $code,)+
                }
            }
        }
        impl Display for $type_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
        impl FromStr for $type_name {
            type Err = Error;
            fn from_str(s: &str) -> StdResult<Self, Self::Err> {
                match s {
                    $($code => Ok($type_name::$variant),)+
                    _ => $snafu { text: s.to_owned() }.fail(),
                }
            }
        }
        impl TryFrom<String> for $type_name {
            type Error = Error;
            fn try_from(s: String) -> StdResult<Self, Self::Error> {
                s.parse()
            }
        }
        impl Serialize for $type_name {
            fn serialize<S: serde::Serializer>(&self, ser: S) -> StdResult<S::Ok, S::Error> {
                ser.serialize_str(self.as_str())
            }
        }
        // Implement `Deserialize` by hand to fail on codes we don't recognize
        impl<'de> Deserialize<'de> for $type_name {
            fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                $type_name::try_from(s).map_err(mk_serde_de_err::<'de, D>)
            }
        }
        impl<'frame, 'metadata> DeserializeValue<'frame, 'metadata> for $type_name {
            fn type_check(typ: &ColumnType<'_>) -> StdResult<(), TypeCheckError> {
                String::type_check(typ)
            }
            fn deserialize(
                typ: &'metadata ColumnType<'metadata>,
                v: Option<FrameSlice<'frame>>,
            ) -> StdResult<Self, DeserializationError> {
                $type_name::try_from(<String as DeserializeValue>::deserialize(typ, v)?)
                    .map_err(mk_de_err)
            }
        }
        impl SerializeValue for $type_name {
            fn serialize<'b>(
                &self,
                typ: &ColumnType<'_>,
                writer: CellWriter<'b>,
            ) -> StdResult<WrittenCellProof<'b>, SerializationError> {
                SerializeValue::serialize(&self.as_str(), typ, writer)
            }
        }
    };
}

define_coded_enum!(Permission, BadPermissionSnafu, View => "VIEW", Full => "FULL");

define_coded_enum!(DiscoveryKind, BadDiscoveryKindSnafu,
    Vm => "Vm",
    Multicast => "Multicast",
    S3 => "S3",
    Cloud => "Cloud",
    GoogleStorage => "GoogleStorage",
    Jdbc => "Jdbc",
    SharedFs => "SharedFs",
);

define_coded_enum!(CacheMode, BadCacheModeSnafu,
    Partitioned => "PARTITIONED",
    Replicated => "REPLICATED",
    Local => "LOCAL",
);

define_coded_enum!(CacheAtomicity, BadCacheAtomicitySnafu,
    Atomic => "ATOMIC",
    Transactional => "TRANSACTIONAL",
);

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Username                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

// gridconsole usernames must be ASCII, may be from three to sixteen characters in length, and
// must match the regex "^[a-zA-Z][-_a-zA-Z0-9]*$".
const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 16;

lazy_static! {
    static ref USERNAME: Regex = Regex::new("^[a-zA-Z][-_a-zA-Z0-9]*$").unwrap(/* known good */);
}

fn check_username(s: &str) -> bool {
    s.is_ascii()
        && s.len() >= MIN_USERNAME_LENGTH
        && s.len() <= MAX_USERNAME_LENGTH
        && USERNAME.is_match(s)
}

/// A refined type representing a gridconsole display name
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Construct a [Username] from a `&str`
    ///
    /// To *move* a [String] into a [Username] (with validity checking) use
    /// [TryFrom::try_from()].
    pub fn new(name: &str) -> Result<Username> {
        check_username(name)
            .then_some(Username(name.to_owned()))
            .ok_or(
                BadUsernameSnafu {
                    name: name.to_owned(),
                }
                .build(),
            )
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for Username {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Implement `Deserialize` by hand to fail if the serialized value isn't a legit `Username`
impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Username::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl<'frame, 'metadata> DeserializeValue<'frame, 'metadata> for Username {
    fn type_check(typ: &ColumnType<'_>) -> StdResult<(), TypeCheckError> {
        String::type_check(typ)
    }
    fn deserialize(
        typ: &'metadata ColumnType<'metadata>,
        v: Option<FrameSlice<'frame>>,
    ) -> StdResult<Self, DeserializationError> {
        Username::try_from(<String as DeserializeValue>::deserialize(typ, v)?).map_err(mk_de_err)
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Username {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Username::new(s)
    }
}

impl SerializeValue for Username {
    fn serialize<'b>(
        &self,
        typ: &ColumnType<'_>,
        writer: CellWriter<'b>,
    ) -> StdResult<WrittenCellProof<'b>, SerializationError> {
        SerializeValue::serialize(&self.0, typ, writer)
    }
}

impl TryFrom<String> for Username {
    type Error = Error;

    fn try_from(name: String) -> std::result::Result<Self, Self::Error> {
        if check_username(&name) {
            Ok(Username(name))
        } else {
            BadUsernameSnafu { name }.fail()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          AccountEmail                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A refined type representing an account's e-mail address; the account's login name
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct AccountEmail(String);

impl AccountEmail {
    pub fn new(email: &str) -> Result<AccountEmail> {
        EmailAddress::is_valid(email)
            .then_some(AccountEmail(email.to_string()))
            .context(BadEmailSnafu {
                email: email.to_string(),
            })
    }
}

impl AsRef<str> for AccountEmail {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for AccountEmail {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Implement `Deserialize` by hand to fail if the serialized value isn't a legit e-mail address
impl<'de> Deserialize<'de> for AccountEmail {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        AccountEmail::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl<'frame, 'metadata> DeserializeValue<'frame, 'metadata> for AccountEmail {
    fn type_check(typ: &ColumnType) -> std::result::Result<(), TypeCheckError> {
        String::type_check(typ)
    }

    fn deserialize(
        typ: &'metadata ColumnType<'metadata>,
        v: Option<FrameSlice<'frame>>,
    ) -> std::result::Result<Self, DeserializationError> {
        AccountEmail::try_from(<String as DeserializeValue>::deserialize(typ, v)?)
            .map_err(mk_de_err)
    }
}

impl Display for AccountEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountEmail {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        AccountEmail::new(s)
    }
}

impl SerializeValue for AccountEmail {
    fn serialize<'b>(
        &self,
        typ: &ColumnType,
        writer: CellWriter<'b>,
    ) -> std::result::Result<WrittenCellProof<'b>, SerializationError> {
        SerializeValue::serialize(&self.0, typ, writer)
    }
}

impl TryFrom<String> for AccountEmail {
    type Error = Error;

    fn try_from(email: String) -> std::result::Result<Self, Self::Error> {
        if EmailAddress::is_valid(&email) {
            Ok(AccountEmail(email))
        } else {
            BadEmailSnafu { email }.fail()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       AccountHashString                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Newtype idiom to work around Rust's orphaned trait rule
///
/// The hash is kept as a [PasswordHashString] rather than a [PasswordHash], since the latter
/// doesn't support serde.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AccountHashString(
    #[serde(serialize_with = "serde_hash_string::serialize")] PasswordHashString,
);

impl AccountHashString {
    pub fn password_hash(&self) -> PasswordHash<'_> {
        self.0.password_hash()
    }
}

// Implement `Deserialize` by hand to fail if the serialized value isn't a legit hash string
impl<'de> Deserialize<'de> for AccountHashString {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        AccountHashString::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl<'frame, 'metadata> DeserializeValue<'frame, 'metadata> for AccountHashString {
    fn type_check(typ: &ColumnType<'_>) -> StdResult<(), TypeCheckError> {
        String::type_check(typ)
    }
    fn deserialize(
        typ: &'metadata ColumnType<'metadata>,
        v: Option<FrameSlice<'frame>>,
    ) -> StdResult<Self, DeserializationError> {
        AccountHashString::try_from(<String as DeserializeValue>::deserialize(typ, v)?)
            .map_err(mk_de_err)
    }
}

impl SerializeValue for AccountHashString {
    fn serialize<'b>(
        &self,
        typ: &ColumnType<'_>,
        writer: CellWriter<'b>,
    ) -> StdResult<WrittenCellProof<'b>, SerializationError> {
        SerializeValue::serialize(&self.0.as_str(), typ, writer)
    }
}

impl TryFrom<String> for AccountHashString {
    type Error = Error;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Ok(AccountHashString(
            PasswordHashString::new(&s).context(HashStringSnafu)?,
        ))
    }
}

mod serde_hash_string {
    use super::*;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        hash_string: &PasswordHashString,
        ser: S,
    ) -> StdResult<S::Ok, S::Error> {
        <str as serde::Serialize>::serialize(hash_string.as_str(), ser)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Account                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Represents a gridconsole account
#[derive(Clone, Debug, Deserialize, DeserializeRow, PartialEq, Serialize)]
pub struct Account {
    id: AccountId,
    email: AccountEmail,
    username: Username,
    password_hash: AccountHashString,
    pepper_version: PepperVersion,
    created_at: DateTime<Utc>,
}

/// Apply password validation rules
///
/// Passwords beginning or ending with whitespace are rejected, since that's likely a mistake on
/// the caller's part that will drive them bonkers when they try to login. The rest of the work is
/// delegated to [zxcvbn]; passwords that are too weak (score of less than three on a scale of
/// zero-to-four) are rejected.
fn validate_password(password: &SecretString, user_inputs: &[&str]) -> Result<()> {
    if password
        .expose_secret()
        .starts_with(|c: char| c.is_whitespace())
        || password
            .expose_secret()
            .ends_with(|c: char| c.is_whitespace())
    {
        return PasswordWhitespaceSnafu.fail();
    }

    let entropy = zxcvbn(password.expose_secret(), user_inputs);
    if entropy.score() < Score::Three {
        return PasswordEntropySnafu {
            // Feedback is set "when score <= 2", so the `unwrap()` below is safe.
            feedback: entropy.feedback().unwrap().clone(),
        }
        .fail();
    }

    debug!(
        "Password check: this password would take O({}) guesses",
        entropy.guesses_log10()
    );
    Ok(())
}

impl Account {
    /// Create a new [Account]
    ///
    /// This constructor does not validate uniqueness of the e-mail address (that's the storage
    /// layer's job); it will validate the password, rejecting it if it's too weak, then salt,
    /// pepper & hash it.
    pub fn new(
        pepper_version: &PepperVersion,
        pepper_key: &Pepper,
        username: &Username,
        password: &SecretString,
        email: &AccountEmail,
    ) -> Result<Account> {
        validate_password(password, &[username.as_ref(), email.as_ref()])?;
        let password_hash = Account::hash_password(pepper_key, password)?;
        Ok(Account {
            id: AccountId::new(),
            email: email.clone(),
            username: username.clone(),
            password_hash: AccountHashString(password_hash),
            pepper_version: pepper_version.clone(),
            created_at: Utc::now(),
        })
    }
    /// Validate a password
    ///
    /// The caller will have to lookup the [Pepper] from configuration based on this account's
    /// pepper version.
    pub fn check_password(&self, peppers: &Peppers, password: SecretString) -> Result<()> {
        let pepper = peppers
            .find_by_version(&self.pepper_version)
            .context(NoPepperSnafu {
                email: self.email.clone(),
            })?;
        let hasher = Account::create_password_hasher(&pepper)?;
        match hasher.verify_password(
            password.expose_secret().as_bytes(),
            &self.password_hash.password_hash(),
        ) {
            Ok(_) => Ok(()),
            Err(password_hash::errors::Error::Password) => BadPasswordSnafu.fail(),
            Err(err) => Err(CheckPasswordSnafu {
                email: self.email.clone(),
            }
            .into_error(err)),
        }
    }
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    pub fn email(&self) -> &AccountEmail {
        &self.email
    }
    pub fn hash(&self) -> AccountHashString {
        self.password_hash.clone()
    }
    pub fn id(&self) -> AccountId {
        self.id
    }
    pub fn pepper_version(&self) -> PepperVersion {
        self.pepper_version.clone()
    }
    pub fn username(&self) -> &Username {
        &self.username
    }
    /// Create a gridconsole password hasher
    ///
    /// Returns a [PasswordHasher] employing the Argon2id algorithm with the pepper supplied via
    /// the `secret` field in the `new_with_secret()` constructor, default version & parameters
    /// (m=19456, t=2, p=1 at the time of this writing), which comport with the OWASP Password
    /// Storage [Cheat Sheet] recommendations.
    ///
    /// [Cheat Sheet]: https://cheatsheetseries.owasp.org/cheatsheets/Password_Storage_Cheat_Sheet.html#password-hashing-algorithms
    fn create_password_hasher(pepper: &Pepper) -> Result<Argon2> {
        Argon2::new_with_secret(
            pepper.as_ref().expose_secret(),
            Algorithm::Argon2id,
            Version::default(),
            Params::default(),
        )
        .context(HasherSnafu)
    }
    /// Salt & hash a password with the current pepper
    fn hash_password(pepper: &Pepper, password: &SecretString) -> Result<PasswordHashString> {
        let salt = SaltString::generate(&mut OsRng);
        let hasher = Account::create_password_hasher(pepper)?;
        Ok(hasher
            .hash_password(password.expose_secret().as_bytes(), &salt)
            .context(HashPasswordSnafu)?
            .serialize())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             Space                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Represents a space: the unit of ownership & sharing
///
/// Every cluster & cache configuration belongs to exactly one space. The owner implicitly enjoys
/// [Permission::Full]; other accounts get whatever grant appears in `used_by`.
#[derive(Clone, Debug, Deserialize, DeserializeRow, PartialEq, Serialize)]
pub struct Space {
    #[serde(rename = "_id")]
    id: SpaceId,
    name: String,
    owner: AccountId,
    #[serde(rename = "usedBy", default)]
    used_by: HashMap<AccountId, Permission>,
}

impl Space {
    pub fn new(name: &str, owner: AccountId) -> Space {
        Space {
            id: SpaceId::new(),
            name: name.to_owned(),
            owner,
            used_by: HashMap::new(),
        }
    }
    /// Effective permission `account` enjoys on this space, if any
    pub fn effective_permission(&self, account: &AccountId) -> Option<Permission> {
        if &self.owner == account {
            Some(Permission::Full)
        } else {
            self.used_by.get(account).copied()
        }
    }
    pub fn id(&self) -> SpaceId {
        self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn owner(&self) -> AccountId {
        self.owner
    }
    /// Grant `account` access at level `permission`, replacing any prior grant
    pub fn share(&mut self, account: AccountId, permission: Permission) {
        self.used_by.insert(account, permission);
    }
    /// Produce the replacement document for a full-replace save; id & owner are immutable
    pub fn updated(&self, name: &str, used_by: HashMap<AccountId, Permission>) -> Space {
        Space {
            id: self.id,
            name: name.to_owned(),
            owner: self.owner,
            used_by,
        }
    }
    pub fn used_by(&self) -> &HashMap<AccountId, Permission> {
        &self.used_by
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Cluster                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Node discovery configuration, embedded in a cluster document
///
/// `addresses` is meaningful only for the address-based kinds (e.g. [DiscoveryKind::Vm]); it is
/// carried verbatim for the others.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Discovery {
    pub kind: DiscoveryKind,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl Default for Discovery {
    fn default() -> Self {
        Discovery {
            kind: DiscoveryKind::Multicast,
            addresses: Vec::new(),
        }
    }
}

/// Represents a cluster configuration
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Cluster {
    #[serde(rename = "_id")]
    id: ClusterId,
    space: SpaceId,
    name: String,
    discovery: Discovery,
    #[serde(rename = "pubPoolSize")]
    pub_pool_size: i32,
    #[serde(rename = "sysPoolSize")]
    sys_pool_size: i32,
    #[serde(rename = "mgmtPoolSize")]
    mgmt_pool_size: i32,
    #[serde(rename = "p2pPoolSize")]
    p2p_pool_size: i32,
}

impl Cluster {
    pub fn new(
        id: ClusterId,
        space: SpaceId,
        name: &str,
        discovery: Discovery,
        pub_pool_size: u32,
        sys_pool_size: u32,
        mgmt_pool_size: u32,
        p2p_pool_size: u32,
    ) -> Result<Cluster> {
        Ok(Cluster {
            id,
            space,
            name: name.to_owned(),
            discovery,
            pub_pool_size: pool_size(pub_pool_size)?,
            sys_pool_size: pool_size(sys_pool_size)?,
            mgmt_pool_size: pool_size(mgmt_pool_size)?,
            p2p_pool_size: pool_size(p2p_pool_size)?,
        })
    }
    /// Re-assemble a cluster from its database columns; discovery is flattened to two columns at
    /// the store
    pub(crate) fn from_columns(
        id: ClusterId,
        space: SpaceId,
        name: String,
        discovery: Discovery,
        pub_pool_size: i32,
        sys_pool_size: i32,
        mgmt_pool_size: i32,
        p2p_pool_size: i32,
    ) -> Cluster {
        Cluster {
            id,
            space,
            name,
            discovery,
            pub_pool_size,
            sys_pool_size,
            mgmt_pool_size,
            p2p_pool_size,
        }
    }
    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }
    pub fn id(&self) -> ClusterId {
        self.id
    }
    pub fn mgmt_pool_size(&self) -> i32 {
        self.mgmt_pool_size
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn p2p_pool_size(&self) -> i32 {
        self.p2p_pool_size
    }
    pub fn pub_pool_size(&self) -> i32 {
        self.pub_pool_size
    }
    pub fn space(&self) -> SpaceId {
        self.space
    }
    pub fn sys_pool_size(&self) -> i32 {
        self.sys_pool_size
    }
}

fn pool_size(value: u32) -> Result<i32> {
    i32::try_from(value).context(PoolSizeSnafu { value })
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             Cache                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Represents a cache configuration
#[derive(Clone, Debug, Deserialize, DeserializeRow, PartialEq, Serialize)]
pub struct Cache {
    #[serde(rename = "_id")]
    id: CacheId,
    space: SpaceId,
    name: String,
    mode: CacheMode,
    backups: i32,
    atomicity: CacheAtomicity,
    #[serde(default)]
    clusters: HashSet<ClusterId>,
}

impl Cache {
    pub fn new(
        id: CacheId,
        space: SpaceId,
        name: &str,
        mode: CacheMode,
        backups: u32,
        atomicity: CacheAtomicity,
        clusters: HashSet<ClusterId>,
    ) -> Result<Cache> {
        Ok(Cache {
            id,
            space,
            name: name.to_owned(),
            mode,
            backups: pool_size(backups)?,
            atomicity,
            clusters,
        })
    }
    pub fn atomicity(&self) -> CacheAtomicity {
        self.atomicity
    }
    pub fn backups(&self) -> i32 {
        self.backups
    }
    pub fn clusters(&self) -> &HashSet<ClusterId> {
        &self.clusters
    }
    /// Drop a cluster reference; used when the cluster itself is removed
    pub fn detach_cluster(&mut self, cluster: &ClusterId) -> bool {
        self.clusters.remove(cluster)
    }
    pub fn id(&self) -> CacheId {
        self.id
    }
    pub fn mode(&self) -> CacheMode {
        self.mode
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn space(&self) -> SpaceId {
        self.space
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Session                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A server-side login session
///
/// The token is 256 bits from the OS CSPRNG, hex-encoded; it's the only credential a logged-in
/// console holds, so it is never logged.
#[derive(Clone, Debug, DeserializeRow, PartialEq)]
pub struct Session {
    token: String,
    account: AccountId,
    expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(account: AccountId, lifetime: Duration) -> Session {
        let mut buf = [0u8; 32];
        OsRng.fill_bytes(&mut buf);
        Session {
            token: hex::encode(buf),
            account,
            expires_at: Utc::now() + lifetime,
        }
    }
    pub fn account(&self) -> AccountId {
        self.account
    }
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
    pub fn token(&self) -> &str {
        &self.token
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_username() {
        assert!(Username::new("alice").is_ok());
        assert!(Username::new("a-b_c9").is_ok());
        assert!(Username::new("ab").is_err());
        assert!(Username::new("9lives").is_err());
        assert!(Username::new("way-too-long-a-name").is_err());
        assert!(Username::new("not valid").is_err());
    }

    #[test]
    fn test_email() {
        assert!(AccountEmail::new("alice@example.com").is_ok());
        assert!(AccountEmail::new("not-an-address").is_err());
    }

    #[test]
    fn test_coded_enums() {
        assert_eq!("PARTITIONED".parse::<CacheMode>().unwrap(), CacheMode::Partitioned);
        assert!("partitioned".parse::<CacheMode>().is_err());
        assert_eq!(
            serde_json::to_string(&CacheAtomicity::Transactional).unwrap(),
            "\"TRANSACTIONAL\""
        );
        assert_eq!(
            serde_json::from_str::<DiscoveryKind>("\"GoogleStorage\"").unwrap(),
            DiscoveryKind::GoogleStorage
        );
        assert!(serde_json::from_str::<Permission>("\"ADMIN\"").is_err());
    }

    #[test]
    fn test_passwords() {
        let peppers = Peppers::default();
        let (version, pepper) = peppers.current_pepper().unwrap();

        let username = Username::new("alice").unwrap();
        let email = AccountEmail::new("alice@example.com").unwrap();

        // Too weak, derived from the e-mail, and leading whitespace, respectively
        assert!(
            Account::new(&version, &pepper, &username, &SecretString::from("abc"), &email)
                .is_err()
        );
        assert!(Account::new(
            &version,
            &pepper,
            &username,
            &SecretString::from("alice@example.com"),
            &email
        )
        .is_err());
        assert!(Account::new(
            &version,
            &pepper,
            &username,
            &SecretString::from(" a9$Gv!x2qQ"),
            &email
        )
        .is_err());

        let account = Account::new(
            &version,
            &pepper,
            &username,
            &SecretString::from("correct horse battery staple"),
            &email,
        )
        .unwrap();
        assert!(account
            .check_password(&peppers, SecretString::from("correct horse battery staple"))
            .is_ok());
        assert!(account
            .check_password(&peppers, SecretString::from("hunter2"))
            .is_err());
    }

    #[test]
    fn test_space_permissions() {
        let alice = AccountId::new();
        let bob = AccountId::new();
        let mut space = Space::new("Personal space", alice);
        assert_eq!(space.effective_permission(&alice), Some(Permission::Full));
        assert_eq!(space.effective_permission(&bob), None);
        space.share(bob, Permission::View);
        assert_eq!(space.effective_permission(&bob), Some(Permission::View));
        space.share(bob, Permission::Full);
        assert_eq!(space.effective_permission(&bob), Some(Permission::Full));
    }

    #[test]
    fn test_cluster_wire_format() {
        let cluster = Cluster::new(
            ClusterId::new(),
            SpaceId::new(),
            "staging",
            Discovery {
                kind: DiscoveryKind::Vm,
                addresses: vec!["10.0.0.1:47500".to_string()],
            },
            8,
            8,
            4,
            2,
        )
        .unwrap();
        let doc = serde_json::to_value(&cluster).unwrap();
        assert!(doc.get("_id").is_some());
        assert_eq!(doc["discovery"]["kind"], "Vm");
        assert_eq!(doc["pubPoolSize"], 8);
    }
}
