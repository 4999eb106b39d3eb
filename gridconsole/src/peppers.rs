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

//! # gridconsole peppers
//!
//! gridconsole salts and [peppers] passwords. Salts are easy: they're generated at registration
//! time for each account & stored along with that account in the database. Peppers, however, are
//! designed to be stored *separately*. This module contains support for holding peppers securely
//! in memory as well as versioning & rotating them.
//!
//! [peppers]: https://cheatsheetseries.owasp.org/cheatsheets/Password_Storage_Cheat_Sheet.html#peppering
//!
//! Peppers are read from configuration at startup:
//!
//! ```toml
//! [config.peppers]
//! "pepper-ver:2025-02-12" = [1, 2, 3, 4, ..., 32] # Peppers must be 32 octets in length
//! "pepper-ver:2025-02-15" = [33, 34, 35, ..., 64]
//! ```
//!
//! The operator begins rotating the pepper by adding a new key with a later version identifier
//! (versions are compared lexicographically) and re-starting the program or sending it a SIGHUP.
//! From that point on, the new pepper is used for any accounts that register. Extant accounts have
//! the pepper version that was current when they registered written down in the database, so they
//! can continue to validate their passwords.

use std::{collections::BTreeMap, fmt::Display, ops::Deref, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use scylla::{
    deserialize::{DeserializationError, DeserializeValue, FrameSlice, TypeCheckError},
    frame::response::result::ColumnType,
    serialize::{
        value::SerializeValue,
        writers::{CellWriter, WrittenCellProof},
        SerializationError,
    },
};
use serde::{Deserialize, Deserializer, Serialize};
use snafu::{prelude::*, Backtrace};

use crate::util::Key;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("A pepper must be 32 octets in length; got {len}"))]
    BadPepperLength { len: usize, backtrace: Backtrace },
    #[snafu(display("{text} is not a valid pepper version string"))]
    BadVersionString { text: String, backtrace: Backtrace },
    #[snafu(display("No pepper available"))]
    NoPepper { backtrace: Backtrace },
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        Pepper Versions                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

lazy_static! {
    static ref VERSION: Regex = Regex::new("^pepper-ver:[-a-zA-Z0-9]+$").unwrap(/* known good */);
}

/// Refined type for pepper version strings
///
/// Pepper versions are strings of the form "pepper-ver:[-a-zA-Z0-9]+", compared
/// lexicographically. They have to be serializable so that we can write them down alongside
/// account password hashes.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn new(text: &str) -> Result<Version> {
        VERSION
            .is_match(text)
            .then_some(Version(text.to_owned()))
            .context(BadVersionStringSnafu {
                text: text.to_owned(),
            })
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Implement `Deserialize` by hand to fail if the serialized value isn't a legit version string
impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Version::new(&s).map_err(|err| <D::Error as serde::de::Error>::custom(format!("{:?}", err)))
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        Version::new(s)
    }
}

impl<'frame, 'metadata> DeserializeValue<'frame, 'metadata> for Version {
    fn type_check(typ: &ColumnType<'_>) -> StdResult<(), TypeCheckError> {
        String::type_check(typ)
    }
    fn deserialize(
        typ: &'metadata ColumnType<'metadata>,
        v: Option<FrameSlice<'frame>>,
    ) -> StdResult<Self, DeserializationError> {
        Version::new(&<String as DeserializeValue>::deserialize(typ, v)?)
            .map_err(DeserializationError::new)
    }
}

impl SerializeValue for Version {
    fn serialize<'b>(
        &self,
        typ: &ColumnType<'_>,
        writer: CellWriter<'b>,
    ) -> StdResult<WrittenCellProof<'b>, SerializationError> {
        SerializeValue::serialize(&self.0, typ, writer)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             Pepper                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A [Pepper] is a 32-octet [Key]
#[derive(Clone, Debug)]
pub struct Pepper(Key);

impl Pepper {
    pub fn new(key: Key) -> Result<Pepper> {
        ensure!(key.len() == 32, BadPepperLengthSnafu { len: key.len() });
        Ok(Pepper(key))
    }
}

impl AsRef<secrecy::SecretSlice<u8>> for Pepper {
    fn as_ref(&self) -> &secrecy::SecretSlice<u8> {
        self.0.as_ref()
    }
}

// Implement `Deserialize` by hand to enforce the length invariant
impl<'de> Deserialize<'de> for Pepper {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let key = <Key as serde::Deserialize>::deserialize(deserializer)?;
        Pepper::new(key).map_err(|err| <D::Error as serde::de::Error>::custom(format!("{:?}", err)))
    }
}

fn default_pepper() -> Pepper {
    use password_hash::rand_core::{OsRng, RngCore};
    let mut bytes: Vec<u8> = vec![0; 32];
    OsRng.fill_bytes(&mut bytes);
    Pepper(bytes.into())
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Peppers                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The set of peppers currently in service, keyed by version
#[derive(Clone, Debug, Deserialize)]
#[serde(transparent)]
pub struct Peppers {
    peppers: BTreeMap<Version, Pepper>,
}

impl Default for Peppers {
    fn default() -> Self {
        Peppers {
            peppers: BTreeMap::from_iter(vec![(
                Version(chrono::Local::now().format("pepper-ver:%Y%m%d").to_string()),
                default_pepper(),
            )]),
        }
    }
}

impl Peppers {
    /// Retrieve the current (i.e. the most recent) Pepper
    pub fn current_pepper(&self) -> Result<(Version, Pepper)> {
        let (key, value) = self.peppers.last_key_value().context(NoPepperSnafu)?;
        Ok((key.clone(), value.clone()))
    }
    /// Retrieve a pepper by version
    pub fn find_by_version(&self, version: &Version) -> Result<Pepper> {
        Ok(self.peppers.get(version).context(NoPepperSnafu)?.clone())
    }
}

impl Deref for Peppers {
    type Target = BTreeMap<Version, Pepper>;

    fn deref(&self) -> &Self::Target {
        &self.peppers
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_versions() {
        assert!(Version::new("pepper-ver:20250215").is_ok());
        assert!(Version::new("20250215").is_err());
        assert!(Version::new("pepper-ver:2025 02 15").is_err());
        assert!(Version::new("pepper-ver:a").unwrap() < Version::new("pepper-ver:b").unwrap());
    }

    #[test]
    fn test_rotation() {
        let mut peppers = Peppers::default();
        let (first, _) = peppers.current_pepper().unwrap();
        let next = Version::new("pepper-ver:zzz").unwrap();
        peppers.peppers.insert(next.clone(), default_pepper());
        let (current, _) = peppers.current_pepper().unwrap();
        assert_eq!(current, next);
        assert!(peppers.find_by_version(&first).is_ok());
    }
}
