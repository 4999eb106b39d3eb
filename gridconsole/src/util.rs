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

//! # util
//!
//! Odds & ends with no better home: a "take exactly two" iterator adaptor, a deserializable
//! secret key, and generic credentials with a clap value parser.

use std::{fmt::Display, ops::Deref};

use secrecy::{ExposeSecret, SecretSlice, SecretString};
use serde::{Deserialize, Deserializer};
use serde_bytes::ByteBuf;
use tap::{Conv, Pipe};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          exactly_two                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub enum ExactlyTwoError {
    NoElements,
    OneElement,
    ThreeOrMoreElements,
}

impl Display for ExactlyTwoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExactlyTwoError::NoElements => write!(f, "ExactlyTwoError: no elements"),
            ExactlyTwoError::OneElement => write!(f, "ExactlyTwoError: one element"),
            ExactlyTwoError::ThreeOrMoreElements => {
                write!(f, "ExactlyTwoError: three or more elements")
            }
        }
    }
}

impl std::error::Error for ExactlyTwoError {}

pub fn exactly_two<T>(mut iter: T) -> std::result::Result<(T::Item, T::Item), ExactlyTwoError>
where
    T: std::iter::Iterator,
{
    match iter.next() {
        Some(first) => match iter.next() {
            Some(second) => match iter.next() {
                Some(_third) => Err(ExactlyTwoError::ThreeOrMoreElements),
                None => Ok((first, second)),
            },
            None => Err(ExactlyTwoError::OneElement),
        },
        None => Err(ExactlyTwoError::NoElements),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              Key                                               //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A general-purpose encryption key
///
/// [Key] is a deserializable, secret, slice of byte.
#[derive(Clone, Debug)]
pub struct Key(SecretSlice<u8>);

impl Key {
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }
}

// A few convenience traits so that a `Key` can stand in wherever one might want a
// `SecretSlice<u8>`.

impl AsRef<SecretSlice<u8>> for Key {
    fn as_ref(&self) -> &SecretSlice<u8> {
        self.deref()
    }
}

impl Deref for Key {
    type Target = SecretSlice<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Can't just derive `Deserialize` because [u8] doesn't implement `DeserializeOwned`
impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        <ByteBuf as serde::Deserialize>::deserialize(deserializer)
            .map_err(|err| <D::Error as serde::de::Error>::custom(format!("{:?}", err)))?
            .pipe(|x| x.into_vec())
            .conv::<SecretSlice<u8>>()
            .pipe(Key)
            .pipe(Ok)
    }
}

impl From<Vec<u8>> for Key {
    fn from(value: Vec<u8>) -> Self {
        Key(value.into())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      generic credentials                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// General-purpose credentials-- presumably username, password
#[derive(Clone, Debug, Deserialize)]
pub struct Credentials(pub (SecretString, SecretString));

impl clap::builder::ValueParserFactory for Credentials {
    type Parser = CredentialsParser;

    fn value_parser() -> Self::Parser {
        CredentialsParser
    }
}

#[derive(Clone, Debug)]
pub struct CredentialsParser;

impl clap::builder::TypedValueParser for CredentialsParser {
    type Value = Credentials;

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> std::result::Result<Self::Value, clap::Error> {
        use clap::error::ErrorKind;
        value
            .to_str()
            .ok_or(clap::Error::new(ErrorKind::InvalidValue))?
            .split(',')
            .pipe(exactly_two)
            .map_err(|_| clap::Error::new(ErrorKind::WrongNumberOfValues))?
            .pipe(|p| (p.0.into(), p.1.into()))
            .pipe(Credentials)
            .pipe(Ok)
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_exactly_two() {
        assert!(exactly_two("a".split(',')).is_err());
        assert_eq!(exactly_two("a,b".split(',')).unwrap(), ("a", "b"));
        assert!(exactly_two("a,b,c".split(',')).is_err());
    }
}
