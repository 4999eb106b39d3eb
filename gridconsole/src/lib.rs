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

//! # gridconsole
//!
//! Web-based configuration console for distributed cache clusters: accounts, shared workspaces
//! ("spaces"), and the cluster & cache configurations within them, served as JSON under `/rest/`.
//!
//! Right now, the library crate has the same name as the binary, meaning that `rustdoc` will
//! ignore the binary crate.
pub mod auth;
pub mod authn;
pub mod caches;
pub mod clusters;
pub mod entities;
pub mod http;
pub mod memory;
pub mod metrics;
pub mod peppers;
pub mod scylla;
pub mod spaces;
pub mod storage;
pub mod util;
pub mod visibility;
