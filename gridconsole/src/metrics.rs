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

//! # gridconsole metrics
//!
//! gridconsole collects & exports metrics through [OpenTelemetry]. OTel calls the actual counters
//! & gauges "instruments" and advises re-using them rather than re-creating them at each
//! collection site, which raises the question of where to keep them. Littering the application
//! state with one field per instrument doesn't scale, and a stringly-keyed map brings its own
//! problem: nothing stops two far-apart modules from registering the same name.
//!
//! [OpenTelemetry]: https://docs.rs/opentelemetry/latest/opentelemetry/index.html
//!
//! The scheme here leans on the [inventory] crate. Each collection site registers its metric at
//! compile time:
//!
//! ```ignore
//! inventory::submit! { metrics::Registration::new("auth.logins", Sort::IntegralCounter) }
//! ```
//!
//! [Instruments::new] walks the inventory at startup, panicking on any name collision &
//! pre-building every instrument, so that recording at runtime is just a map lookup:
//!
//! ```ignore
//! counter_add!(state.instruments, "auth.logins", 1, &[]);
//! ```
//!
//! Name lookups that fail at runtime panic; a registered-but-misspelled metric name is a logic
//! error, not an input error.

use std::collections::{hash_map::Entry, HashMap, HashSet};

use opentelemetry::{global, metrics::Counter, KeyValue};

/// Instrument type
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Sort {
    /// Corresponds to `Counter<u64>`
    IntegralCounter,
    // more as the need arises
}

/// The type of thing being inventoried
///
/// Register a metric by name & type using
///
/// ```ignore
/// inventory::submit! { metrics::Registration::new("auth.logins", Sort::IntegralCounter) }
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Registration {
    name: &'static str,
    sort: Sort,
}

impl Registration {
    pub const fn new(name: &'static str, sort: Sort) -> Registration {
        Registration { name, sort }
    }
    pub fn name(&self) -> String {
        self.name.to_string()
    }
    pub fn sort(&self) -> Sort {
        self.sort
    }
}

inventory::collect!(Registration);

/// Panic early if two collection sites registered the same metric name
pub fn check_metric_registrations() {
    let mut names: HashSet<String> = HashSet::new();
    IntoIterator::into_iter(inventory::iter::<Registration>).for_each(|reg| {
        if names.contains(&reg.name()) {
            panic!("The metric name {} was used twice", reg.name());
        }
        names.insert(reg.name());
    });
}

enum Instrument {
    CounterU64(Counter<u64>),
}

/// Container for OTel instruments
pub struct Instruments {
    meter: opentelemetry::metrics::Meter,
    map: HashMap<String, Instrument>,
}

impl Instruments {
    pub fn new(prefix: &'static str) -> Instruments {
        let mut m: HashMap<String, Instrument> = HashMap::new();
        let meter = global::meter(prefix);
        // Pre-building every registered instrument means `add` doesn't need `&mut self`, so an
        // instance of this type can live behind an Arc.
        IntoIterator::into_iter(inventory::iter::<Registration>).for_each(|reg| {
            let name = reg.name();
            match m.entry(reg.name()) {
                Entry::Occupied(_occupied_entry) => {
                    panic!("The metric name {} was used twice", name)
                }
                Entry::Vacant(vacant_entry) => {
                    vacant_entry.insert(match reg.sort() {
                        Sort::IntegralCounter => {
                            Instrument::CounterU64(meter.u64_counter(name).build())
                        }
                    });
                }
            }
        });

        Instruments { meter, map: m }
    }
    pub fn meter(&self) -> &opentelemetry::metrics::Meter {
        &self.meter
    }
    // panics if `name` doesn't name a counter
    pub fn add(&self, name: &str, count: u64, attributes: &[KeyValue]) {
        if let Some(Instrument::CounterU64(c)) = self.map.get(name) {
            c.add(count, attributes);
        } else {
            panic!("{} does not name a counter", name);
        }
    }
}

#[macro_export]
macro_rules! counter_add {
    ($instr:expr, $name:expr, $count:expr, $attrs:expr) => {
        $instr.add($name, $count, $attrs);
    };
}
