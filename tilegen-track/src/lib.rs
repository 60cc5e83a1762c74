// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Stage-scoped logging for the tilegen generator.
//!
//! Each generator stage (planner, topology, fabric, binder, schedule,
//! emitter and simulator) owns an [`Entity`](crate::entity::Entity) whose
//! name is the path of stages that created it, for example
//! `tilegen::design::fabric`. Messages are emitted through the entity, so the
//! verbosity of one stage can be raised with a regular expression on that
//! path while the rest of the generator stays quiet:
//!
//! ```rust
//! use tilegen_track::entity::{Entity, toplevel};
//! use tilegen_track::{debug, dev_null_tracker};
//!
//! let tracker = dev_null_tracker();
//! let top = toplevel(&tracker, "tilegen");
//! let planner = Entity::new(&top, "planner");
//! debug!(planner ; "planning {} blocks", 4000);
//! ```
//!
//! Messages are only formatted when the entity is enabled at the requested
//! level.

#![warn(missing_docs)]

pub use log;

pub mod builder;
pub mod entity;
pub mod test_helpers;
pub mod tracker;

pub use tracker::{Lifecycle, Track, TrackConfigError, Tracker, dev_null_tracker};

/// A sink for text output.
pub type Writer = Box<dyn std::io::Write>;

/// Identifies one entity within a generator run.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Id(pub u64);

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parent of the top-level entity and the ID handed out by silent trackers.
pub const NO_ID: Id = Id(0);

/// Log through an entity at an explicit level.
#[macro_export]
macro_rules! stage_log {
    ($entity:expr ; $lvl:expr, $($arg:tt)+) => (
        if $entity.enabled($lvl) {
            $entity.message($lvl, format_args!($($arg)+));
        }
    );
}

/// Log a message at level `log::Level::Trace`
#[macro_export]
macro_rules! trace {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::stage_log!($entity ; $crate::log::Level::Trace, $($arg)+);
    );
}

/// Log a message at level `log::Level::Debug`
#[macro_export]
macro_rules! debug {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::stage_log!($entity ; $crate::log::Level::Debug, $($arg)+);
    );
}

/// Log a message at level `log::Level::Info`
#[macro_export]
macro_rules! info {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::stage_log!($entity ; $crate::log::Level::Info, $($arg)+);
    );
}

/// Log a message at level `log::Level::Warn`
#[macro_export]
macro_rules! warn {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::stage_log!($entity ; $crate::log::Level::Warn, $($arg)+);
    );
}

/// Log a message at level `log::Level::Error`
#[macro_export]
macro_rules! error {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::stage_log!($entity ; $crate::log::Level::Error, $($arg)+);
    );
}
