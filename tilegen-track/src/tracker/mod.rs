// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The [`Track`] interface and the trackers that implement it.

/// Forward to several trackers.
pub mod fan_out;
pub mod levels;
pub mod text;

use std::fmt;
use std::rc::Rc;

pub use fan_out::FanOut;
pub use levels::LevelRules;
use log::Level;
pub use text::TextTracker;
use thiserror::Error;

use crate::{Id, NO_ID};

/// Problems found while building trackers from user options.
#[derive(Debug, Error)]
pub enum TrackConfigError {
    /// A stage filter is not a valid regular expression.
    #[error("Failed to parse filter regex '{pattern}': {source}")]
    Filter {
        /// The rejected pattern.
        pattern: String,
        /// Why it was rejected.
        #[source]
        source: regex::Error,
    },

    /// File logging was enabled without a path.
    #[error("No log file name provided")]
    MissingLogFile,

    /// The log file could not be opened for writing.
    #[error("Unable to create log file {path}: {source}")]
    LogFile {
        /// Path given by the user.
        path: String,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
}

/// Entity lifecycle events, reported at `Trace` level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// The entity was opened below `parent` ([`NO_ID`] for the top level).
    Opened {
        /// Parent entity.
        parent: Id,
    },
    /// The entity was dropped.
    Closed,
}

/// Receiver of everything the generator stages report.
pub trait Track {
    /// Hand out an ID for a new entity.
    fn next_id(&self) -> Id;

    /// Associate an ID with the full name of its entity.
    fn register(&self, id: Id, full_name: &str);

    /// Whether messages at `level` from entity `id` are wanted.
    fn enabled(&self, id: Id, level: Level) -> bool;

    /// Record an entity being opened or closed.
    fn lifecycle(&self, id: Id, event: Lifecycle);

    /// Record a message from entity `id`.
    fn message(&self, id: Id, level: Level, msg: fmt::Arguments);

    /// Flush buffered output before the process exits.
    fn shutdown(&self);
}

/// A [`Track`] shared by every entity of a run.
pub type Tracker = Rc<dyn Track>;

struct Silent;

impl Track for Silent {
    fn next_id(&self) -> Id {
        NO_ID
    }
    fn register(&self, _id: Id, _full_name: &str) {}
    fn enabled(&self, _id: Id, _level: Level) -> bool {
        false
    }
    fn lifecycle(&self, _id: Id, _event: Lifecycle) {}
    fn message(&self, _id: Id, _level: Level, _msg: fmt::Arguments) {}
    fn shutdown(&self) {}
}

/// A [`Tracker`] that discards everything, for library callers and tests.
#[must_use]
pub fn dev_null_tracker() -> Tracker {
    Rc::new(Silent)
}
