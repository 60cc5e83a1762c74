// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::cell::Cell;
use std::fmt;

use log::Level;

use crate::tracker::{Lifecycle, Track, Tracker};
use crate::{Id, NO_ID};

/// Forwards events to several trackers, each applying its own levels.
///
/// IDs are allocated here so that every sink sees the same ID for an entity.
pub struct FanOut {
    last_id: Cell<u64>,
    sinks: Vec<Tracker>,
}

impl FanOut {
    /// Forward to all of `sinks`.
    #[must_use]
    pub fn new(sinks: Vec<Tracker>) -> Self {
        Self {
            last_id: Cell::new(NO_ID.0),
            sinks,
        }
    }

    fn wanting(&self, id: Id, level: Level) -> impl Iterator<Item = &Tracker> {
        self.sinks
            .iter()
            .filter(move |sink| sink.enabled(id, level))
    }
}

impl Track for FanOut {
    fn next_id(&self) -> Id {
        let id = self.last_id.get() + 1;
        self.last_id.set(id);
        Id(id)
    }

    fn register(&self, id: Id, full_name: &str) {
        for sink in &self.sinks {
            sink.register(id, full_name);
        }
    }

    fn enabled(&self, id: Id, level: Level) -> bool {
        self.sinks.iter().any(|sink| sink.enabled(id, level))
    }

    fn lifecycle(&self, id: Id, event: Lifecycle) {
        for sink in self.wanting(id, Level::Trace) {
            sink.lifecycle(id, event);
        }
    }

    fn message(&self, id: Id, level: Level, msg: fmt::Arguments) {
        for sink in self.wanting(id, level) {
            sink.message(id, level, msg);
        }
    }

    fn shutdown(&self) {
        for sink in &self.sinks {
            sink.shutdown();
        }
    }
}
