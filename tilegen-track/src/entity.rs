// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Named generator stages.
//!
//! An entity belongs to exactly one generator stage. Its full name is fixed
//! when it is opened, so trackers can match level filters and attribute
//! messages without walking the hierarchy again.

use std::fmt;
use std::rc::Rc;

use log::Level;

use crate::tracker::Lifecycle;
use crate::{Id, NO_ID, Tracker};

const SEPARATOR: &str = "::";

/// A named emitter of log messages.
///
/// Dropping an entity reports it as closed.
pub struct Entity {
    name: String,
    full_name: String,
    id: Id,
    tracker: Tracker,
}

impl Entity {
    /// Open a stage below `parent`, sharing its tracker.
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        let full_name = format!("{}{SEPARATOR}{name}", parent.full_name);
        Self::open(&parent.tracker, parent.id, name, full_name)
    }

    fn open(tracker: &Tracker, parent: Id, name: &str, full_name: String) -> Self {
        let id = tracker.next_id();
        tracker.register(id, &full_name);
        let entity = Self {
            name: name.to_string(),
            full_name,
            id,
            tracker: tracker.clone(),
        };
        if entity.enabled(Level::Trace) {
            tracker.lifecycle(id, Lifecycle::Opened { parent });
        }
        entity
    }

    /// The last component of the name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `::` separated path from the top-level entity.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Run-unique identifier.
    #[must_use]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Whether a message at `level` would be written anywhere.
    #[must_use]
    pub fn enabled(&self, level: Level) -> bool {
        self.tracker.enabled(self.id, level)
    }

    /// Emit a message. The level check is left to the caller (see
    /// [`stage_log`](crate::stage_log)).
    pub fn message(&self, level: Level, msg: fmt::Arguments) {
        self.tracker.message(self.id, level, msg);
    }
}

impl Drop for Entity {
    fn drop(&mut self) {
        if self.enabled(Level::Trace) {
            self.tracker.lifecycle(self.id, Lifecycle::Closed);
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("full_name", &self.full_name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// Open the root of a generator run. Every other entity descends from it.
pub fn toplevel(tracker: &Tracker, name: &str) -> Rc<Entity> {
    Rc::new(Entity::open(tracker, NO_ID, name, name.to_string()))
}
