// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Human-readable output attributed to stage names.
//!
//! Each line has the form `[LEVEL full::name] message`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use log::Level;

use crate::tracker::{LevelRules, Lifecycle, Track};
use crate::{Id, NO_ID, Writer};

struct Registered {
    full_name: String,
    level: Level,
}

/// Writes enabled messages as text lines.
pub struct TextTracker {
    rules: LevelRules,
    last_id: Cell<u64>,
    entities: RefCell<HashMap<Id, Registered>>,
    writer: RefCell<Writer>,
}

impl TextTracker {
    /// Create a tracker writing to `writer` with levels chosen by `rules`.
    #[must_use]
    pub fn new(rules: LevelRules, writer: Writer) -> Self {
        Self {
            rules,
            last_id: Cell::new(NO_ID.0),
            entities: RefCell::new(HashMap::new()),
            writer: RefCell::new(writer),
        }
    }

    fn name_of(&self, id: Id) -> String {
        match self.entities.borrow().get(&id) {
            Some(entity) => entity.full_name.clone(),
            None => format!("#{id}"),
        }
    }

    fn write_line(&self, level: Level, id: Id, text: fmt::Arguments) {
        let name = self.name_of(id);
        // Losing log output must not fail generation.
        let _ = writeln!(self.writer.borrow_mut(), "[{level:<5} {name}] {text}");
    }
}

impl Track for TextTracker {
    fn next_id(&self) -> Id {
        let id = self.last_id.get() + 1;
        self.last_id.set(id);
        Id(id)
    }

    fn register(&self, id: Id, full_name: &str) {
        let level = self.rules.level_for(full_name);
        self.entities.borrow_mut().insert(
            id,
            Registered {
                full_name: full_name.to_string(),
                level,
            },
        );
    }

    fn enabled(&self, id: Id, level: Level) -> bool {
        let limit = match self.entities.borrow().get(&id) {
            Some(entity) => entity.level,
            None => self.rules.level_for(""),
        };
        level <= limit
    }

    fn lifecycle(&self, id: Id, event: Lifecycle) {
        match event {
            Lifecycle::Opened { parent: NO_ID } => {
                self.write_line(Level::Trace, id, format_args!("opened"));
            }
            Lifecycle::Opened { parent } => {
                let parent = self.name_of(parent);
                self.write_line(Level::Trace, id, format_args!("opened under {parent}"));
            }
            Lifecycle::Closed => self.write_line(Level::Trace, id, format_args!("closed")),
        }
    }

    fn message(&self, id: Id, level: Level, msg: fmt::Arguments) {
        self.write_line(level, id, msg);
    }

    fn shutdown(&self) {
        let _ = self.writer.borrow_mut().flush();
    }
}
