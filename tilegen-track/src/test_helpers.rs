// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Capture tracker events in memory so tests can assert on them.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::Level;
use regex::Regex;

use crate::Id;
use crate::tracker::{Lifecycle, Track};

/// A tracker that enables every level and records each event as a line.
///
/// Lines look like `11 opened tilegen::fabric under 10`, `11 closed` or
/// `11 DEBUG: message`.
pub struct TestTracker {
    next: Cell<u64>,
    names: RefCell<HashMap<Id, String>>,
    events: RefCell<Vec<String>>,
}

impl TestTracker {
    /// Hand out IDs starting from `first_id`.
    #[must_use]
    pub fn new(first_id: u64) -> Self {
        Self {
            next: Cell::new(first_id),
            names: RefCell::new(HashMap::new()),
            events: RefCell::new(Vec::new()),
        }
    }

    /// Events recorded since the last [`check_and_clear`].
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }
}

impl Track for TestTracker {
    fn next_id(&self) -> Id {
        let id = self.next.get();
        self.next.set(id + 1);
        Id(id)
    }

    fn register(&self, id: Id, full_name: &str) {
        self.names.borrow_mut().insert(id, full_name.to_string());
    }

    fn enabled(&self, _id: Id, _level: Level) -> bool {
        true
    }

    fn lifecycle(&self, id: Id, event: Lifecycle) {
        let line = match event {
            Lifecycle::Opened { parent } => {
                let name = self.names.borrow().get(&id).cloned().unwrap_or_default();
                format!("{id} opened {name} under {parent}")
            }
            Lifecycle::Closed => format!("{id} closed"),
        };
        self.events.borrow_mut().push(line);
    }

    fn message(&self, id: Id, level: Level, msg: fmt::Arguments) {
        self.events.borrow_mut().push(format!("{id} {level}: {msg}"));
    }

    fn shutdown(&self) {}
}

/// Create a [`TestTracker`] and the [`Tracker`](crate::Tracker) handle to it.
///
/// ```
/// use tilegen_track::entity::toplevel;
/// use tilegen_track::test_helpers::check_and_clear;
///
/// let (events, tracker) = tilegen_track::test_init!(10);
/// let _top = toplevel(&tracker, "tilegen");
/// check_and_clear(&events, &["10 opened tilegen under 0"]);
/// ```
#[macro_export]
macro_rules! test_init {
    ($first_id:expr) => {{
        let test_tracker = std::rc::Rc::new($crate::test_helpers::TestTracker::new($first_id));
        let tracker: $crate::Tracker = test_tracker.clone();
        (test_tracker, tracker)
    }};
}

/// Assert that the recorded events match `expected` (regular expressions,
/// in order), then forget them.
pub fn check_and_clear(tracker: &Rc<TestTracker>, expected: &[&str]) {
    let mut events = tracker.events.borrow_mut();
    assert_eq!(
        expected.len(),
        events.len(),
        "expected {expected:?}, got {:?}",
        *events
    );
    for (pattern, event) in expected.iter().zip(events.iter()) {
        let re = Regex::new(pattern).unwrap();
        assert!(re.is_match(event), "{pattern:?} does not match {event:?}");
    }
    events.clear();
}
