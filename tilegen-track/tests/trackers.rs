// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::rc::Rc;

use tilegen_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use tilegen_track::entity::{Entity, toplevel};
use tilegen_track::test_helpers::check_and_clear;
use tilegen_track::{TrackConfigError, debug, info, test_init, trace, warn};

#[test]
fn stages_open_and_close() {
    let (events, tracker) = test_init!(10);
    let top = toplevel(&tracker, "tilegen");
    let fabric = Entity::new(&top, "fabric");
    assert_eq!(fabric.name(), "fabric");
    assert_eq!(fabric.full_name(), "tilegen::fabric");
    assert_eq!(format!("{fabric}"), "tilegen::fabric");

    debug!(fabric ; "built {} channels", 32);
    check_and_clear(
        &events,
        &[
            "10 opened tilegen under 0",
            "11 opened tilegen::fabric under 10",
            "11 DEBUG: built 32 channels",
        ],
    );

    drop(fabric);
    check_and_clear(&events, &["11 closed"]);
}

#[test]
fn nested_names() {
    let (events, tracker) = test_init!(1);
    let top = toplevel(&tracker, "tilegen");
    let design = Rc::new(Entity::new(&top, "design"));
    let schedule = Entity::new(&design, "schedule");
    assert_eq!(schedule.full_name(), "tilegen::design::schedule");
    check_and_clear(
        &events,
        &["1 opened", "2 opened", "3 opened tilegen::design::schedule under 2"],
    );
}

fn log_to_file(filter_regex: &str, level: log::Level) -> String {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tilegen.log");
    let path_str = path.to_str().unwrap().to_string();

    {
        let tracker = setup_trackers(&TrackersConfig {
            stdout: TrackerConfig {
                enable: false,
                ..Default::default()
            },
            log_file: TrackerConfig {
                enable: true,
                level,
                filter_regex,
                file: Some(&path_str),
            },
        })
        .unwrap();

        let top = toplevel(&tracker, "tilegen");
        let planner = Entity::new(&top, "planner");
        let schedule = Entity::new(&top, "schedule");
        info!(planner ; "planner message");
        trace!(schedule ; "schedule message");
        warn!(top ; "top message");
        drop(schedule);
        tracker.shutdown();
    }

    std::fs::read_to_string(path).unwrap()
}

#[test]
fn file_output_at_info() {
    let contents = log_to_file("", log::Level::Info);
    assert!(contents.contains("[INFO  tilegen::planner] planner message"));
    assert!(contents.contains("[WARN  tilegen] top message"));
    assert!(!contents.contains("schedule"));
}

#[test]
fn file_output_filtered_to_one_stage() {
    let contents = log_to_file(".*schedule", log::Level::Trace);
    assert_eq!(
        contents,
        "[TRACE tilegen::schedule] opened under tilegen\n\
         [TRACE tilegen::schedule] schedule message\n\
         [TRACE tilegen::schedule] closed\n"
    );
}

#[test]
fn missing_log_file_name() {
    let result = setup_trackers(&TrackersConfig {
        stdout: TrackerConfig {
            enable: false,
            ..Default::default()
        },
        log_file: TrackerConfig {
            enable: true,
            file: None,
            ..Default::default()
        },
    });
    assert!(matches!(result, Err(TrackConfigError::MissingLogFile)));
}

#[test]
fn bad_filter_is_reported() {
    let result = setup_trackers(&TrackersConfig {
        stdout: TrackerConfig {
            filter_regex: "[",
            ..Default::default()
        },
        log_file: TrackerConfig {
            enable: false,
            ..Default::default()
        },
    });
    assert!(matches!(result, Err(TrackConfigError::Filter { .. })));
}
