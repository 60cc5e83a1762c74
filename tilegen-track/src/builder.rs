// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Build the tracker for a run from the logging options.

use std::fs::File;
use std::io::{self, BufWriter};
use std::rc::Rc;

use crate::tracker::{FanOut, LevelRules, TextTracker, TrackConfigError};
use crate::{Tracker, Writer};

/// Options for one output.
pub struct TrackerConfig<'a> {
    /// Write to this output at all.
    pub enable: bool,

    /// Level for entities selected by `filter_regex` (or all entities when
    /// it is empty).
    pub level: log::Level,

    /// Regular expression on entity names. Unmatched entities only report
    /// errors.
    pub filter_regex: &'a str,

    /// Destination path for file outputs.
    pub file: Option<&'a str>,
}

impl Default for TrackerConfig<'_> {
    fn default() -> Self {
        Self {
            enable: true,
            level: log::Level::Warn,
            filter_regex: "",
            file: None,
        }
    }
}

/// Options for every output of a run.
pub struct TrackersConfig<'a> {
    /// Console output.
    pub stdout: TrackerConfig<'a>,

    /// Text log file.
    pub log_file: TrackerConfig<'a>,
}

fn text_tracker(config: &TrackerConfig, writer: Writer) -> Result<Tracker, TrackConfigError> {
    let rules = LevelRules::from_option(config.filter_regex, config.level)?;
    Ok(Rc::new(TextTracker::new(rules, writer)))
}

fn stdout_writer() -> Writer {
    Box::new(BufWriter::new(io::stdout()))
}

fn file_writer(config: &TrackerConfig) -> Result<Writer, TrackConfigError> {
    let path = config.file.ok_or(TrackConfigError::MissingLogFile)?;
    let file = File::create(path).map_err(|source| TrackConfigError::LogFile {
        path: path.to_string(),
        source,
    })?;
    Ok(Box::new(BufWriter::new(file)))
}

/// Create the tracker for a run.
///
/// With no output enabled, warnings and errors still go to stdout.
pub fn setup_trackers(config: &TrackersConfig) -> Result<Tracker, TrackConfigError> {
    let mut sinks = Vec::new();
    if config.stdout.enable {
        sinks.push(text_tracker(&config.stdout, stdout_writer())?);
    }
    if config.log_file.enable {
        sinks.push(text_tracker(&config.log_file, file_writer(&config.log_file)?)?);
    }

    match sinks.len() {
        0 => text_tracker(&TrackerConfig::default(), stdout_writer()),
        1 => Ok(sinks.remove(0)),
        _ => Ok(Rc::new(FanOut::new(sinks))),
    }
}
