// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Per-stage log levels chosen by regular expressions on entity names.

use log::Level;
use regex::Regex;

use crate::tracker::TrackConfigError;

/// Ordered list of name filters with a fallback level.
///
/// The first filter whose expression matches a name decides its level.
///
/// ```rust
/// use log::Level;
/// use tilegen_track::tracker::LevelRules;
///
/// let mut rules = LevelRules::new(Level::Warn);
/// rules.add_filter(".*fabric.*", Level::Trace).unwrap();
/// assert_eq!(rules.level_for("tilegen::design::fabric"), Level::Trace);
/// assert_eq!(rules.level_for("tilegen::design"), Level::Warn);
/// ```
#[derive(Debug)]
pub struct LevelRules {
    fallback: Level,
    filters: Vec<(Regex, Level)>,
}

impl LevelRules {
    /// Rules that give every entity `fallback`.
    #[must_use]
    pub fn new(fallback: Level) -> Self {
        Self {
            fallback,
            filters: Vec::new(),
        }
    }

    /// Rules for a user option pair: with no filter everything logs at
    /// `level`; with a filter only matching entities do and the rest are
    /// limited to errors.
    pub fn from_option(filter: &str, level: Level) -> Result<Self, TrackConfigError> {
        if filter.is_empty() {
            return Ok(Self::new(level));
        }
        let mut rules = Self::new(Level::Error);
        rules.add_filter(filter, level)?;
        Ok(rules)
    }

    /// Append a filter. Earlier filters take priority.
    pub fn add_filter(&mut self, pattern: &str, level: Level) -> Result<(), TrackConfigError> {
        let regex = Regex::new(pattern).map_err(|source| TrackConfigError::Filter {
            pattern: pattern.to_string(),
            source,
        })?;
        self.filters.push((regex, level));
        Ok(())
    }

    /// The level an entity with this full name logs at.
    #[must_use]
    pub fn level_for(&self, full_name: &str) -> Level {
        self.filters
            .iter()
            .find(|(regex, _)| regex.is_match(full_name))
            .map_or(self.fallback, |(_, level)| *level)
    }
}

#[cfg(test)]
mod tests {
    use log::Level;

    use super::*;

    const STAGES: [&str; 4] = [
        "tilegen",
        "tilegen::design",
        "tilegen::design::fabric",
        "tilegen::design::schedule",
    ];

    fn levels(rules: &LevelRules) -> Vec<Level> {
        STAGES.iter().map(|s| rules.level_for(s)).collect()
    }

    #[test]
    fn fallback_only() {
        let rules = LevelRules::new(Level::Error);
        assert_eq!(levels(&rules), [Level::Error; 4]);
    }

    #[test]
    fn design_stages_traced() {
        let rules = LevelRules::from_option(".*design.*", Level::Trace).unwrap();
        assert_eq!(
            levels(&rules),
            [Level::Error, Level::Trace, Level::Trace, Level::Trace]
        );
    }

    #[test]
    fn empty_option_applies_everywhere() {
        let rules = LevelRules::from_option("", Level::Debug).unwrap();
        assert_eq!(levels(&rules), [Level::Debug; 4]);
    }

    #[test]
    fn first_filter_wins() {
        let mut rules = LevelRules::new(Level::Error);
        rules.add_filter(".*fabric", Level::Warn).unwrap();
        rules.add_filter(".*design.*", Level::Info).unwrap();
        assert_eq!(
            levels(&rules),
            [Level::Error, Level::Info, Level::Warn, Level::Info]
        );
    }

    #[test]
    fn bad_regex() {
        let err = LevelRules::from_option("(", Level::Warn).unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse filter regex '('"));
    }
}
