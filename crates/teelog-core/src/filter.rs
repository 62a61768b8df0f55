//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-sink severity predicates and the level cascade."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use tracing::level_filters::LevelFilter;
use tracing::subscriber::Interest;
use tracing::Metadata;
use tracing_subscriber::layer::{Context, Filter};

use crate::severity::Severity;

/// Predicate deciding whether a sink receives a record of a given severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeverityFilter {
    /// Only records of exactly this severity.
    Exactly(Severity),
    /// Records of this severity or anything more severe.
    AtLeast(Severity),
}

impl SeverityFilter {
    /// Whether a record of `severity` passes.
    pub fn accepts(&self, severity: Severity) -> bool {
        match *self {
            SeverityFilter::Exactly(level) => severity == level,
            SeverityFilter::AtLeast(level) => severity >= level,
        }
    }

    /// The severity the band is anchored on.
    pub fn severity(&self) -> Severity {
        match *self {
            SeverityFilter::Exactly(level) | SeverityFilter::AtLeast(level) => level,
        }
    }
}

impl fmt::Display for SeverityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeverityFilter::Exactly(level) => write!(f, "={level}"),
            SeverityFilter::AtLeast(level) => write!(f, ">={level}"),
        }
    }
}

impl<S> Filter<S> for SeverityFilter {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        Severity::from_level(meta.level()).is_some_and(|severity| self.accepts(severity))
    }

    // Several loggers with different cascades may share callsites, so the
    // decision is never cached per callsite.
    fn callsite_enabled(&self, _meta: &'static Metadata<'static>) -> Interest {
        Interest::sometimes()
    }

    fn max_level_hint(&self) -> Option<LevelFilter> {
        Some(LevelFilter::from_level(self.severity().to_level()))
    }
}

/// Filters installed for a destination configured at `level`.
///
/// One exact-severity band for every level from `level` up to and including
/// `Warn`, followed by a single `Error`-or-above band. An `Error` destination
/// gets the final band only.
pub fn cascade(level: Severity) -> Vec<SeverityFilter> {
    let mut filters: Vec<SeverityFilter> = Severity::ALL
        .into_iter()
        .filter(|severity| *severity >= level && *severity < Severity::Error)
        .map(SeverityFilter::Exactly)
        .collect();
    filters.push(SeverityFilter::AtLeast(Severity::Error));
    filters
}

#[cfg(test)]
mod tests {
    use super::*;
    use SeverityFilter::{AtLeast, Exactly};

    #[test]
    fn cascade_matches_configured_floor() {
        assert_eq!(
            cascade(Severity::Debug),
            vec![
                Exactly(Severity::Debug),
                Exactly(Severity::Info),
                Exactly(Severity::Warn),
                AtLeast(Severity::Error),
            ]
        );
        assert_eq!(
            cascade(Severity::Info),
            vec![
                Exactly(Severity::Info),
                Exactly(Severity::Warn),
                AtLeast(Severity::Error),
            ]
        );
        assert_eq!(
            cascade(Severity::Warn),
            vec![Exactly(Severity::Warn), AtLeast(Severity::Error)]
        );
        assert_eq!(cascade(Severity::Error), vec![AtLeast(Severity::Error)]);
        assert_eq!(cascade(Severity::default()), vec![AtLeast(Severity::Error)]);
    }

    #[test]
    fn every_severity_lands_in_exactly_one_band_at_or_above_floor() {
        for floor in Severity::ALL {
            let bands = cascade(floor);
            for severity in Severity::ALL {
                let hits = bands.iter().filter(|band| band.accepts(severity)).count();
                let expected = usize::from(severity >= floor);
                assert_eq!(hits, expected, "floor {floor} severity {severity}");
            }
        }
    }

    #[test]
    fn exact_bands_do_not_leak_upwards() {
        let band = Exactly(Severity::Info);
        assert!(!band.accepts(Severity::Warn));
        assert!(!band.accepts(Severity::Debug));
        assert!(AtLeast(Severity::Error).accepts(Severity::Error));
        assert!(!AtLeast(Severity::Error).accepts(Severity::Warn));
    }
}
