//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Query outcome markers recognised by the trace adapter."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::error::Error;

use thiserror::Error;

/// Marker for a query that matched no rows.
///
/// Wrap it as the `source` of a richer error, or return it directly; the
/// trace adapter finds it anywhere in the source chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("record not found")]
pub struct RecordNotFound;

/// Whether `err`, or any error in its source chain, is [`RecordNotFound`].
pub fn is_record_not_found(err: &(dyn Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if err.is::<RecordNotFound>() {
            return true;
        }
        current = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    enum RepoError {
        #[error("order lookup failed")]
        Lookup(#[from] RecordNotFound),
        #[error("io failure")]
        Io(#[from] std::io::Error),
    }

    #[test]
    fn detects_marker_directly_and_through_sources() {
        assert!(is_record_not_found(&RecordNotFound));
        assert!(is_record_not_found(&RepoError::Lookup(RecordNotFound)));
    }

    #[test]
    fn other_errors_are_not_marked() {
        let err = RepoError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(!is_record_not_found(&err));
    }
}
