//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Caller attribution over a bounded frame scan."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use crate::frames::Frame;

/// Frames examined before giving up on attribution.
pub const MAX_CALLER_DEPTH: usize = 13;

/// Application location a record is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerLocation {
    /// Source file.
    pub file: String,
    /// One-based line.
    pub line: u32,
}

impl From<Frame> for CallerLocation {
    fn from(frame: Frame) -> Self {
        Self {
            file: frame.file,
            line: frame.line,
        }
    }
}

impl fmt::Display for CallerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// First non-internal frame among the first [`MAX_CALLER_DEPTH`] frames.
///
/// The number of internal frames varies with the call path, hence a scan
/// rather than a fixed skip count. `None` means the record carries no caller.
pub fn attribute<I>(frames: I) -> Option<CallerLocation>
where
    I: IntoIterator<Item = Frame>,
{
    frames
        .into_iter()
        .take(MAX_CALLER_DEPTH)
        .find(|frame| !frame.internal)
        .map(CallerLocation::from)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::frames::FrameSource;

    #[test]
    fn picks_first_frame_outside_internal_packages() {
        let frames = vec![
            Frame::internal("teelog-orm/src/adapter.rs", 210),
            Frame::internal("sqlx-core/src/executor.rs", 88),
            Frame::internal("sqlx-core/src/query.rs", 31),
            Frame::external("src/repo/orders.rs", 42),
            Frame::external("src/main.rs", 7),
        ];
        let caller = attribute(frames).unwrap();
        assert_eq!(caller.to_string(), "src/repo/orders.rs:42");
    }

    #[test]
    fn fully_internal_window_yields_no_caller() {
        let mut frames: Vec<_> = (0..MAX_CALLER_DEPTH as u32)
            .map(|line| Frame::internal("teelog-orm/src/adapter.rs", line))
            .collect();
        frames.push(Frame::external("src/main.rs", 1));
        assert_eq!(attribute(frames), None);
    }

    #[test]
    fn empty_stack_yields_no_caller() {
        assert_eq!(attribute(Vec::new()), None);
    }

    struct Endless {
        pulled: AtomicUsize,
    }

    impl FrameSource for Endless {
        fn frames(&self) -> Box<dyn Iterator<Item = Frame> + '_> {
            Box::new(std::iter::repeat_with(move || {
                self.pulled.fetch_add(1, Ordering::SeqCst);
                Frame::internal("tracing-core/src/dispatcher.rs", 1)
            }))
        }
    }

    #[test]
    fn scan_stops_at_depth_budget() {
        let source = Endless {
            pulled: AtomicUsize::new(0),
        };
        assert_eq!(attribute(source.frames()), None);
        assert_eq!(source.pulled.load(Ordering::SeqCst), MAX_CALLER_DEPTH);
    }
}
