//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Call stack frame sources for caller attribution."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

use crate::attribution::MAX_CALLER_DEPTH;

/// One resolved stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Source file as reported by debug info.
    pub file: String,
    /// One-based line number.
    pub line: u32,
    /// Whether the frame belongs to logging, ORM or test-harness code.
    pub internal: bool,
}

impl Frame {
    /// Frame belonging to application code.
    pub fn external(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
            internal: false,
        }
    }

    /// Frame belonging to one of the skipped packages.
    pub fn internal(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
            internal: true,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Producer of the active call stack, innermost frame first.
///
/// Consumers pull frames lazily and stop as soon as they have what they need.
pub trait FrameSource: Send + Sync {
    /// Frames of the current call stack, innermost first.
    fn frames(&self) -> Box<dyn Iterator<Item = Frame> + '_>;
}

impl FrameSource for Vec<Frame> {
    fn frames(&self) -> Box<dyn Iterator<Item = Frame> + '_> {
        Box::new(self.iter().cloned())
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Arc<T> {
    fn frames(&self) -> Box<dyn Iterator<Item = Frame> + '_> {
        (**self).frames()
    }
}

const LOGGING_PACKAGES: &[&str] = &["teelog-core/", "teelog-orm/", "teelog_core/", "teelog_orm/"];
const RUNTIME_PACKAGES: &[&str] = &["/rustc/", "/library/std/", "/library/core/", "/library/alloc/"];
const TRACING_PACKAGES: &[&str] = &["/tracing-", "/tracing/src/"];
const ORM_PACKAGES: &[&str] = &["/diesel-", "/sea-orm-", "/sqlx-"];
const SHIM_PACKAGES: &[&str] = &["/tracing-log-", "/log-0."];
const TEST_HARNESS: &[&str] = &["/library/test/"];
const TEST_FILE_SUFFIX: &str = "_test.rs";

/// Decides which source files count as internal to logging or the ORM.
#[derive(Debug, Clone)]
pub struct PackageFilter {
    markers: Vec<String>,
}

impl Default for PackageFilter {
    fn default() -> Self {
        let markers = [
            LOGGING_PACKAGES,
            RUNTIME_PACKAGES,
            TRACING_PACKAGES,
            ORM_PACKAGES,
            SHIM_PACKAGES,
            TEST_HARNESS,
        ]
        .concat()
        .into_iter()
        .map(str::to_owned)
        .collect();
        Self { markers }
    }
}

impl PackageFilter {
    /// Filter that treats only test files as internal.
    pub fn empty() -> Self {
        Self {
            markers: Vec::new(),
        }
    }

    /// Additionally treat any file whose path contains `marker` as internal.
    ///
    /// Used to register an ORM package or adapter shim under its source path.
    pub fn with_package(mut self, marker: impl Into<String>) -> Self {
        self.markers.push(marker.into());
        self
    }

    /// Whether `file` belongs to a skipped package.
    pub fn is_internal(&self, file: &str) -> bool {
        let file = file.replace('\\', "/");
        file.ends_with(TEST_FILE_SUFFIX) || self.markers.iter().any(|marker| file.contains(marker.as_str()))
    }
}

/// Frame source backed by a captured [`Backtrace`].
///
/// Requires debug info; without it no file locations are available and the
/// stack appears empty.
///
/// `std` resolves symbols for the whole captured stack in one pass, so each
/// call to [`FrameSource::frames`] pays for a full capture up front. Only the
/// first [`MAX_CALLER_DEPTH`] frames past the capture machinery are kept and
/// classified lazily. Skip caller lookup where that cost matters.
#[derive(Debug, Clone, Default)]
pub struct StackFrames {
    filter: PackageFilter,
}

impl StackFrames {
    /// Stack source classifying files with `filter`.
    pub fn new(filter: PackageFilter) -> Self {
        Self { filter }
    }

    /// Classifier in use.
    pub fn filter(&self) -> &PackageFilter {
        &self.filter
    }
}

impl FrameSource for StackFrames {
    fn frames(&self) -> Box<dyn Iterator<Item = Frame> + '_> {
        // Full format keeps absolute paths; the short one rewrites them relative to the cwd.
        let rendered = format!("{:#}", Backtrace::force_capture());
        let locations: Vec<(String, u32)> = rendered
            .lines()
            .filter_map(parse_location)
            .skip_while(|(file, _)| is_capture_machinery(file))
            .take(MAX_CALLER_DEPTH)
            .collect();
        Box::new(
            locations
                .into_iter()
                .map(move |(file, line)| Frame {
                    internal: self.filter.is_internal(&file),
                    file,
                    line,
                }),
        )
    }
}

/// Frames of the backtrace capture itself and of this module.
fn is_capture_machinery(file: &str) -> bool {
    let file = file.replace('\\', "/");
    RUNTIME_PACKAGES.iter().any(|marker| file.contains(marker)) || file.ends_with("teelog-orm/src/frames.rs")
}

/// Parse an `at path:line:column` backtrace line.
fn parse_location(line: &str) -> Option<(String, u32)> {
    let location = line.trim_start().strip_prefix("at ")?;
    let mut parts = location.rsplitn(3, ':');
    let _column = parts.next()?;
    let line = parts.next()?.parse().ok()?;
    let file = parts.next()?;
    Some((file.to_owned(), line))
}
