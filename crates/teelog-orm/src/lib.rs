//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Query trace adapter with caller attribution."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Adapts a [`teelog_core::Logger`] to the pluggable logger contract of a
//! relational-mapping library. Records are attributed to the first stack frame
//! outside logging, ORM and test-harness code.
#![warn(missing_docs)]

pub mod adapter;
pub mod attribution;
pub mod error;
pub mod frames;
pub mod registry;

pub use adapter::{LogMode, QueryLogger, TraceLogger, DATABASE_SERVICE, DEFAULT_SLOW_THRESHOLD};
pub use attribution::{attribute, CallerLocation, MAX_CALLER_DEPTH};
pub use error::{is_record_not_found, RecordNotFound};
pub use frames::{Frame, FrameSource, PackageFilter, StackFrames};
pub use registry::{clear_default, default_logger, set_default};
