//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-severity, multi-destination log core composition."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Composes console, rotating-file and callback sinks into one `tracing`
//! dispatcher per logger. Every destination installs a cascade of severity
//! bands starting at its floor: exact bands below `Error`, one
//! `Error`-or-above band on top.
#![warn(missing_docs)]

pub mod compose;
pub mod encoder;
pub mod error;
pub mod filter;
pub mod logger;
pub mod rotate;
pub mod settings;
pub mod severity;
pub mod sink;

pub use compose::{compose, log_file_name, BoxedLayer, LogCore};
pub use encoder::{trim_caller, EncoderStyle, RecordFormat, CALLER_FIELD, SERVICE_FIELD, TIMESTAMP_FORMAT};
pub use error::{ConfigError, CoreError};
pub use filter::{cascade, SeverityFilter};
pub use logger::{new, new_debug, new_error, new_info, new_warn, Logger, LoggerBuilder, DEFAULT_SERVICE};
pub use rotate::{RotatingFile, RotatingWriter, RotationPolicy};
pub use settings::{DestinationSettings, LoggerSettings};
pub use severity::Severity;
pub use sink::{
    CallbackWriter, ConsoleWriter, Destination, DestinationSet, ReportCallback, SinkDescriptor,
    SinkFamily,
};
