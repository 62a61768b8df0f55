//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Declarative logger settings."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logger::{Logger, LoggerBuilder};
use crate::severity::Severity;
use crate::sink::{Destination, ReportCallback, SinkFamily};

/// Declarative description of a logger, typically embedded in a TOML document.
///
/// ```toml
/// service = "billing"
///
/// [[destinations]]
/// kind = "std"
/// level = "debug"
///
/// [[destinations]]
/// kind = "file"
/// level = "info"
/// path = "/var/log/billing/"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Service name; empty falls back to `server`.
    #[serde(default)]
    pub service: String,
    /// Destinations in declaration order.
    #[serde(default)]
    pub destinations: Vec<DestinationSettings>,
}

/// One destination entry; `kind` is validated when the logger is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationSettings {
    /// `std`, `file` or `report`.
    pub kind: String,
    /// Cascade floor; missing or unknown values mean `error`.
    #[serde(default)]
    pub level: Option<String>,
    /// File name prefix, only meaningful for `file`.
    #[serde(default)]
    pub path: Option<String>,
}

impl DestinationSettings {
    /// Resolve the declared kind.
    pub fn family(&self) -> Result<SinkFamily, ConfigError> {
        match self.kind.trim().to_ascii_lowercase().as_str() {
            "std" | "console" | "stdout" => Ok(SinkFamily::Console),
            "file" => Ok(SinkFamily::File),
            "report" | "callback" => Ok(SinkFamily::Callback),
            _ => Err(ConfigError::UnknownKind(self.kind.clone())),
        }
    }

    /// Turn the entry into a destination, attaching `callback` to report entries.
    pub fn to_destination(&self, callback: Option<ReportCallback>) -> Result<Destination, ConfigError> {
        let level = Severity::from_config(self.level.as_deref());
        Ok(match self.family()? {
            SinkFamily::Console => Destination::Console { level },
            SinkFamily::File => Destination::File {
                level,
                path: self.path.clone().unwrap_or_default(),
            },
            SinkFamily::Callback => Destination::Callback { level, callback },
        })
    }
}

impl LoggerSettings {
    /// Parse settings from a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Validate every entry and produce the destinations in declaration order.
    ///
    /// Any unknown kind rejects the whole list.
    pub fn destinations(&self, callback: Option<ReportCallback>) -> Result<Vec<Destination>, ConfigError> {
        self.destinations
            .iter()
            .map(|entry| entry.to_destination(callback.clone()))
            .collect()
    }

    /// Build a logger; report destinations get a no-op callback.
    pub fn build(&self) -> Result<Logger, ConfigError> {
        self.build_with_callback(None)
    }

    /// Build a logger whose report destination invokes `callback`.
    pub fn build_with_callback(&self, callback: Option<ReportCallback>) -> Result<Logger, ConfigError> {
        let destinations = self.destinations(callback)?;
        Ok(LoggerBuilder::new(self.service.clone())
            .destinations(destinations)
            .build())
    }
}
