//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Error types for logger construction."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

/// Errors raised while turning settings into a logger.
///
/// Only construction can fail. Once a [`crate::Logger`] exists no logging
/// call reports an error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A destination named a kind that is neither console, file nor report.
    #[error("invalid logger destination kind `{0}`")]
    UnknownKind(String),
    /// A level string could not be parsed in strict mode.
    #[error("invalid log level `{0}`")]
    UnknownLevel(String),
    /// The settings document was not valid TOML for [`crate::LoggerSettings`].
    #[error("failed to parse logger settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors raised when wiring a logger into the process.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A global `tracing` dispatcher was already installed.
    #[error("global logger already installed: {0}")]
    GlobalInstall(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_names_the_offender() {
        let err = ConfigError::UnknownKind("syslog".into());
        assert_eq!(format!("{err}"), "invalid logger destination kind `syslog`");
    }
}
