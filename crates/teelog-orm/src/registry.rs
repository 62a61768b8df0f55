//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Explicit process-wide default query logger slot."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! The slot starts empty and only changes through [`set_default`] and
//! [`clear_default`]. Code that is handed a [`QueryLogger`] should prefer that
//! handle; the slot exists for libraries that look a logger up globally.
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::adapter::QueryLogger;

static DEFAULT_LOGGER: Lazy<RwLock<Option<Arc<dyn QueryLogger>>>> = Lazy::new(|| RwLock::new(None));

/// Install `logger` as the default, returning the one it replaces.
pub fn set_default(logger: Arc<dyn QueryLogger>) -> Option<Arc<dyn QueryLogger>> {
    DEFAULT_LOGGER.write().replace(logger)
}

/// Current default, if one was installed.
pub fn default_logger() -> Option<Arc<dyn QueryLogger>> {
    DEFAULT_LOGGER.read().clone()
}

/// Empty the slot, returning the previous default.
pub fn clear_default() -> Option<Arc<dyn QueryLogger>> {
    DEFAULT_LOGGER.write().take()
}
