//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Composition of per-severity sink layers."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use tracing::debug;
use tracing_subscriber::fmt::{self as subscriber_fmt, MakeWriter};
use tracing_subscriber::layer::Layer;
use tracing_subscriber::Registry;

use crate::encoder::{EncoderStyle, RecordFormat};
use crate::filter::{cascade, SeverityFilter};
use crate::rotate::RotatingFile;
use crate::severity::Severity;
use crate::sink::{CallbackWriter, ConsoleWriter, DestinationSet, SinkDescriptor, SinkFamily};

/// Type-erased sink layer installed on the registry.
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Ordered sink layers plus a description of each, index for index.
#[derive(Default)]
pub struct LogCore {
    layers: Vec<BoxedLayer>,
    sinks: Vec<SinkDescriptor>,
}

impl LogCore {
    /// Descriptions of the composed sinks.
    pub fn sinks(&self) -> &[SinkDescriptor] {
        &self.sinks
    }

    /// Split into layers and descriptors.
    pub fn into_parts(self) -> (Vec<BoxedLayer>, Vec<SinkDescriptor>) {
        (self.layers, self.sinks)
    }

    fn push(&mut self, family: SinkFamily, filter: SeverityFilter, target: String, layer: BoxedLayer) {
        self.layers.push(layer);
        self.sinks.push(SinkDescriptor {
            family,
            filter,
            target,
        });
    }
}

/// File name of the artifact receiving `severity` records.
pub fn log_file_name(path: &str, service: &str, severity: Severity) -> String {
    format!("{path}{service}.{}.log", severity.as_str())
}

/// Build the sink layers for `destinations`.
///
/// Order is console, file, callback; within a family it follows the cascade
/// from the configured floor up to the `Error`-or-above band.
pub fn compose(
    service: &Arc<str>,
    destinations: &DestinationSet,
    console: &ConsoleWriter,
) -> LogCore {
    let mut core = LogCore::default();

    if let Some(level) = destinations.console {
        for filter in cascade(level) {
            let layer = sink_layer(
                RecordFormat::new(EncoderStyle::Console, Arc::clone(service)),
                console.ansi(),
                console.clone(),
                filter,
            );
            core.push(SinkFamily::Console, filter, "stdout".to_owned(), layer);
        }
    }

    if let Some((level, path)) = &destinations.file {
        if !path.is_empty() {
            for filter in cascade(*level) {
                let target = log_file_name(path, service, filter.severity());
                let layer = sink_layer(
                    RecordFormat::new(EncoderStyle::Json, Arc::clone(service)),
                    false,
                    RotatingFile::new(&target),
                    filter,
                );
                core.push(SinkFamily::File, filter, target, layer);
            }
        }
    }

    if let Some((level, callback)) = &destinations.report {
        for filter in cascade(*level) {
            let layer = sink_layer(
                RecordFormat::new(EncoderStyle::Report, Arc::clone(service)),
                false,
                CallbackWriter::new(filter.severity(), Arc::clone(callback)),
                filter,
            );
            core.push(SinkFamily::Callback, filter, "callback".to_owned(), layer);
        }
    }

    debug!(service = %service, sinks = core.sinks.len(), "composed log core");
    core
}

fn sink_layer<W>(format: RecordFormat, ansi: bool, writer: W, filter: SeverityFilter) -> BoxedLayer
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    subscriber_fmt::layer()
        .event_format(format)
        .with_ansi(ansi)
        .with_writer(writer)
        .with_filter(filter)
        .boxed()
}
