//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Record encoders for console, file and report sinks."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use chrono::Local;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Metadata, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

use crate::severity::Severity;

/// Layout of the human-readable timestamp carried by every record.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Field name that overrides the callsite-derived caller annotation.
pub const CALLER_FIELD: &str = "caller";

/// Field name carrying the owning service in structured output.
pub const SERVICE_FIELD: &str = "service";

/// How a destination family renders records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderStyle {
    /// Tab separated, colourised level, for terminals.
    Console,
    /// One JSON object per line, for files.
    Json,
    /// Console layout without colour and with the caller on its own line.
    Report,
}

/// `tracing-subscriber` event formatter bound to one service.
#[derive(Debug, Clone)]
pub struct RecordFormat {
    style: EncoderStyle,
    service: Arc<str>,
}

impl RecordFormat {
    /// Create a formatter stamping `service` onto every record.
    pub fn new(style: EncoderStyle, service: Arc<str>) -> Self {
        Self { style, service }
    }

    /// Rendering style of this formatter.
    pub fn style(&self) -> EncoderStyle {
        self.style
    }

    fn write_console(
        &self,
        writer: &mut Writer<'_>,
        record: Record,
        caller_break: &str,
    ) -> fmt::Result {
        write!(writer, "[{}]\t", timestamp())?;
        write_level(writer, record.label)?;
        if let Some(caller) = &record.caller {
            write!(writer, "\t[{caller}]{caller_break}")?;
        }
        write!(writer, "\t{}", record.message)?;

        let mut fields = record.fields;
        fields.insert(SERVICE_FIELD.to_owned(), Value::from(self.service.as_ref()));
        let rendered = serde_json::to_string(&Value::Object(fields)).map_err(|_| fmt::Error)?;
        writeln!(writer, "\t{rendered}")
    }

    fn write_json(&self, writer: &mut Writer<'_>, record: Record) -> fmt::Result {
        let mut object = record.fields;
        object.insert("timestamp".to_owned(), Value::from(timestamp()));
        object.insert("level".to_owned(), Value::from(record.label));
        if let Some(caller) = record.caller {
            object.insert(CALLER_FIELD.to_owned(), Value::from(caller));
        }
        object.insert("message".to_owned(), Value::from(record.message));
        object.insert(SERVICE_FIELD.to_owned(), Value::from(self.service.as_ref()));
        let rendered = serde_json::to_string(&Value::Object(object)).map_err(|_| fmt::Error)?;
        writeln!(writer, "{rendered}")
    }
}

impl<S, N> FormatEvent<S, N> for RecordFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let record = Record::capture(event);
        match self.style {
            EncoderStyle::Console => self.write_console(&mut writer, record, ""),
            EncoderStyle::Report => self.write_console(&mut writer, record, "\n"),
            EncoderStyle::Json => self.write_json(&mut writer, record),
        }
    }
}

/// Flattened view of one event.
struct Record {
    label: &'static str,
    message: String,
    caller: Option<String>,
    fields: Map<String, Value>,
}

impl Record {
    fn capture(event: &Event<'_>) -> Self {
        let metadata = event.metadata();
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let caller = if metadata.fields().field(CALLER_FIELD).is_some() {
            visitor.caller
        } else {
            callsite(metadata)
        };

        Self {
            label: Severity::from_level(metadata.level())
                .map(|severity| severity.label())
                .unwrap_or("TRACE"),
            message: visitor.message.unwrap_or_default(),
            caller: caller.map(|caller| trim_caller(&caller)),
            fields: visitor.fields,
        }
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: Option<String>,
    caller: Option<String>,
    fields: Map<String, Value>,
}

impl RecordVisitor {
    fn record_value(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => {
                self.message = Some(match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                })
            }
            CALLER_FIELD => {
                self.caller = match value {
                    Value::String(text) if text.is_empty() => None,
                    Value::String(text) => Some(text),
                    other => Some(other.to_string()),
                }
            }
            name => {
                self.fields.insert(name.to_owned(), value);
            }
        }
    }
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_value(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record_value(field, Value::from(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, Value::from(format!("{value:?}")));
    }
}

fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn callsite(metadata: &Metadata<'_>) -> Option<String> {
    let file = metadata.file()?;
    Some(match metadata.line() {
        Some(line) => format!("{file}:{line}"),
        None => file.to_owned(),
    })
}

/// Keep the last directory and file name of a `path:line` caller.
pub fn trim_caller(caller: &str) -> String {
    let normalized = caller.replace('\\', "/");
    let mut parts = normalized.rsplitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(file), Some(dir), Some(_)) => format!("{dir}/{file}"),
        _ => normalized,
    }
}

fn write_level(writer: &mut Writer<'_>, label: &str) -> fmt::Result {
    if writer.has_ansi_escapes() {
        let color = match label {
            "ERROR" => "\x1b[31m",
            "WARN" => "\x1b[33m",
            "INFO" => "\x1b[34m",
            "DEBUG" => "\x1b[35m",
            _ => "\x1b[36m",
        };
        write!(writer, "{color}{label}\x1b[0m")
    } else {
        write!(writer, "{label}")
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use parking_lot::Mutex;
    use tracing_subscriber::fmt::MakeWriter;
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn render(style: EncoderStyle, emit: impl FnOnce()) -> String {
        let capture = Capture::default();
        let layer = tracing_subscriber::fmt::layer()
            .event_format(RecordFormat::new(style, Arc::from("billing")))
            .with_ansi(false)
            .with_writer(capture.clone());
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, emit);
        capture.text()
    }

    #[test]
    fn json_record_carries_service_caller_and_fields() {
        let output = render(EncoderStyle::Json, || {
            tracing::warn!(order = 42_u64, "payment delayed");
        });
        let value: Value = serde_json::from_str(output.trim()).expect("json line");
        assert_eq!(value["level"], "WARN");
        assert_eq!(value["message"], "payment delayed");
        assert_eq!(value["service"], "billing");
        assert_eq!(value["order"], 42);
        assert!(value["caller"].as_str().unwrap().contains("encoder.rs:"));
        assert_eq!(value["timestamp"].as_str().unwrap().len(), 19);
    }

    #[test]
    fn explicit_caller_field_overrides_callsite() {
        let output = render(EncoderStyle::Json, || {
            tracing::info!(caller = "app/src/handlers.rs:17", "query");
        });
        let value: Value = serde_json::from_str(output.trim()).expect("json line");
        assert_eq!(value["caller"], "src/handlers.rs:17");
    }

    #[test]
    fn unrecorded_caller_field_suppresses_annotation() {
        let output = render(EncoderStyle::Json, || {
            let caller: Option<&str> = None;
            tracing::info!(caller, "query");
        });
        let value: Value = serde_json::from_str(output.trim()).expect("json line");
        assert!(value.get("caller").is_none());
    }

    #[test]
    fn report_layout_breaks_after_caller() {
        let output = render(EncoderStyle::Report, || {
            tracing::error!("disk full");
        });
        let mut lines = output.lines();
        let head = lines.next().unwrap();
        assert!(head.contains("\tERROR\t["));
        assert!(head.ends_with(']'));
        let body = lines.next().unwrap();
        assert!(body.starts_with("\tdisk full\t"));
        assert!(body.contains("\"service\":\"billing\""));
    }

    #[test]
    fn trim_caller_keeps_parent_directory() {
        assert_eq!(trim_caller("/a/b/c/file.rs:10"), "c/file.rs:10");
        assert_eq!(trim_caller("src/main.rs:3"), "src/main.rs:3");
        assert_eq!(trim_caller("main.rs:3"), "main.rs:3");
    }
}
