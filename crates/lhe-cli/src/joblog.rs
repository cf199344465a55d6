//! Per-sample log files for batch runs: `<out_dir>/<label>.log`.
//!
//! lhe-core wraps each processed file in an `info_span!("file", label, path)`.
//! Once enabled, this layer opens one log per label for every such span and
//! appends the span's events to it, next to the run outputs.

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

const FILE_SPAN: &str = "file";

/// Cloneable handle; the clone installed as a layer and the one kept by the
/// command share state.
#[derive(Clone, Default)]
pub struct JobLogs {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    dir: OnceLock<PathBuf>,
    open: Mutex<HashMap<PathBuf, Arc<Mutex<File>>>>,
}

/// Log file attached to a `file` span.
struct JobLog(Arc<Mutex<File>>);

impl JobLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start writing per-sample logs into `dir`. Only the first call counts.
    pub fn enable(&self, dir: &Path) {
        if self.shared.dir.set(dir.to_path_buf()).is_err() {
            tracing::debug!("job logs already enabled");
        }
    }

    /// Shared handle for `<dir>/<name>.log`, truncated on first use in this run.
    fn open(&self, name: &str) -> Option<Arc<Mutex<File>>> {
        let dir = self.shared.dir.get()?;
        let path = dir.join(format!("{name}.log"));
        let mut open = self.shared.open.lock().ok()?;
        if let Some(f) = open.get(&path) {
            return Some(Arc::clone(f));
        }
        match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
            Ok(f) => {
                let f = Arc::new(Mutex::new(f));
                open.insert(path, Arc::clone(&f));
                Some(f)
            }
            Err(e) => {
                // Not fatal to the run.
                eprintln!("cannot create log file {}: {e}", path.display());
                None
            }
        }
    }
}

impl<S> Layer<S> for JobLogs
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != FILE_SPAN {
            return;
        }
        let mut fields = SpanFields::default();
        attrs.record(&mut fields);
        let Some(name) = fields.log_name() else { return };
        if let (Some(file), Some(span)) = (self.open(&name), ctx.span(id)) {
            span.extensions_mut().insert(JobLog(file));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(scope) = ctx.event_scope(event) else { return };
        for span in scope {
            let ext = span.extensions();
            let Some(JobLog(file)) = ext.get::<JobLog>() else { continue };
            let mut line = EventLine::default();
            event.record(&mut line);
            if let Ok(mut f) = file.lock() {
                let level = event.metadata().level().as_str();
                // Best effort, see `open`.
                let _ = writeln!(f, "{level:>5} {}{}", line.message, line.fields);
            }
            return;
        }
    }
}

#[derive(Default)]
struct SpanFields {
    label: Option<String>,
    path: Option<String>,
}

impl SpanFields {
    /// The sample label, else the input file name.
    fn log_name(&self) -> Option<String> {
        let name = match self.label.as_deref() {
            Some(l) if !l.is_empty() && l != "-" => l.to_string(),
            _ => Path::new(self.path.as_deref()?).file_name()?.to_string_lossy().into_owned(),
        };
        Some(name.replace(['/', '\\'], "_"))
    }
}

impl Visit for SpanFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "label" => self.label = Some(value.to_string()),
            "path" => self.path = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "label" => self.label = Some(format!("{value:?}")),
            "path" => self.path = Some(format!("{value:?}")),
            _ => {}
        }
    }
}

/// `message key=value ...`, strings unquoted.
#[derive(Default)]
struct EventLine {
    message: String,
    fields: String,
}

impl Visit for EventLine {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}
