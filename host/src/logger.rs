//! Routes `tracing` events into the host's own log.
//!
//! The host registers a sink once; every event emitted with a [`crate::Log`] target is
//! rendered to a single line (message first, then `key=value` fields) and handed over.
//! Tools and tests that have no host log can use [`init_stderr`] instead.

use std::fmt::{self, Write};
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// The host-side log function: `(level, target, rendered message)`.
pub type LogSinkFn = Arc<dyn Fn(Level, &str, &str) + Send + Sync>;

/// A layer that forwards every event to a [`LogSinkFn`].
pub struct HostLogLayer {
    sink: LogSinkFn,
}

impl HostLogLayer {
    pub fn new(sink: LogSinkFn) -> Self {
        Self { sink }
    }
}

impl fmt::Debug for HostLogLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLogLayer").finish_non_exhaustive()
    }
}

/// Collects the `message` field and renders the remaining fields after it.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn into_line(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S> Layer<S> for HostLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        (self.sink)(*metadata.level(), metadata.target(), &visitor.into_line());
    }
}

/// Installs the host log sink as the global subscriber.
///
/// Calling this more than once is harmless; only the first sink wins.
pub fn init(sink: LogSinkFn, max_level: Level) {
    let result = tracing_subscriber::registry()
        .with(LevelFilter::from_level(max_level))
        .with(HostLogLayer::new(sink))
        .try_init();

    if let Err(error) = result {
        tracing::debug!(target: crate::Log::Host, ?error, "Logger already initialized");
    }
}

/// Installs a plain stderr subscriber, for tools and tests without a host log.
pub fn init_stderr(max_level: Level) {
    let result = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(error) = result {
        tracing::debug!(target: crate::Log::Host, ?error, "Logger already initialized");
    }
}
