use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log target of the emitter crate.
pub const EMITTER_TARGET: &str = "tidings_events";

/// A WARN or ERROR event raised by the emitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    /// The `event` field, when the emitter attached the event name.
    pub event: Option<String>,
}

/// Forwards emitter warnings and errors into a channel. Events from other
/// targets are ignored.
pub struct DiagnosticLayer {
    tx: UnboundedSender<Diagnostic>,
    target: &'static str,
}

impl DiagnosticLayer {
    pub fn new(tx: UnboundedSender<Diagnostic>) -> Self {
        Self {
            tx,
            target: EMITTER_TARGET,
        }
    }

    /// Accept events whose target starts with `target` instead.
    pub fn with_target(mut self, target: &'static str) -> Self {
        self.target = target;
        self
    }
}

#[derive(Default)]
struct DiagnosticVisitor {
    message: Option<String>,
    event: Option<String>,
}

impl DiagnosticVisitor {
    fn record(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            "event" => self.event = Some(value),
            _ => {}
        }
    }
}

impl Visit for DiagnosticVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }
}

impl<S> tracing_subscriber::Layer<S> for DiagnosticLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !matches!(*metadata.level(), Level::WARN | Level::ERROR)
            || !metadata.target().starts_with(self.target)
        {
            return;
        }

        let mut visitor = DiagnosticVisitor::default();
        event.record(&mut visitor);

        let _ = self.tx.send(Diagnostic {
            level: *metadata.level(),
            message: visitor.message.unwrap_or_default(),
            event: visitor.event,
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Default level for every target.
    #[serde(default = "default_level")]
    pub level: String,

    /// Level for the emitter's own target; dispatch tracing lives at `debug`
    /// and `trace`.
    #[serde(default = "default_emitter_level")]
    pub emitter_level: String,

    #[serde(default)]
    pub json_output: bool,
}

impl TelemetryConfig {
    pub fn filter_directives(&self) -> String {
        format!("{},{}={}", self.level, EMITTER_TARGET, self.emitter_level)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            emitter_level: default_emitter_level(),
            json_output: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_emitter_level() -> String {
    "warn".to_string()
}

/// Installs the global subscriber. `RUST_LOG` wins over the config.
/// Fails if a global subscriber is already set.
pub fn init_subscriber(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
    }
}

/// A subscriber recording emitter diagnostics, for scoped use with
/// `tracing::subscriber::with_default`.
pub fn capture_warnings() -> (impl Subscriber + Send + Sync, UnboundedReceiver<Diagnostic>) {
    let (tx, rx) = unbounded_channel();
    let subscriber = tracing_subscriber::registry().with(DiagnosticLayer::new(tx));
    (subscriber, rx)
}
