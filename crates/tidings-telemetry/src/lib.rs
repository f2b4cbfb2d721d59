//! Tracing setup for hosts embedding Tidings, plus a layer that hands the
//! emitter's warnings back to the host as structured [`Diagnostic`]s.

mod subscriber;

pub use subscriber::{
    capture_warnings, init_subscriber, Diagnostic, DiagnosticLayer, TelemetryConfig,
    EMITTER_TARGET,
};
