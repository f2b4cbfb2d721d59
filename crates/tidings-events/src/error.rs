//! Error types surfaced by dispatch.

use std::any::Any;
use thiserror::Error;

/// Why a single handler invocation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("payload for '{event}' is not a {expected}")]
    PayloadType {
        event: &'static str,
        expected: &'static str,
    },
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

/// A failed handler together with its position in the dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler #{index} ({}) failed: {error}", .handler.as_deref().unwrap_or("anonymous"))]
pub struct HandlerFailure {
    /// Position of the handler in the dispatch order.
    pub index: usize,
    pub handler: Option<String>,
    #[source]
    pub error: HandlerError,
}

#[derive(Debug, Error)]
pub enum EmitError {
    /// Every handler ran; these are the ones that failed, in dispatch order.
    #[error("{} handler(s) failed while emitting '{event}'", .failures.len())]
    Handlers {
        event: String,
        failures: Vec<HandlerFailure>,
    },
}

impl EmitError {
    pub fn event(&self) -> &str {
        match self {
            Self::Handlers { event, .. } => event,
        }
    }

    pub fn failures(&self) -> &[HandlerFailure] {
        match self {
            Self::Handlers { failures, .. } => failures,
        }
    }
}
