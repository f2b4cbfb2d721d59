//! In-process named-event emitter.
//!
//! Handlers are registered per event name and run in registration order when
//! the event is emitted; `emit` resolves once every asynchronous handler has
//! settled. One-time handlers, a soft per-event listener cap, a compile-time
//! checked [`TypedEmitter`], and a shared [`EventBus`] sit on top.
//!
//! ```
//! use serde_json::{json, Value};
//! use tidings_events::{Emitter, Handler};
//!
//! # async fn run() -> Result<(), tidings_events::EmitError> {
//! let emitter: Emitter = Emitter::new();
//! let greet = Handler::sync(|name: Option<Value>| {
//!     println!("hello {}", name.unwrap_or_default());
//!     Ok(())
//! });
//! emitter.on("greet", greet.clone());
//! emitter.emit("greet", Some(json!("ada"))).await?;
//! emitter.off("greet", &greet);
//! # Ok(())
//! # }
//! ```

mod bus;
mod emitter;
mod error;
mod handler;
mod registry;
mod typed;

pub use bus::EventBus;
pub use emitter::Emitter;
pub use error::{EmitError, HandlerError, HandlerFailure};
pub use handler::{EventListener, Handler, HandlerResult, Outcome};
pub use registry::RawListener;
pub use tidings_config::{EmitterConfig, TidingsConfig};
pub use typed::{ErasedPayload, TypedEmitter, TypedEvent, TypedHandler};
