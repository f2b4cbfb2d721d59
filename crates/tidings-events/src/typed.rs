//! Schema-checked view over [`Emitter`].
//!
//! A schema is any marker type. Each event belonging to it is its own payload
//! type with a fixed name:
//!
//! ```
//! use std::sync::Arc;
//! use tidings_events::{TypedEmitter, TypedEvent, TypedHandler};
//!
//! enum Shop {}
//!
//! struct OrderPlaced {
//!     id: u64,
//! }
//!
//! impl TypedEvent for OrderPlaced {
//!     type Schema = Shop;
//!     const NAME: &'static str = "order_placed";
//! }
//!
//! # async fn run() {
//! let shop: TypedEmitter<Shop> = TypedEmitter::new();
//! shop.on(TypedHandler::sync(|order: Arc<OrderPlaced>| {
//!     assert_eq!(order.id, 7);
//!     Ok(())
//! }));
//! shop.emit(OrderPlaced { id: 7 }).await.unwrap();
//! # }
//! ```
//!
//! Using an event from another schema is a compile error. At runtime every
//! call is forwarded to the wrapped emitter as-is.

use crate::emitter::Emitter;
use crate::error::{EmitError, HandlerError};
use crate::handler::{Handler, HandlerResult, Outcome};
use crate::registry::RawListener;
use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tidings_config::EmitterConfig;

/// Payload type of the emitter behind a [`TypedEmitter`].
pub type ErasedPayload = Arc<dyn Any + Send + Sync>;

pub trait TypedEvent: Send + Sync + 'static {
    type Schema;
    const NAME: &'static str;
}

/// Handler for a single typed event. Identity semantics match [`Handler`].
pub struct TypedHandler<E> {
    inner: Handler<ErasedPayload>,
    _event: PhantomData<fn(Arc<E>)>,
}

impl<E: TypedEvent> TypedHandler<E> {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Arc<E>) -> HandlerResult + Send + Sync + 'static,
    {
        Self::wrap(Handler::from_fn(
            move |payload: Option<ErasedPayload>| match downcast::<E>(payload) {
                Ok(event) => Outcome::Done(f(event)),
                Err(error) => Outcome::Done(Err(error)),
            },
        ))
    }

    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::wrap(Handler::from_fn(
            move |payload: Option<ErasedPayload>| match downcast::<E>(payload) {
                Ok(event) => Outcome::Deferred(Box::pin(f(event))),
                Err(error) => Outcome::Done(Err(error)),
            },
        ))
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        Self::wrap(self.inner.named(name))
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    pub fn same_as(&self, other: &TypedHandler<E>) -> bool {
        self.inner.same_as(&other.inner)
    }

    fn wrap(inner: Handler<ErasedPayload>) -> Self {
        Self {
            inner,
            _event: PhantomData,
        }
    }
}

fn downcast<E: TypedEvent>(payload: Option<ErasedPayload>) -> Result<Arc<E>, HandlerError> {
    payload
        .and_then(|p| p.downcast::<E>().ok())
        .ok_or_else(|| HandlerError::PayloadType {
            event: E::NAME,
            expected: type_name::<E>(),
        })
}

impl<E> Clone for TypedHandler<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _event: PhantomData,
        }
    }
}

impl<E> PartialEq for TypedHandler<E> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<E> Eq for TypedHandler<E> {}

impl<E> fmt::Debug for TypedHandler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedHandler").field(&self.inner).finish()
    }
}

/// An [`Emitter`] whose events are restricted to schema `S`.
pub struct TypedEmitter<S> {
    inner: Emitter<ErasedPayload>,
    _schema: PhantomData<fn() -> S>,
}

impl<S> TypedEmitter<S> {
    pub fn new() -> Self {
        Self::with_config(EmitterConfig::default())
    }

    pub fn with_config(config: EmitterConfig) -> Self {
        Self {
            inner: Emitter::with_config(config),
            _schema: PhantomData,
        }
    }

    pub fn on<E: TypedEvent<Schema = S>>(&self, handler: TypedHandler<E>) {
        self.inner.on(E::NAME, handler.inner);
    }

    pub fn once<E: TypedEvent<Schema = S>>(&self, handler: TypedHandler<E>) {
        self.inner.once(E::NAME, handler.inner);
    }

    pub fn add_listener<E: TypedEvent<Schema = S>>(&self, handler: TypedHandler<E>) {
        self.inner.add_listener(E::NAME, handler.inner);
    }

    pub fn prepend_listener<E: TypedEvent<Schema = S>>(&self, handler: TypedHandler<E>) {
        self.inner.prepend_listener(E::NAME, handler.inner);
    }

    pub fn prepend_once_listener<E: TypedEvent<Schema = S>>(&self, handler: TypedHandler<E>) {
        self.inner.prepend_once_listener(E::NAME, handler.inner);
    }

    pub fn off<E: TypedEvent<Schema = S>>(&self, handler: &TypedHandler<E>) {
        self.inner.off(E::NAME, &handler.inner);
    }

    pub fn remove_listener<E: TypedEvent<Schema = S>>(&self, handler: &TypedHandler<E>) {
        self.inner.remove_listener(E::NAME, &handler.inner);
    }

    pub async fn emit<E: TypedEvent<Schema = S>>(&self, event: E) -> Result<(), EmitError> {
        let payload: ErasedPayload = Arc::new(event);
        self.inner.emit(E::NAME, Some(payload)).await
    }

    pub fn remove_all_listeners<E: TypedEvent<Schema = S>>(&self) {
        self.inner.remove_all_listeners(Some(E::NAME));
    }

    /// Removes every handler for every event of the schema.
    pub fn clear(&self) {
        self.inner.remove_all_listeners(None);
    }

    pub fn listener_count<E: TypedEvent<Schema = S>>(&self) -> usize {
        self.inner.listener_count(E::NAME)
    }

    pub fn event_names(&self) -> Vec<String> {
        self.inner.event_names()
    }

    pub fn set_max_listeners(&self, n: usize) {
        self.inner.set_max_listeners(n);
    }

    pub fn max_listeners(&self) -> usize {
        self.inner.max_listeners()
    }

    pub fn listeners<E: TypedEvent<Schema = S>>(&self) -> Vec<TypedHandler<E>> {
        self.inner
            .listeners(E::NAME)
            .into_iter()
            .map(TypedHandler::wrap)
            .collect()
    }

    pub fn raw_listeners<E>(&self) -> Vec<RawListener<TypedHandler<E>>>
    where
        E: TypedEvent<Schema = S>,
    {
        self.inner
            .raw_listeners(E::NAME)
            .into_iter()
            .map(|raw| RawListener {
                handler: TypedHandler::wrap(raw.handler),
                once: raw.once,
            })
            .collect()
    }
}

impl<S> Default for TypedEmitter<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for TypedEmitter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedEmitter")
            .field("schema", &type_name::<S>())
            .field("inner", &self.inner)
            .finish()
    }
}
