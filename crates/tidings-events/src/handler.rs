use crate::error::HandlerError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub type HandlerResult = Result<(), HandlerError>;

/// What a handler hands back to the dispatcher for one invocation.
pub enum Outcome {
    /// The handler finished during the call.
    Done(HandlerResult),
    /// Work the dispatcher awaits before `emit` completes.
    Deferred(BoxFuture<'static, HandlerResult>),
}

impl From<HandlerResult> for Outcome {
    fn from(result: HandlerResult) -> Self {
        Outcome::Done(result)
    }
}

type Callback<P> = dyn Fn(Option<P>) -> Outcome + Send + Sync;

/// A registered callable.
///
/// Cloning is cheap and keeps identity: `off` removes an entry only when it is
/// given a clone of the very handler that was registered. Two handlers built
/// from identical closures are different listeners.
pub struct Handler<P> {
    callback: Arc<Callback<P>>,
    name: Option<Arc<str>>,
}

impl<P> Handler<P> {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Option<P>) -> Outcome + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(f),
            name: None,
        }
    }

    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Option<P>) -> HandlerResult + Send + Sync + 'static,
    {
        Self::from_fn(move |payload| Outcome::Done(f(payload)))
    }

    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: Fn(Option<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::from_fn(move |payload| Outcome::Deferred(Box::pin(f(payload))))
    }

    pub fn from_listener<L>(listener: Arc<L>) -> Self
    where
        L: EventListener<P> + 'static,
        P: Send + 'static,
    {
        let name = listener.name().to_string();
        Self::from_fn(move |payload| {
            let listener = Arc::clone(&listener);
            Outcome::Deferred(Box::pin(async move { listener.handle(payload).await }))
        })
        .named(name)
    }

    /// Attaches a label used in diagnostics. Identity is unchanged.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(Arc::from(name.into()));
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn same_as(&self, other: &Handler<P>) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }

    pub(crate) fn invoke(&self, payload: Option<P>) -> Outcome {
        (self.callback)(payload)
    }
}

impl<P> Clone for Handler<P> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
            name: self.name.clone(),
        }
    }
}

impl<P> PartialEq for Handler<P> {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl<P> Eq for Handler<P> {}

impl<P> fmt::Debug for Handler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("callback", &Arc::as_ptr(&self.callback).cast::<()>())
            .finish()
    }
}

/// Struct-based handler, for listeners that carry their own state.
#[async_trait]
pub trait EventListener<P: Send + 'static>: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, payload: Option<P>) -> HandlerResult;
}
