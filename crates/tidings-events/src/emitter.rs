use crate::error::{EmitError, HandlerError, HandlerFailure};
use crate::handler::{Handler, Outcome};
use crate::registry::{HandlerRegistry, RawListener};
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use tidings_config::EmitterConfig;

/// Named-event emitter.
///
/// Handlers for an event run in registration order. `emit` invokes each one
/// in turn, then awaits every deferred result before returning. The registry
/// lock is never held while a handler runs, so handlers may register, remove
/// or emit re-entrantly; such changes apply from the next dispatch on.
///
/// Handler failures do not stop the dispatch. Every handler runs, each
/// failure is logged, and `emit` then returns [`EmitError::Handlers`] listing
/// all of them.
pub struct Emitter<P = serde_json::Value> {
    registry: Mutex<HandlerRegistry<P>>,
    max_listeners: AtomicUsize,
}

impl<P> Emitter<P> {
    pub fn new() -> Self {
        Self::with_config(EmitterConfig::default())
    }

    pub fn with_config(config: EmitterConfig) -> Self {
        Self {
            registry: Mutex::new(HandlerRegistry::new()),
            max_listeners: AtomicUsize::new(config.max_listeners),
        }
    }

    pub fn on(&self, event: impl AsRef<str>, handler: Handler<P>) {
        self.register(event.as_ref(), handler, false, false);
    }

    pub fn once(&self, event: impl AsRef<str>, handler: Handler<P>) {
        self.register(event.as_ref(), handler, true, false);
    }

    pub fn add_listener(&self, event: impl AsRef<str>, handler: Handler<P>) {
        self.on(event, handler);
    }

    /// Like [`on`](Self::on) but runs before handlers already registered.
    pub fn prepend_listener(&self, event: impl AsRef<str>, handler: Handler<P>) {
        self.register(event.as_ref(), handler, false, true);
    }

    pub fn prepend_once_listener(&self, event: impl AsRef<str>, handler: Handler<P>) {
        self.register(event.as_ref(), handler, true, true);
    }

    /// Removes the first registration of `handler` under `event`, if any.
    pub fn off(&self, event: &str, handler: &Handler<P>) {
        if self.registry.lock().remove(event, handler) {
            tracing::trace!("Removed listener from '{}'", event);
        }
    }

    pub fn remove_listener(&self, event: &str, handler: &Handler<P>) {
        self.off(event, handler);
    }

    /// Clears one event's handlers, or every event's when `event` is `None`.
    pub fn remove_all_listeners(&self, event: Option<&str>) {
        self.registry.lock().clear(event);
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.registry.lock().len(event)
    }

    pub fn has_listeners(&self, event: &str) -> bool {
        self.listener_count(event) > 0
    }

    /// Names with at least one handler, ordered by when each last became
    /// non-empty.
    pub fn event_names(&self) -> Vec<String> {
        self.registry.lock().names()
    }

    /// Soft cap; `0` disables the warning. Existing registrations are untouched.
    pub fn set_max_listeners(&self, n: usize) {
        self.max_listeners.store(n, Ordering::Relaxed);
    }

    pub fn max_listeners(&self) -> usize {
        self.max_listeners.load(Ordering::Relaxed)
    }

    pub fn listeners(&self, event: &str) -> Vec<Handler<P>> {
        self.registry.lock().handlers(event)
    }

    pub fn raw_listeners(&self, event: &str) -> Vec<RawListener<Handler<P>>> {
        self.registry.lock().raw(event)
    }

    fn register(&self, event: &str, handler: Handler<P>, once: bool, prepend: bool) {
        let max = self.max_listeners();
        let (count, warn) = {
            let mut registry = self.registry.lock();
            let count = registry.insert(event, handler, once, prepend);
            let warn = max > 0 && count > max && registry.mark_warned(event);
            (count, warn)
        };

        tracing::trace!("Registered listener #{} for '{}' (once: {})", count, event, once);

        if warn {
            tracing::warn!(
                event = %event,
                "Possible listener leak: {} listeners registered for '{}', max_listeners is {}",
                count,
                event,
                max
            );
        }
    }
}

impl<P: Clone> Emitter<P> {
    /// Runs every handler registered for `event` with a clone of `payload`.
    ///
    /// One-time handlers are unregistered before any handler is invoked.
    /// Resolves once all deferred results have settled.
    pub async fn emit(&self, event: &str, payload: Option<P>) -> Result<(), EmitError> {
        let handlers = self.registry.lock().take_dispatch(event);
        if handlers.is_empty() {
            tracing::trace!("No listeners for '{}'", event);
            return Ok(());
        }

        tracing::debug!("Dispatching '{}' to {} listener(s)", event, handlers.len());

        let mut failures = Vec::new();
        let mut pending = Vec::new();

        for (index, handler) in handlers.iter().enumerate() {
            let invoked =
                panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(payload.clone())));
            match invoked {
                Ok(Outcome::Done(Ok(()))) => {}
                Ok(Outcome::Done(Err(error))) => failures.push(failure(index, handler, error)),
                Ok(Outcome::Deferred(fut)) => pending.push(async move {
                    let result = match AssertUnwindSafe(fut).catch_unwind().await {
                        Ok(result) => result,
                        Err(cause) => Err(HandlerError::from_panic(cause.as_ref())),
                    };
                    (index, result)
                }),
                Err(cause) => failures.push(failure(
                    index,
                    handler,
                    HandlerError::from_panic(cause.as_ref()),
                )),
            }
        }

        for (index, result) in join_all(pending).await {
            if let Err(error) = result {
                failures.push(failure(index, &handlers[index], error));
            }
        }

        if failures.is_empty() {
            return Ok(());
        }

        failures.sort_by_key(|f| f.index);
        for f in &failures {
            tracing::warn!(event = %event, "Listener for '{}' failed: {}", event, f);
        }

        Err(EmitError::Handlers {
            event: event.to_string(),
            failures,
        })
    }
}

fn failure<P>(index: usize, handler: &Handler<P>, error: HandlerError) -> HandlerFailure {
    HandlerFailure {
        index,
        handler: handler.name().map(str::to_string),
        error,
    }
}

impl<P> Default for Emitter<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for Emitter<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("event_names", &self.event_names())
            .field("max_listeners", &self.max_listeners())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, tag: &'static str) -> Handler<Value> {
        let log = Arc::clone(log);
        Handler::sync(move |payload| {
            log.lock().push(format!("{tag}:{}", payload.unwrap_or(Value::Null)));
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_emit_without_listeners_is_silent() {
        let emitter: Emitter = Emitter::new();
        emitter.emit("nothing", Some(json!(1))).await.unwrap();
        emitter.emit("nothing", None).await.unwrap();
        assert!(emitter.event_names().is_empty());
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let log = Log::default();
        let emitter: Emitter = Emitter::new();
        emitter.on("ready", recorder(&log, "first"));
        emitter.add_listener("ready", recorder(&log, "second"));
        emitter.prepend_listener("ready", recorder(&log, "zeroth"));

        emitter.emit("ready", Some(json!("v"))).await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["zeroth:\"v\"", "first:\"v\"", "second:\"v\""]
        );
    }

    #[tokio::test]
    async fn test_once_fires_a_single_time() {
        let log = Log::default();
        let emitter: Emitter = Emitter::new();
        emitter.once("tick", recorder(&log, "once"));
        assert_eq!(emitter.listener_count("tick"), 1);

        emitter.emit("tick", Some(json!(1))).await.unwrap();
        emitter.emit("tick", Some(json!(2))).await.unwrap();

        assert_eq!(*log.lock(), vec!["once:1"]);
        assert_eq!(emitter.listener_count("tick"), 0);
        assert!(emitter.event_names().is_empty());
    }

    #[tokio::test]
    async fn test_prepend_once_listener() {
        let log = Log::default();
        let emitter: Emitter = Emitter::new();
        emitter.on("tick", recorder(&log, "on"));
        emitter.prepend_once_listener("tick", recorder(&log, "once"));

        emitter.emit("tick", None).await.unwrap();
        emitter.emit("tick", None).await.unwrap();

        assert_eq!(*log.lock(), vec!["once:null", "on:null", "on:null"]);
    }

    #[tokio::test]
    async fn test_off_removes_by_identity() {
        let log = Log::default();
        let emitter: Emitter = Emitter::new();
        let h1 = recorder(&log, "h1");
        emitter.on("e", h1.clone());
        emitter.on("e", recorder(&log, "h2"));

        emitter.off("e", &h1);
        emitter.off("e", &recorder(&log, "h2"));
        emitter.remove_listener("unknown", &h1);

        emitter.emit("e", None).await.unwrap();
        assert_eq!(*log.lock(), vec!["h2:null"]);
        assert_eq!(emitter.listener_count("e"), 1);
    }

    #[tokio::test]
    async fn test_deferred_results_are_awaited() {
        let log = Log::default();
        let emitter: Emitter = Emitter::new();
        let sink = Arc::clone(&log);
        emitter.on(
            "p",
            Handler::deferred(move |_| {
                let sink = Arc::clone(&sink);
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    sink.lock().push("slept".to_string());
                    Ok(())
                }
            }),
        );

        emitter.emit("p", None).await.unwrap();
        assert_eq!(*log.lock(), vec!["slept"]);
    }

    #[tokio::test]
    async fn test_failures_are_collected_after_all_handlers_run() {
        let log = Log::default();
        let emitter: Emitter = Emitter::new();
        emitter.on(
            "save",
            Handler::sync(|_| Err(HandlerError::failed("disk full"))).named("writer"),
        );
        emitter.on("save", Handler::sync(|_| panic!("kaboom")));
        emitter.on(
            "save",
            Handler::deferred(|_| async { Err(HandlerError::failed("late")) }),
        );
        emitter.on("save", recorder(&log, "audit"));

        let err = emitter.emit("save", None).await.unwrap_err();

        assert_eq!(*log.lock(), vec!["audit:null"]);
        assert_eq!(err.event(), "save");
        let failures = err.failures();
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[0].index, 0);
        assert_eq!(failures[0].handler.as_deref(), Some("writer"));
        assert_eq!(failures[0].error, HandlerError::failed("disk full"));
        assert_eq!(failures[1].error, HandlerError::Panicked("kaboom".to_string()));
        assert_eq!(failures[2].index, 2);
        assert_eq!(failures[2].error, HandlerError::failed("late"));
    }

    #[tokio::test]
    async fn test_panicking_deferred_handler_is_reported() {
        let emitter: Emitter = Emitter::new();
        emitter.on(
            "x",
            Handler::deferred(|payload: Option<Value>| async move {
                tokio::task::yield_now().await;
                if payload.is_none() {
                    panic!("async kaboom");
                }
                Ok(())
            }),
        );

        let err = emitter.emit("x", None).await.unwrap_err();
        assert_eq!(
            err.failures()[0].error,
            HandlerError::Panicked("async kaboom".to_string())
        );
    }

    #[tokio::test]
    async fn test_failed_once_handler_is_still_removed() {
        let emitter: Emitter = Emitter::new();
        emitter.once("x", Handler::sync(|_| Err(HandlerError::failed("nope"))));

        assert!(emitter.emit("x", None).await.is_err());
        assert!(emitter.emit("x", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_reentrant_changes_apply_to_next_dispatch() {
        let log = Log::default();
        let emitter: Arc<Emitter> = Arc::new(Emitter::new());

        let late = recorder(&log, "late");
        let target = recorder(&log, "target");

        let weak = Arc::downgrade(&emitter);
        let (late_c, target_c) = (late.clone(), target.clone());
        let mutator = Handler::sync(move |_| {
            if let Some(emitter) = weak.upgrade() {
                emitter.on("e", late_c.clone());
                emitter.off("e", &target_c);
            }
            Ok(())
        });

        emitter.once("e", mutator);
        emitter.on("e", target);

        emitter.emit("e", None).await.unwrap();
        assert_eq!(*log.lock(), vec!["target:null"]);

        emitter.emit("e", None).await.unwrap();
        assert_eq!(*log.lock(), vec!["target:null", "late:null"]);
    }

    #[test]
    fn test_listeners_are_snapshots() {
        let emitter: Emitter = Emitter::new();
        let h = Handler::sync(|_| Ok(()));
        emitter.on("e", h.clone());
        emitter.once("e", h.clone());

        let mut listeners = emitter.listeners("e");
        listeners.clear();
        assert_eq!(emitter.listener_count("e"), 2);

        let raw = emitter.raw_listeners("e");
        assert_eq!(raw.len(), 2);
        assert!(raw[0].handler.same_as(&h));
        assert!(!raw[0].once);
        assert!(raw[1].once);
    }

    #[test]
    fn test_remove_all_listeners() {
        let emitter: Emitter = Emitter::new();
        emitter.on("a", Handler::sync(|_| Ok(())));
        emitter.on("b", Handler::sync(|_| Ok(())));
        emitter.on("c", Handler::sync(|_| Ok(())));

        emitter.remove_all_listeners(Some("b"));
        assert_eq!(emitter.event_names(), vec!["a", "c"]);
        assert!(!emitter.has_listeners("b"));

        emitter.remove_all_listeners(None);
        assert!(emitter.event_names().is_empty());
        assert_eq!(emitter.listener_count("a"), 0);
    }

    #[test]
    fn test_max_listeners_config() {
        let emitter: Emitter = Emitter::new();
        assert_eq!(emitter.max_listeners(), 10);

        emitter.set_max_listeners(2);
        assert_eq!(emitter.max_listeners(), 2);

        let config = EmitterConfig::default().with_max_listeners(0);
        let emitter: Emitter<u8> = Emitter::with_config(config);
        assert_eq!(emitter.max_listeners(), 0);
    }

    fn capture<F: FnOnce()>(f: F) -> Vec<tidings_telemetry::Diagnostic> {
        let (subscriber, mut rx) = tidings_telemetry::capture_warnings();
        tracing::subscriber::with_default(subscriber, f);
        let mut out = Vec::new();
        while let Ok(d) = rx.try_recv() {
            out.push(d);
        }
        out
    }

    #[test]
    fn test_max_listener_warning_once_per_event() {
        let emitter: Emitter = Emitter::new();
        emitter.set_max_listeners(2);

        let warnings = capture(|| {
            for _ in 0..4 {
                emitter.on("crowded", Handler::sync(|_| Ok(())));
            }
            emitter.on("quiet", Handler::sync(|_| Ok(())));
        });

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].event.as_deref(), Some("crowded"));
        assert!(warnings[0].message.contains("3 listeners registered"));
        assert!(warnings[0].message.contains("max_listeners is 2"));
        assert_eq!(emitter.listener_count("crowded"), 4);
    }

    #[test]
    fn test_warning_starts_after_limit_not_at_it() {
        let emitter: Emitter = Emitter::new();

        let at_limit = capture(|| {
            for _ in 0..10 {
                emitter.on("edge", Handler::sync(|_| Ok(())));
            }
        });
        assert!(at_limit.is_empty());

        let over_limit = capture(|| emitter.once("edge", Handler::sync(|_| Ok(()))));
        assert_eq!(over_limit.len(), 1);
        assert_eq!(over_limit[0].event.as_deref(), Some("edge"));
        assert!(over_limit[0].message.contains("11 listeners registered"));
        assert!(over_limit[0].message.contains("max_listeners is 10"));
    }

    #[test]
    fn test_lowering_max_listeners_is_not_retroactive() {
        let emitter: Emitter = Emitter::new();

        let warnings = capture(|| {
            for _ in 0..5 {
                emitter.on("steady", Handler::sync(|_| Ok(())));
            }
            emitter.set_max_listeners(2);
        });
        assert!(warnings.is_empty());
        assert_eq!(emitter.listener_count("steady"), 5);

        let warnings = capture(|| emitter.on("steady", Handler::sync(|_| Ok(()))));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("6 listeners registered"));
        assert!(warnings[0].message.contains("max_listeners is 2"));
    }

    #[test]
    fn test_warning_rearms_after_event_empties() {
        let emitter: Emitter = Emitter::new();
        emitter.set_max_listeners(1);

        let warnings = capture(|| {
            emitter.on("cycle", Handler::sync(|_| Ok(())));
            emitter.on("cycle", Handler::sync(|_| Ok(())));
            emitter.remove_all_listeners(Some("cycle"));
            emitter.on("cycle", Handler::sync(|_| Ok(())));
            emitter.prepend_listener("cycle", Handler::sync(|_| Ok(())));
        });
        assert_eq!(warnings.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_handlers_are_reported_as_diagnostics() {
        let emitter: Emitter = Emitter::new();
        emitter.on("save", Handler::sync(|_| Err(HandlerError::failed("disk full"))));

        let (subscriber, mut rx) = tidings_telemetry::capture_warnings();
        let _guard = tracing::subscriber::set_default(subscriber);
        assert!(emitter.emit("save", None).await.is_err());

        let diagnostic = rx.try_recv().unwrap();
        assert_eq!(diagnostic.event.as_deref(), Some("save"));
        assert!(diagnostic.message.contains("disk full"));
    }

    #[test]
    fn test_zero_max_listeners_disables_warning() {
        let emitter: Emitter = Emitter::new();
        emitter.set_max_listeners(0);

        let warnings = capture(|| {
            for _ in 0..20 {
                emitter.on("many", Handler::sync(|_| Ok(())));
            }
        });
        assert!(warnings.is_empty());
    }
}
