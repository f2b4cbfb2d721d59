use crate::emitter::Emitter;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tidings_config::{load_config, EmitterConfig, TidingsConfig};

static GLOBAL_BUS: OnceLock<EventBus> = OnceLock::new();

/// Holds one shared [`Emitter`], created on first use.
///
/// Pass a bus to the components that need to talk to each other. For code
/// that cannot be handed one, [`EventBus::global`] is a process-wide default.
pub struct EventBus<P = Value> {
    config: EmitterConfig,
    slot: Mutex<Option<Arc<Emitter<P>>>>,
}

impl<P> EventBus<P> {
    pub fn new() -> Self {
        Self::with_config(EmitterConfig::default())
    }

    /// `config` is applied to every emitter this bus creates.
    pub fn with_config(config: EmitterConfig) -> Self {
        Self {
            config,
            slot: Mutex::new(None),
        }
    }

    pub fn from_config(config: &TidingsConfig) -> Self {
        Self::with_config(config.emitter)
    }

    /// Reads `path`, or when `None` the first `tidings.*` file found in the
    /// working directory or `~/.config/tidings`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = load_config(path)?;
        Ok(Self::from_config(&config))
    }

    /// The current emitter. Every call until the next [`reset`](Self::reset)
    /// returns the same instance.
    pub fn instance(&self) -> Arc<Emitter<P>> {
        let mut slot = self.slot.lock();
        let emitter = slot.get_or_insert_with(|| {
            tracing::debug!("Creating bus emitter (max_listeners: {})", self.config.max_listeners);
            Arc::new(Emitter::with_config(self.config))
        });
        Arc::clone(emitter)
    }

    /// Discards the current emitter. Its handlers are dropped even if other
    /// code still holds the old `Arc`.
    pub fn reset(&self) {
        let previous = self.slot.lock().take();
        if let Some(emitter) = previous {
            emitter.remove_all_listeners(None);
            tracing::debug!("Bus emitter reset");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl EventBus<Value> {
    /// Built from the discovered config file on first use, or defaults when
    /// there is none.
    pub fn global() -> &'static EventBus {
        GLOBAL_BUS.get_or_init(|| {
            EventBus::load(None).unwrap_or_else(|e| {
                tracing::debug!("Global bus using default config: {:#}", e);
                EventBus::new()
            })
        })
    }
}

impl<P> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for EventBus<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
