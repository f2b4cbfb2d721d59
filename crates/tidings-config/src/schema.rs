use serde::{Deserialize, Serialize};

/// Soft cap applied when no configuration says otherwise.
pub const DEFAULT_MAX_LISTENERS: usize = 10;

/// Top-level Tidings configuration file.
///
/// Loaded from (in priority order):
/// 1. `tidings.jsonc` - JSON with comments
/// 2. `tidings.json` - Standard JSON
/// 3. `tidings.yml` / `tidings.yaml` - YAML format
///
/// Hidden variants (`.tidings.*`) and `~/.config/tidings/` are checked too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TidingsConfig {
    /// Emitter settings
    #[serde(default)]
    pub emitter: EmitterConfig,
}

/// Settings for a single emitter.
///
/// # Example
///
/// ```yaml
/// emitter:
///   max_listeners: 25
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Listeners per event name before a leak warning is logged (default: 10).
    /// `0` disables the warning.
    #[serde(default = "default_max_listeners")]
    pub max_listeners: usize,
}

impl EmitterConfig {
    pub fn with_max_listeners(mut self, max_listeners: usize) -> Self {
        self.max_listeners = max_listeners;
        self
    }
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            max_listeners: default_max_listeners(),
        }
    }
}

fn default_max_listeners() -> usize {
    DEFAULT_MAX_LISTENERS
}
