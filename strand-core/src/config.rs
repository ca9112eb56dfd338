//! Runtime Configuration
//!
//! Settings are per thread, like the runtime itself. Hosts usually build a
//! [`RuntimeConfig`] from their own settings file (it is `Deserialize`) and
//! apply it once with [`configure`](crate::configure) before creating nodes.

use serde::{Deserialize, Serialize};

/// Default cap on effect deliveries per flush.
pub const DEFAULT_FLUSH_LIMIT: usize = 100_000;

/// Tunables of the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of effect deliveries in one flush. `None` disables the
    /// check. Effects that keep writing their own dependencies hit this limit
    /// instead of spinning forever.
    pub flush_limit: Option<usize>,

    /// Emit a `trace` event for every node marked during propagation.
    pub trace_propagation: bool,
}

impl RuntimeConfig {
    /// Set the flush limit.
    pub fn with_flush_limit(mut self, limit: Option<usize>) -> Self {
        self.flush_limit = limit;
        self
    }

    /// Enable or disable per-mark trace events.
    pub fn with_trace_propagation(mut self, enabled: bool) -> Self {
        self.trace_propagation = enabled;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_limit: Some(DEFAULT_FLUSH_LIMIT),
            trace_propagation: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.flush_limit, Some(DEFAULT_FLUSH_LIMIT));
        assert!(!config.trace_propagation);
    }

    #[test]
    fn builder_setters() {
        let config = RuntimeConfig::default()
            .with_flush_limit(None)
            .with_trace_propagation(true);
        assert_eq!(config.flush_limit, None);
        assert!(config.trace_propagation);
    }
}
