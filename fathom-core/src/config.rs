//! Runtime Configuration
//!
//! A small set of process-wide knobs. Defaults are usable as-is; hosts that
//! want to tune them can deserialize a [`RuntimeConfig`] (every field is
//! optional) and install it with [`Runtime::configure`](crate::reactive::Runtime::configure).

use std::sync::OnceLock;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Process-wide runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of effect rounds one flush may run before the
    /// remaining queue is dropped as a suspected cycle.
    pub max_flush_iterations: usize,

    /// Log a warning when a primitive is passed to a wrapping function.
    pub warn_non_observable: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: 100,
            warn_non_observable: true,
        }
    }
}

static CONFIG: OnceLock<RwLock<RuntimeConfig>> = OnceLock::new();

fn config_cell() -> &'static RwLock<RuntimeConfig> {
    CONFIG.get_or_init(|| RwLock::new(RuntimeConfig::default()))
}

pub(crate) fn install(config: RuntimeConfig) {
    *config_cell().write() = config;
}

pub(crate) fn current() -> RuntimeConfig {
    config_cell().read().clone()
}
