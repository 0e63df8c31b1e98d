//! Worker tunables, usually taken from the editor's plugin settings.

use serde::Deserialize;
use std::time::Duration;

/// Budget for one multiplexed event wait.
pub const DEFAULT_WAIT_BUDGET: Duration = Duration::from_secs(30);

/// Wait timeouts after which the worker self-terminates (60 days of
/// continuous idleness at the default wait budget).
pub const DEFAULT_IDLE_CEILING: u32 = 172_800;

/// Bridge worker configuration.
///
/// Read once at session start. The editor host may hand over a TOML
/// fragment (see [`BridgeConfig::from_toml`]); absent keys fall back to the
/// defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Budget for one multiplexed event wait, in milliseconds.
    pub wait_budget_ms: u64,
    /// Consecutive wait timeouts after which the worker self-terminates.
    pub idle_ceiling: u32,
    /// Cap on a synchronous submission, in milliseconds. `None` blocks the
    /// caller until the worker replies, like the engine's own blocking
    /// waits.
    pub sync_timeout_ms: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            wait_budget_ms: DEFAULT_WAIT_BUDGET.as_millis() as u64,
            idle_ceiling: DEFAULT_IDLE_CEILING,
            sync_timeout_ms: None,
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from a TOML fragment.
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn wait_budget(&self) -> Duration {
        Duration::from_millis(self.wait_budget_ms)
    }

    pub fn sync_timeout(&self) -> Option<Duration> {
        self.sync_timeout_ms.map(Duration::from_millis)
    }
}
