//! Runtime configuration for the bridge and crypto engine.
//!
//! Tunables are set once at construction time; neither core re-reads
//! configuration after workers start. Values come from [`Config::default`],
//! overridden by environment variables, mirroring the layered precedence
//! other daemons in this codebase use (explicit env var beats compiled-in
//! default).

use serde::{Deserialize, Serialize};

/// Default `log2_queue_size` for a new ring pair (256 descriptor slots).
pub const DEFAULT_LOG2_QUEUE_SIZE: u8 = 8;

/// Hard ceiling on `log2_queue_size`; above this the descriptor arrays and
/// freelists would outgrow a sane shared-memory segment.
pub const MAX_LOG2_QUEUE_SIZE: u8 = 16;

/// Default control-socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/snort-bridge.sock";

/// Default engine name used by the crypto dispatcher when none is given.
pub const DEFAULT_ENGINE: &str = "dasync";

/// Process-wide tunables for the bridge and crypto engine.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// `log2` of the ring size used for newly created instances, absent an
    /// explicit override at `instance_create` time.
    pub log2_queue_size: u8,
    /// Path of the UNIX control socket the bridge listens on.
    pub socket_path: String,
    /// Name of the crypto engine registered at startup (`"qat"` or
    /// `"dasync"`).
    pub engine: String,
    /// Number of pinned worker threads.
    pub num_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log2_queue_size: DEFAULT_LOG2_QUEUE_SIZE,
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            engine: DEFAULT_ENGINE.to_string(),
            num_workers: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

impl Config {
    /// Build a [`Config`] from compiled-in defaults, then apply environment
    /// variable overrides (`SNORT_BRIDGE_*`).
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SNORT_BRIDGE_LOG2_QUEUE_SIZE") {
            if let Ok(n) = v.parse::<u8>() {
                self.log2_queue_size = n;
            }
        }
        if let Ok(v) = std::env::var("SNORT_BRIDGE_SOCKET_PATH") {
            self.socket_path = v;
        }
        if let Ok(v) = std::env::var("SNORT_BRIDGE_ENGINE") {
            self.engine = v;
        }
        if let Ok(v) = std::env::var("SNORT_BRIDGE_NUM_WORKERS") {
            if let Ok(n) = v.parse::<usize>() {
                if n > 0 {
                    self.num_workers = n;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_ring_size() {
        let config = Config::default();
        assert_eq!(config.log2_queue_size, DEFAULT_LOG2_QUEUE_SIZE);
        assert!(config.num_workers >= 1);
    }

    #[test]
    fn env_override_wins_over_default() {
        // SAFETY: test runs single-threaded with respect to this env var.
        unsafe {
            std::env::set_var("SNORT_BRIDGE_LOG2_QUEUE_SIZE", "10");
        }
        let config = Config::load();
        assert_eq!(config.log2_queue_size, 10);
        // SAFETY: test runs single-threaded with respect to this env var.
        unsafe {
            std::env::remove_var("SNORT_BRIDGE_LOG2_QUEUE_SIZE");
        }
    }
}
