//! Process-wide configuration.
//!
//! Read once at startup from environment variables with hard-coded
//! defaults; there is no on-disk config file for this core (command-card
//! persistence and user preferences live in the UI layer, outside this
//! crate).

use std::net::SocketAddr;
use std::path::PathBuf;

/// Default retention window for conversation files, in days.
pub const DEFAULT_RETENTION_DAYS: u64 = 7;
/// Health layer demotion threshold.
pub const DEFAULT_ALERT_THRESHOLD_SECS: u64 = 30;
/// Output inactivity window before a conversation turn is flushed.
pub const DEFAULT_FLUSH_INACTIVITY_SECS: u64 = 2;
/// Hard cap on a single session's lifetime.
pub const DEFAULT_SESSION_HARD_CAP_SECS: u64 = 86_400;

/// Runtime configuration for `termcored`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Loopback address the HTTP/WS server binds to.
    pub bind_addr: SocketAddr,
    /// Root directory for conversation files (the "AM directory").
    pub am_root: PathBuf,
    /// Days a conversation file survives before `Cleanup` deletes it.
    pub retention_days: u64,
    /// Seconds without a heartbeat before a health layer is demoted.
    pub alert_threshold_secs: u64,
    /// Seconds of output inactivity before the engine flushes a turn.
    pub flush_inactivity_secs: u64,
    /// Seconds before a session is force-closed regardless of activity.
    pub session_hard_cap_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7890".parse().expect("valid default bind addr"),
            am_root: Self::default_am_root(),
            retention_days: DEFAULT_RETENTION_DAYS,
            alert_threshold_secs: DEFAULT_ALERT_THRESHOLD_SECS,
            flush_inactivity_secs: DEFAULT_FLUSH_INACTIVITY_SECS,
            session_hard_cap_secs: DEFAULT_SESSION_HARD_CAP_SECS,
        }
    }
}

impl Config {
    /// Directory selection priority for the AM root:
    /// 1. `#[cfg(test)]` (unit tests): repo-local `tmp/termcore-test/am`.
    /// 2. `TERMCORE_AM_ROOT` env var: explicit override.
    /// 3. `TERMCORE_ENV=test`/`system_test`: repo-local `tmp/termcore-test/am`.
    /// 4. Default: `.forge/am/` under the current working directory.
    fn default_am_root() -> PathBuf {
        if crate::env::is_any_test() {
            return PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/termcore-test/am");
        }
        if let Ok(dir) = std::env::var("TERMCORE_AM_ROOT") {
            return PathBuf::from(dir);
        }
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".forge/am")
    }

    /// Load configuration from the environment, applying overrides on top
    /// of defaults.
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("TERMCORE_BIND_ADDR") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            } else {
                log::warn!("TERMCORE_BIND_ADDR={addr:?} is not a valid socket address, ignoring");
            }
        }
        if let Ok(dir) = std::env::var("TERMCORE_AM_ROOT") {
            self.am_root = PathBuf::from(dir);
        }
        if let Ok(v) = std::env::var("TERMCORE_RETENTION_DAYS") {
            if let Ok(n) = v.parse() {
                self.retention_days = n;
            }
        }
        if let Ok(v) = std::env::var("TERMCORE_ALERT_THRESHOLD_SECS") {
            if let Ok(n) = v.parse() {
                self.alert_threshold_secs = n;
            }
        }
        if let Ok(v) = std::env::var("TERMCORE_FLUSH_INACTIVITY_SECS") {
            if let Ok(n) = v.parse() {
                self.flush_inactivity_secs = n;
            }
        }
        if let Ok(v) = std::env::var("TERMCORE_SESSION_HARD_CAP_SECS") {
            if let Ok(n) = v.parse() {
                self.session_hard_cap_secs = n;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.alert_threshold_secs, 30);
        assert_eq!(config.flush_inactivity_secs, 2);
        assert_eq!(config.session_hard_cap_secs, 86_400);
    }

    #[test]
    fn am_root_lands_under_repo_tmp_in_tests() {
        let config = Config::default();
        assert!(config.am_root.ends_with("tmp/termcore-test/am"));
    }

    #[test]
    fn bind_addr_override_parses() {
        std::env::set_var("TERMCORE_BIND_ADDR", "127.0.0.1:9999");
        let config = Config::load();
        assert_eq!(config.bind_addr.port(), 9999);
        std::env::remove_var("TERMCORE_BIND_ADDR");
    }

    #[test]
    fn invalid_bind_addr_override_is_ignored() {
        std::env::set_var("TERMCORE_BIND_ADDR", "not-an-addr");
        let config = Config::load();
        assert_eq!(config.bind_addr, Config::default().bind_addr);
        std::env::remove_var("TERMCORE_BIND_ADDR");
    }
}
