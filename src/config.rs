//! Configuration of the process-wide tracker.
//!
//! Defaults are fixed at build time by `LEAK_DEBUG_CLOG_FLAGS` and
//! `LEAK_DEBUG_CERR_FLAGS` in the build environment.  A running process may
//! override them with these environment variables:
//!
//! | variable            | meaning                                        |
//! |---------------------|------------------------------------------------|
//! | `LEAK_DEBUG_CLOG`   | flags routed to the routine sink               |
//! | `LEAK_DEBUG_CERR`   | flags routed to the error sink                 |
//! | `LEAK_DEBUG_ACTIVE` | `1`/`true`/`on` to start tracking immediately  |
//! | `LEAK_DEBUG_DIR`    | directory for reports written at exit by the preload library or by [`crate::write_configured_report`] |
//!
//! Flag values are `|`-separated names such as `SUCCESSES|FAILURES`.

use std::{env, path::PathBuf};

use crate::flags::{LogPolicy, OutputFlags};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Policy used by the global allocator and the convenience entry points.
    pub policy: LogPolicy,
    /// Whether the tracker records anything before `start()` is called.
    pub active: bool,
    /// Directory for reports when the caller names none.
    pub report_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            policy: LogPolicy::default(),
            active: false,
            report_dir: None,
        }
    }
}

impl Config {
    /// Defaults baked in when the crate was compiled.
    pub fn build_time() -> Self {
        let mut config = Config::default();
        if let Some(flags) = option_env!("LEAK_DEBUG_CLOG_FLAGS") {
            config.policy.routine = parse_flags("LEAK_DEBUG_CLOG_FLAGS", flags, config.policy.routine);
        }
        if let Some(flags) = option_env!("LEAK_DEBUG_CERR_FLAGS") {
            config.policy.error = parse_flags("LEAK_DEBUG_CERR_FLAGS", flags, config.policy.error);
        }
        config
    }

    /// Build-time defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::build_time().overlay(|name| env::var(name).ok())
    }

    /// Overrides fields for which `lookup` returns a value.
    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(flags) = lookup("LEAK_DEBUG_CLOG") {
            self.policy.routine = parse_flags("LEAK_DEBUG_CLOG", &flags, self.policy.routine);
        }
        if let Some(flags) = lookup("LEAK_DEBUG_CERR") {
            self.policy.error = parse_flags("LEAK_DEBUG_CERR", &flags, self.policy.error);
        }
        if let Some(active) = lookup("LEAK_DEBUG_ACTIVE") {
            self.active = matches!(
                active.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "on" | "yes"
            );
        }
        if let Some(dir) = lookup("LEAK_DEBUG_DIR") {
            if !dir.is_empty() {
                self.report_dir = Some(PathBuf::from(dir));
            }
        }
        self
    }

    /// `report_dir`, or the working directory when unset.
    pub fn report_dir_or_cwd(&self) -> PathBuf {
        self.report_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

// Malformed flags keep the previous value.
fn parse_flags(var: &str, text: &str, fallback: OutputFlags) -> OutputFlags {
    text.parse().unwrap_or_else(|e| {
        log::warn!("ignoring {}: {}", var, e);
        fallback
    })
}
