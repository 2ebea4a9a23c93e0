//! Reporter - status, warning and debug messages
//!
//! Wraps the `log` facade. The debug switch is carried by value so every
//! component decides from its own copy instead of a process-wide flag.

use std::fmt::Display;

/// Message sink handed to the supervisor, coordinator and watchers
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    debug: bool,
}

impl Reporter {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    /// Status line
    pub fn status(&self, text: impl Display) {
        log::info!("{}", text);
    }

    /// Non-fatal problem
    pub fn warn(&self, text: impl Display) {
        log::warn!("{}", text);
    }

    /// Failure report
    pub fn fail(&self, text: impl Display) {
        log::error!("{}", text);
    }

    /// Detail shown only when debugging is on
    pub fn debug(&self, scope: &str, title: &str, data: impl Display) {
        if self.debug {
            log::info!("{} [ {} ] {}", scope, title, data);
        } else {
            log::debug!("{} [ {} ] {}", scope, title, data);
        }
    }
}

/// Label used for a script in log lines
pub fn label(name: &str) -> String {
    format!("[{}]", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_carries_debug_flag() {
        assert!(Reporter::new(true).debug_enabled());
        assert!(!Reporter::default().debug_enabled());
    }

    #[test]
    fn test_label() {
        assert_eq!(label("dev"), "[dev]");
    }
}
