//! Automatic formatter run before scripts start and before each watch respawn

use super::process::{ChildProcess, Invocation, ProcessHost};
use crate::report::Reporter;
use std::time::Duration;

/// Pause after the formatter so its own writes settle before anything starts
pub const FORMAT_SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatter {
    invocation: Invocation,
}

impl Formatter {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            invocation: Invocation {
                argv,
                env: Default::default(),
            },
        }
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Run to completion. Failures are warnings only.
    pub async fn run<H: ProcessHost>(&self, host: &H, reporter: &Reporter) {
        reporter.debug("fmt", "Automatic formatter", self.invocation.display());

        match host.spawn(&self.invocation) {
            Ok(mut child) => match child.wait().await {
                Ok(result) if !result.success => reporter.warn(format!(
                    "Formatter `{}` exited with code {}",
                    self.invocation.display(),
                    result.exit_code
                )),
                Ok(_) => {}
                Err(e) => reporter.warn(format!("Formatter wait failed: {}", e)),
            },
            Err(e) => reporter.warn(e),
        }

        tokio::time::sleep(FORMAT_SETTLE_DELAY).await;
    }
}
