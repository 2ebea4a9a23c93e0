//! Group coordinator - runs a group's scripts in parallel or in sequence

use super::process::{ProcessHost, RunResult};
use super::supervisor::Supervisor;
use super::watcher::FilesystemEventSource;
use crate::command::ScriptPlan;
use crate::config::{ConcurrentGroup, GroupMode};
use crate::error::ConfigError;
use crate::report::Reporter;
use std::collections::HashSet;

/// Aggregate exit code of a parallel group with at least one failure
pub const PARALLEL_FAILURE_CODE: i32 = 1;

/// Runs groups of scripts through a supervisor
pub struct Coordinator<H, S> {
    supervisor: Supervisor<H, S>,
}

impl<H, S> Coordinator<H, S>
where
    H: ProcessHost,
    S: FilesystemEventSource + Send + Sync + 'static,
{
    pub fn new(supervisor: Supervisor<H, S>) -> Self {
        Self { supervisor }
    }

    fn reporter(&self) -> &Reporter {
        self.supervisor.reporter()
    }

    /// Check membership and resolve every member before anything starts
    pub fn validate<F>(
        &self,
        name: &str,
        group: &ConcurrentGroup,
        resolve: F,
    ) -> Result<Vec<ScriptPlan>, ConfigError>
    where
        F: Fn(&str) -> Result<ScriptPlan, ConfigError>,
    {
        if group.members.is_empty() {
            return Err(ConfigError::EmptyGroup(name.to_string()));
        }

        let mut seen = HashSet::new();
        for member in &group.members {
            if !seen.insert(member.as_str()) {
                return Err(ConfigError::DuplicateMember {
                    group: name.to_string(),
                    member: member.clone(),
                });
            }
        }

        group.members.iter().map(|member| resolve(member)).collect()
    }

    /// Validate, format once, then dispatch by mode. Returns the aggregate exit code.
    pub async fn run_group<F>(
        &self,
        name: &str,
        group: &ConcurrentGroup,
        resolve: F,
    ) -> Result<i32, ConfigError>
    where
        F: Fn(&str) -> Result<ScriptPlan, ConfigError>,
    {
        let plans = self.validate(name, group, resolve)?;

        self.reporter().status(format!(
            "Executing scripts \"{}\" in {} mode.",
            group.members.join(", "),
            group.mode
        ));

        self.supervisor.format().await;

        let code = match group.mode {
            GroupMode::Parallel => self.run_parallel(&plans).await,
            GroupMode::Sequential => self.run_sequential(&plans).await,
        };
        Ok(code)
    }

    /// Start every member before awaiting any; no sibling is cancelled on failure
    async fn run_parallel(&self, plans: &[ScriptPlan]) -> i32 {
        let mut running = Vec::with_capacity(plans.len());

        for plan in plans {
            let handle = match self.supervisor.start(plan) {
                Ok(execution) => Some(tokio::spawn(execution.finish())),
                Err(err) => {
                    self.reporter().fail(&err);
                    None
                }
            };
            running.push((plan.name.as_str(), handle));
        }

        let mut first_failure: Option<(&str, RunResult)> = None;
        for (name, handle) in running {
            let result = match handle {
                Some(handle) => match handle.await {
                    Ok(Ok(result)) => result,
                    Ok(Err(err)) => {
                        self.reporter().warn(format!("Script {}: {}", name, err));
                        RunResult::spawn_failed()
                    }
                    Err(err) => {
                        self.reporter().warn(format!("Script {}: {}", name, err));
                        RunResult::spawn_failed()
                    }
                },
                None => RunResult::spawn_failed(),
            };

            if !result.success && first_failure.is_none() {
                first_failure = Some((name, result));
            }
        }

        match first_failure {
            Some((name, result)) => {
                self.reporter().fail(format!(
                    "Script {} failed with code {}.",
                    name, result.exit_code
                ));
                PARALLEL_FAILURE_CODE
            }
            None => 0,
        }
    }

    /// One member at a time; the first failure stops the group with its own code
    async fn run_sequential(&self, plans: &[ScriptPlan]) -> i32 {
        for plan in plans {
            let result = match self.supervisor.run(plan).await {
                Ok(result) => result,
                Err(err) => {
                    self.reporter().fail(&err);
                    RunResult::spawn_failed()
                }
            };

            if !result.success {
                self.reporter().fail(format!(
                    "Script {} failed with code {}.",
                    plan.name, result.exit_code
                ));
                return result.exit_code;
            }
        }
        0
    }
}
