//! Process primitive - spawn children with inherited stdio

use crate::error::SpawnError;
use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// Ready-to-spawn argv and extra environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// Space joined argv for logs
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Outcome of one process execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    pub success: bool,
    pub exit_code: i32,
    pub signaled: bool,
}

impl RunResult {
    pub fn from_code(exit_code: i32) -> Self {
        Self {
            success: exit_code == 0,
            exit_code,
            signaled: false,
        }
    }

    /// Terminated by a signal; reported with the shell convention 128 + signal
    pub fn from_signal(signal: i32) -> Self {
        Self {
            success: false,
            exit_code: 128 + signal,
            signaled: true,
        }
    }

    /// A member that never started
    pub fn spawn_failed() -> Self {
        Self::from_code(1)
    }

    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::from_code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::from_signal(signal);
            }
        }

        Self::from_code(1)
    }
}

/// Handle to a running child
pub trait ChildProcess: Send + 'static {
    /// Wait for the child to exit
    fn wait(&mut self) -> impl Future<Output = io::Result<RunResult>> + Send;

    /// Request termination without waiting for the exit
    fn start_kill(&mut self) -> io::Result<()>;
}

/// Spawns child processes
pub trait ProcessHost: Send + Sync + 'static {
    type Child: ChildProcess;

    fn spawn(&self, invocation: &Invocation) -> Result<Self::Child, SpawnError>;
}

/// Real processes through `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeHost;

/// Child spawned by [`NativeHost`]
#[derive(Debug)]
pub struct NativeChild {
    child: Child,
}

impl NativeChild {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

impl ChildProcess for NativeChild {
    fn wait(&mut self) -> impl Future<Output = io::Result<RunResult>> + Send {
        async move {
            let status = self.child.wait().await?;
            Ok(RunResult::from_status(status))
        }
    }

    fn start_kill(&mut self) -> io::Result<()> {
        match self.child.start_kill() {
            // Already exited
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }
}

impl ProcessHost for NativeHost {
    type Child = NativeChild;

    fn spawn(&self, invocation: &Invocation) -> Result<NativeChild, SpawnError> {
        let program = invocation.program().to_string();
        log::debug!("Spawning: {}", invocation.display());

        let Some((first, rest)) = invocation.argv.split_first() else {
            return Err(SpawnError {
                program,
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        let child = Command::new(first)
            .args(rest)
            .envs(&invocation.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| SpawnError { program, source })?;

        Ok(NativeChild { child })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation {
            argv: vec!["sh".into(), "-c".into(), script.into()],
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn test_run_result_from_code() {
        assert!(RunResult::from_code(0).success);
        let failed = RunResult::from_code(5);
        assert!(!failed.success);
        assert_eq!(failed.exit_code, 5);
        assert!(!failed.signaled);
    }

    #[test]
    fn test_run_result_from_signal() {
        let killed = RunResult::from_signal(9);
        assert!(!killed.success);
        assert!(killed.signaled);
        assert_eq!(killed.exit_code, 137);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_native_exit_code() {
        let mut child = NativeHost.spawn(&sh("exit 5")).unwrap();
        let result = child.wait().await.unwrap();
        assert_eq!(result, RunResult::from_code(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_native_env_is_passed() {
        let mut invocation = sh("test \"$GREETING\" = hello");
        invocation.env.insert("GREETING".into(), "hello".into());

        let mut child = NativeHost.spawn(&invocation).unwrap();
        assert!(child.wait().await.unwrap().success);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_native_kill_reports_signal() {
        let mut child = NativeHost.spawn(&sh("sleep 30")).unwrap();
        child.start_kill().unwrap();
        let result = child.wait().await.unwrap();
        assert!(result.signaled);
        assert!(!result.success);
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();

        let invocation = Invocation {
            argv: vec!["definitely-not-a-real-program-xyz".into()],
            env: BTreeMap::new(),
        };
        let err = NativeHost.spawn(&invocation).unwrap_err();
        assert_eq!(err.program, "definitely-not-a-real-program-xyz");
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }
}
