//! Process supervisor - runs a script once, or respawns it on every change batch
//!
//! In watch mode each child gets a monitor task that owns the process and
//! waits on either its exit or a kill request. A kill request is acknowledged
//! once the kill has been issued; the old child's exit is not awaited before
//! the replacement is spawned.

use super::format::Formatter;
use super::process::{ChildProcess, Invocation, ProcessHost, RunResult};
use super::watcher::{FilesystemEventSource, NotifySource, WatchItem, Watcher};
use crate::command::ScriptPlan;
use crate::error::SpawnError;
use crate::report::{label, Reporter};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Runs resolved scripts on a process host
pub struct Supervisor<H, S = NotifySource> {
    host: Arc<H>,
    source: Arc<S>,
    formatter: Option<Formatter>,
    reporter: Reporter,
}

impl<H, S> Clone for Supervisor<H, S> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            source: self.source.clone(),
            formatter: self.formatter.clone(),
            reporter: self.reporter,
        }
    }
}

impl<H: ProcessHost> Supervisor<H, NotifySource> {
    pub fn new(host: H, reporter: Reporter) -> Self {
        Self::with_source(host, NotifySource, reporter)
    }
}

impl<H, S> Supervisor<H, S>
where
    H: ProcessHost,
    S: FilesystemEventSource + Send + Sync + 'static,
{
    pub fn with_source(host: H, source: S, reporter: Reporter) -> Self {
        Self {
            host: Arc::new(host),
            source: Arc::new(source),
            formatter: None,
            reporter,
        }
    }

    pub fn with_formatter(mut self, formatter: Option<Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Run the configured formatter, if any
    pub async fn format(&self) {
        if let Some(formatter) = &self.formatter {
            formatter.run(&*self.host, &self.reporter).await;
        }
    }

    /// Spawn the script's first child. For watch scripts this also starts
    /// the watcher. Nothing is awaited here.
    pub fn start(&self, plan: &ScriptPlan) -> Result<Execution<H>, SpawnError> {
        let name = label(&plan.name);

        if plan.watch.is_some() {
            self.reporter.status(format!("Watch mode enabled for {}.", name));
        }

        self.reporter.debug(
            &name,
            "Command executed",
            format!("{} {:?}", plan.invocation.display(), plan.invocation.env),
        );

        let child = self.host.spawn(&plan.invocation)?;

        let Some(spec) = &plan.watch else {
            return Ok(Execution::Once { name, child });
        };

        self.reporter.debug(&name, "Watcher options", spec.describe());
        let watcher = Watcher::with_source(spec, &*self.source);
        let current = RunningChild::monitor(child, name.clone(), self.reporter);

        Ok(Execution::Watch(WatchLoop {
            name,
            invocation: plan.invocation.clone(),
            watcher,
            current,
            host: self.host.clone(),
            formatter: self.formatter.clone(),
            reporter: self.reporter,
        }))
    }

    /// Start and drive to completion. Does not return for watch scripts
    /// unless the watcher's source goes away.
    pub async fn run(&self, plan: &ScriptPlan) -> Result<RunResult> {
        let execution = self.start(plan)?;
        execution.finish().await
    }
}

/// A started script
pub enum Execution<H: ProcessHost> {
    Once { name: String, child: H::Child },
    Watch(WatchLoop<H>),
}

impl<H: ProcessHost> Execution<H> {
    pub async fn finish(self) -> Result<RunResult> {
        match self {
            Self::Once { name, mut child } => {
                let result = child.wait().await?;
                log::debug!("{} exited with code {}", name, result.exit_code);
                Ok(result)
            }
            Self::Watch(watch) => watch.run().await,
        }
    }
}

/// Respawn loop for one watch-enabled script
pub struct WatchLoop<H: ProcessHost> {
    name: String,
    invocation: Invocation,
    watcher: Watcher,
    current: RunningChild,
    host: Arc<H>,
    formatter: Option<Formatter>,
    reporter: Reporter,
}

impl<H: ProcessHost> WatchLoop<H> {
    pub async fn run(mut self) -> Result<RunResult> {
        self.reporter
            .status(format!("{} Waiting for changes...", self.name));

        while let Some(item) = self.watcher.next().await {
            let batch = match item {
                WatchItem::Batch(batch) => batch,
                WatchItem::Error(err) => {
                    self.reporter.warn(format!("{} {}", self.name, err));
                    continue;
                }
            };

            if let Some(formatter) = &self.formatter {
                formatter.run(&*self.host, &self.reporter).await;
            }

            self.reporter.status(format!(
                "Detected {} change{}. Rerunning {}...",
                batch.len(),
                if batch.len() > 1 { "s" } else { "" },
                self.name
            ));
            for (path, kind) in batch.iter() {
                self.reporter.debug(
                    &self.name,
                    "Change",
                    format!("File \"{}\" was {}", path.display(), kind.past()),
                );
            }

            self.current.terminate().await;

            match self.host.spawn(&self.invocation) {
                Ok(child) => {
                    self.current = RunningChild::monitor(child, self.name.clone(), self.reporter);
                }
                Err(err) => self.reporter.warn(format!("{} {}", self.name, err)),
            }

            self.reporter
                .status(format!("{} Waiting for changes...", self.name));
        }

        self.reporter
            .warn(format!("{} Stopped watching for changes", self.name));
        Ok(self.current.finish().await)
    }
}

/// Monitor task owning one child process
struct RunningChild {
    kill: Option<oneshot::Sender<oneshot::Sender<()>>>,
    task: JoinHandle<Option<RunResult>>,
}

impl RunningChild {
    fn monitor<C: ChildProcess>(mut child: C, name: String, reporter: Reporter) -> Self {
        let (kill_tx, kill_rx) = oneshot::channel::<oneshot::Sender<()>>();

        let task = tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(result) => {
                        reporter.status(format!("{} exited with code {}", name, result.exit_code));
                        Some(result)
                    }
                    Err(e) => {
                        reporter.warn(format!("{} {}", name, e));
                        None
                    }
                },
                Ok(ack) = kill_rx => {
                    if let Err(e) = child.start_kill() {
                        reporter.warn(format!("{} failed to stop: {}", name, e));
                    }
                    let _ = ack.send(());
                    None
                }
            }
        });

        Self {
            kill: Some(kill_tx),
            task,
        }
    }

    /// Issue the kill and return once it has been requested
    async fn terminate(&mut self) {
        if let Some(kill) = self.kill.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if kill.send(ack_tx).is_ok() {
                let _ = ack_rx.await;
            }
        }
    }

    async fn finish(self) -> RunResult {
        match self.task.await {
            Ok(Some(result)) => result,
            _ => RunResult::from_code(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fake::{ChannelSource, FakeHost};
    use crate::core::watcher::{ChangeKind, FileChangeEvent, RawEvent, WatchFilter, WatchSpec};
    use crate::error::WatcherError;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time;

    fn plan(name: &str, argv: &[&str], watch: Option<WatchSpec>) -> ScriptPlan {
        ScriptPlan {
            name: name.to_string(),
            invocation: Invocation {
                argv: argv.iter().map(|s| s.to_string()).collect(),
                env: Default::default(),
            },
            watch,
        }
    }

    fn watch_spec(interval_ms: u64) -> WatchSpec {
        WatchSpec {
            roots: vec![PathBuf::from("/project")],
            filter: WatchFilter::default(),
            interval: Duration::from_millis(interval_ms),
            recursive: true,
        }
    }

    fn watch_supervisor(
        host: &FakeHost,
    ) -> (mpsc::UnboundedSender<RawEvent>, Supervisor<FakeHost, ChannelSource>) {
        let (tx, source) = ChannelSource::new();
        let supervisor = Supervisor::with_source(host.clone(), source, Reporter::default());
        (tx, supervisor)
    }

    fn modify(path: &str) -> RawEvent {
        Ok(FileChangeEvent::new(path, ChangeKind::Modify))
    }

    #[tokio::test]
    async fn test_run_once_reports_exit_code() {
        let host = FakeHost::default();
        let supervisor = Supervisor::new(host.clone(), Reporter::default());

        let result = supervisor.run(&plan("solo", &["exit", "5", "solo"], None)).await.unwrap();

        assert_eq!(result, RunResult::from_code(5));
        assert_eq!(host.events(), vec!["start:solo", "end:solo"]);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error_for_solo_run() {
        let host = FakeHost::default();
        let supervisor = Supervisor::new(host.clone(), Reporter::default());

        let err = supervisor.start(&plan("solo", &["missing"], None)).err().unwrap();
        assert_eq!(err.program, "missing");
        assert_eq!(host.spawn_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_in_one_window_respawn_once() {
        let host = FakeHost::default();
        let (tx, supervisor) = watch_supervisor(&host);

        let execution = supervisor
            .start(&plan("dev", &["hang", "dev"], Some(watch_spec(100))))
            .unwrap();
        let handle = tokio::spawn(execution.finish());

        tx.send(modify("/project/a.ts")).unwrap();
        time::sleep(Duration::from_millis(50)).await;
        tx.send(modify("/project/a.ts")).unwrap();
        time::sleep(Duration::from_millis(500)).await;

        assert_eq!(host.spawn_count(), 2);
        assert_eq!(
            host.events()
                .iter()
                .filter(|e| e.starts_with("kill:"))
                .count(),
            1
        );
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_is_issued_before_replacement_spawn() {
        let host = FakeHost::default();
        let (tx, supervisor) = watch_supervisor(&host);

        let execution = supervisor
            .start(&plan("dev", &["hang", "dev"], Some(watch_spec(100))))
            .unwrap();
        let handle = tokio::spawn(execution.finish());

        tx.send(modify("/project/a.ts")).unwrap();
        time::sleep(Duration::from_millis(300)).await;

        let events = host.events();
        let kill = events.iter().position(|e| e == "kill:dev").unwrap();
        let second_start = events
            .iter()
            .enumerate()
            .filter(|(_, e)| *e == "start:dev")
            .nth(1)
            .map(|(i, _)| i)
            .unwrap();
        assert!(kill < second_start);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_exit_does_not_respawn() {
        let host = FakeHost::default();
        let (_tx, supervisor) = watch_supervisor(&host);

        let execution = supervisor
            .start(&plan("dev", &["exit", "0", "dev"], Some(watch_spec(100))))
            .unwrap();
        let handle = tokio::spawn(execution.finish());

        time::sleep(Duration::from_secs(5)).await;

        assert_eq!(host.spawn_count(), 1);
        assert!(host.events().contains(&"end:dev".to_string()));
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_respawn_failure_is_not_fatal() {
        let host = FakeHost::default();
        host.fail_attempt(1);
        let (tx, supervisor) = watch_supervisor(&host);

        let execution = supervisor
            .start(&plan("dev", &["hang", "dev"], Some(watch_spec(100))))
            .unwrap();
        let handle = tokio::spawn(execution.finish());

        tx.send(modify("/project/a.ts")).unwrap();
        time::sleep(Duration::from_millis(300)).await;
        assert_eq!(host.spawn_count(), 1);
        assert!(!handle.is_finished());

        tx.send(modify("/project/b.ts")).unwrap();
        time::sleep(Duration::from_millis(300)).await;
        assert_eq!(host.spawn_count(), 2);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_error_keeps_loop_alive() {
        let host = FakeHost::default();
        let (tx, supervisor) = watch_supervisor(&host);

        let execution = supervisor
            .start(&plan("dev", &["hang", "dev"], Some(watch_spec(100))))
            .unwrap();
        let handle = tokio::spawn(execution.finish());

        tx.send(Err(WatcherError::Subscribe {
            path: PathBuf::from("/project/gone"),
            message: "removed".into(),
        }))
        .unwrap();
        tx.send(modify("/project/a.ts")).unwrap();
        time::sleep(Duration::from_millis(300)).await;

        assert_eq!(host.spawn_count(), 2);
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_formatter_runs_before_each_respawn() {
        let host = FakeHost::default();
        let (tx, supervisor) = watch_supervisor(&host);
        let supervisor =
            supervisor.with_formatter(Some(Formatter::new(vec!["exit".into(), "0".into(), "fmt".into()])));

        let execution = supervisor
            .start(&plan("dev", &["hang", "dev"], Some(watch_spec(100))))
            .unwrap();
        let handle = tokio::spawn(execution.finish());

        tx.send(modify("/project/a.ts")).unwrap();
        time::sleep(Duration::from_millis(500)).await;

        let events = host.events();
        let fmt = events.iter().position(|e| e == "start:fmt").unwrap();
        let kill = events.iter().position(|e| e == "kill:dev").unwrap();
        assert!(fmt < kill);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ends_when_source_closes() {
        let host = FakeHost::default();
        let (tx, supervisor) = watch_supervisor(&host);

        let execution = supervisor
            .start(&plan("dev", &["sleep", "50", "0", "dev"], Some(watch_spec(100))))
            .unwrap();
        drop(tx);

        let result = execution.finish().await.unwrap();
        assert!(result.success);
    }
}
