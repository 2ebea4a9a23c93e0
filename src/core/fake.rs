//! In-memory process host and event source for tests
//!
//! Child behaviour comes from argv:
//! - `exit <code> [label]` exits right away
//! - `sleep <ms> <code> [label]` exits after a delay
//! - `hang [label]` runs until killed
//! - `missing [label]` fails to spawn
//!
//! `sh -c "<line>"` is unwrapped and the line is read the same way.
//!
//! The label is the last argument and shows up in the event log as
//! `start:<label>`, `end:<label>` and `kill:<label>`.

use super::process::{ChildProcess, Invocation, ProcessHost, RunResult};
use super::watcher::{FilesystemEventSource, RawEvent, Subscription};
use crate::error::SpawnError;
use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Exit(i32),
    Sleep(Duration, i32),
    Hang,
}

#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    log: Arc<Mutex<Vec<String>>>,
    attempts: Arc<Mutex<usize>>,
    fail_attempts: Arc<Mutex<HashSet<usize>>>,
}

impl FakeHost {
    /// Make the n-th spawn attempt (0-based) fail
    pub fn fail_attempt(&self, n: usize) {
        self.fail_attempts.lock().unwrap().insert(n);
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.events().iter().filter(|e| e.starts_with("start:")).count()
    }

    pub fn started(&self, label: &str) -> bool {
        self.events().contains(&format!("start:{}", label))
    }

    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

fn unwrap_shell(argv: &[String]) -> Vec<String> {
    match argv {
        [sh, flag, line] if sh == "sh" && flag == "-c" => {
            line.split_whitespace().map(str::to_string).collect()
        }
        _ => argv.to_vec(),
    }
}

fn parse(argv: &[String]) -> Option<Behavior> {
    let number = |i: usize| argv.get(i).and_then(|s| s.parse::<i64>().ok());
    match argv.first().map(String::as_str) {
        Some("exit") => Some(Behavior::Exit(number(1).unwrap_or(0) as i32)),
        Some("sleep") => Some(Behavior::Sleep(
            Duration::from_millis(number(1).unwrap_or(0) as u64),
            number(2).unwrap_or(0) as i32,
        )),
        Some("hang") => Some(Behavior::Hang),
        _ => None,
    }
}

pub struct FakeChild {
    label: String,
    behavior: Behavior,
    killed: Arc<Notify>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ChildProcess for FakeChild {
    fn wait(&mut self) -> impl Future<Output = io::Result<RunResult>> + Send {
        let behavior = self.behavior;
        let killed = self.killed.clone();
        let log = self.log.clone();
        let label = self.label.clone();

        async move {
            let result = match behavior {
                Behavior::Exit(code) => {
                    tokio::task::yield_now().await;
                    RunResult::from_code(code)
                }
                Behavior::Sleep(delay, code) => tokio::select! {
                    _ = tokio::time::sleep(delay) => RunResult::from_code(code),
                    _ = killed.notified() => RunResult::from_signal(9),
                },
                Behavior::Hang => {
                    killed.notified().await;
                    RunResult::from_signal(9)
                }
            };
            log.lock().unwrap().push(format!("end:{}", label));
            Ok(result)
        }
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.log.lock().unwrap().push(format!("kill:{}", self.label));
        self.killed.notify_one();
        Ok(())
    }
}

impl ProcessHost for FakeHost {
    type Child = FakeChild;

    fn spawn(&self, invocation: &Invocation) -> Result<FakeChild, SpawnError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let current = *attempts;
            *attempts += 1;
            current
        };

        let argv = unwrap_shell(&invocation.argv);
        let behavior = parse(&argv);
        let should_fail = self.fail_attempts.lock().unwrap().contains(&attempt);
        let behavior = match behavior {
            Some(behavior) if !should_fail => behavior,
            _ => {
                return Err(SpawnError {
                    program: invocation.program().to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "not found"),
                })
            }
        };

        let label = argv.last().cloned().unwrap_or_default();
        self.record(format!("start:{}", label));

        Ok(FakeChild {
            label,
            behavior,
            killed: Arc::new(Notify::new()),
            log: self.log.clone(),
        })
    }
}

/// Event source fed by a test through a channel
#[derive(Debug, Default)]
pub struct ChannelSource {
    events: Mutex<Option<mpsc::UnboundedReceiver<RawEvent>>>,
}

impl ChannelSource {
    pub fn new() -> (mpsc::UnboundedSender<RawEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            events: Mutex::new(Some(rx)),
        };
        (tx, source)
    }
}

impl FilesystemEventSource for ChannelSource {
    fn subscribe(&self, _roots: &[PathBuf], _recursive: bool) -> Subscription {
        let events = self
            .events
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| mpsc::unbounded_channel().1);
        Subscription::detached(events)
    }
}
