//! Debounced file watcher
//!
//! Raw filesystem events are filtered, coalesced per path and emitted as one
//! [`ChangeBatch`] once no accepted event has arrived for the debounce
//! interval. The debounce loop runs in its own tokio task; consumers pull
//! batches with [`Watcher::next`].

use crate::config::{ScriptTarget, WatchOptions};
use crate::error::{ConfigError, WatcherError};
use glob::Pattern;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Debounce interval used when none is configured
pub const DEFAULT_INTERVAL_MS: u64 = 500;

/// Version control metadata, always skipped
pub const VCS_SKIP_GLOB: &str = "*/.git/*";

/// Kind of a raw filesystem event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Any,
    Access,
    Create,
    Modify,
    Remove,
}

impl ChangeKind {
    /// Past tense used in change logs ("was modified")
    pub fn past(&self) -> &'static str {
        match self {
            Self::Any => "changed",
            Self::Access => "accessed",
            Self::Create => "created",
            Self::Modify => "modified",
            Self::Remove => "removed",
        }
    }
}

impl From<&EventKind> for ChangeKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Access(_) => Self::Access,
            EventKind::Create(_) => Self::Create,
            EventKind::Modify(_) => Self::Modify,
            EventKind::Remove(_) => Self::Remove,
            EventKind::Any | EventKind::Other => Self::Any,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Access => "access",
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Remove => "remove",
        };
        write!(f, "{}", name)
    }
}

/// A single raw event for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Coalesced changes: path -> latest kind seen since the previous batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    changes: BTreeMap<PathBuf, ChangeKind>,
}

impl ChangeBatch {
    /// Record an event; access events are never stored
    pub fn record(&mut self, event: FileChangeEvent) {
        if event.kind != ChangeKind::Access {
            self.changes.insert(event.path, event.kind);
        }
    }

    pub fn get(&self, path: &Path) -> Option<ChangeKind> {
        self.changes.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, ChangeKind)> {
        self.changes.iter().map(|(path, kind)| (path.as_path(), *kind))
    }
}

/// Path filter applied to every accepted event
#[derive(Debug, Clone, Default)]
pub struct WatchFilter {
    extensions: Option<Vec<String>>,
    match_globs: Option<Vec<Pattern>>,
    skip_globs: Option<Vec<Pattern>>,
}

fn compile_globs(globs: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    globs
        .iter()
        .map(|glob| {
            Pattern::new(glob).map_err(|source| ConfigError::InvalidGlob {
                pattern: glob.clone(),
                source,
            })
        })
        .collect()
}

impl WatchFilter {
    pub fn new(
        extensions: Option<&[String]>,
        match_globs: Option<&[String]>,
        skip_globs: Option<&[String]>,
    ) -> Result<Self, ConfigError> {
        let extensions = extensions.map(|exts| {
            exts.iter()
                .map(|ext| {
                    if ext.starts_with('.') {
                        ext.clone()
                    } else {
                        format!(".{}", ext)
                    }
                })
                .collect()
        });

        Ok(Self {
            extensions,
            match_globs: match_globs.map(compile_globs).transpose()?,
            skip_globs: skip_globs.map(compile_globs).transpose()?,
        })
    }

    /// Whether a path passes the filter. Skip globs win over match globs.
    pub fn is_watched(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();

        if let Some(exts) = &self.extensions {
            if !exts.iter().any(|ext| text.ends_with(ext.as_str())) {
                return false;
            }
        }
        if let Some(skip) = &self.skip_globs {
            if skip.iter().any(|glob| glob.matches(&text)) {
                return false;
            }
        }
        if let Some(globs) = &self.match_globs {
            if !globs.iter().any(|glob| glob.matches(&text)) {
                return false;
            }
        }
        true
    }

    /// Access events are dropped before the path filter runs
    pub fn accepts(&self, event: &FileChangeEvent) -> bool {
        event.kind != ChangeKind::Access && self.is_watched(&event.path)
    }
}

/// Fully merged watch configuration for one script
#[derive(Debug, Clone)]
pub struct WatchSpec {
    pub roots: Vec<PathBuf>,
    pub filter: WatchFilter,
    pub interval: Duration,
    pub recursive: bool,
}

/// Serializable view of a [`WatchSpec`] for debug output
#[derive(Debug, Serialize)]
struct WatchSpecView<'a> {
    paths: &'a [PathBuf],
    interval_ms: u64,
    extensions: Option<&'a [String]>,
    r#match: Option<Vec<&'a str>>,
    skip: Option<Vec<&'a str>>,
    recursive: bool,
}

fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    joined.components().collect()
}

impl WatchSpec {
    /// Build from merged options. File scripts always watch their own file;
    /// command scripts without paths watch the working directory.
    pub fn from_options(options: &WatchOptions, target: &ScriptTarget) -> Result<Self, ConfigError> {
        let interval = options.interval.unwrap_or(DEFAULT_INTERVAL_MS);
        if interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }

        let mut requested: Vec<PathBuf> = Vec::new();
        if let ScriptTarget::File { path } = target {
            requested.push(path.clone());
        }
        requested.extend(options.paths.iter().flatten().cloned());
        if requested.is_empty() {
            requested.push(PathBuf::from("."));
        }

        let mut roots: Vec<PathBuf> = Vec::new();
        for path in requested.iter().map(|p| absolute(p)) {
            if !roots.contains(&path) {
                roots.push(path);
            }
        }

        let mut skip = options.skip_globs.clone().unwrap_or_default();
        skip.push(VCS_SKIP_GLOB.to_string());

        let filter = WatchFilter::new(
            options.extensions.as_deref(),
            options.match_globs.as_deref(),
            Some(&skip),
        )?;

        Ok(Self {
            roots,
            filter,
            interval: Duration::from_millis(interval),
            recursive: options.recursive.unwrap_or(true),
        })
    }

    /// Pretty JSON description for debug logs
    pub fn describe(&self) -> String {
        let view = WatchSpecView {
            paths: &self.roots,
            interval_ms: self.interval.as_millis() as u64,
            extensions: self.filter.extensions.as_deref(),
            r#match: self
                .filter
                .match_globs
                .as_ref()
                .map(|globs| globs.iter().map(Pattern::as_str).collect()),
            skip: self
                .filter
                .skip_globs
                .as_ref()
                .map(|globs| globs.iter().map(Pattern::as_str).collect()),
            recursive: self.recursive,
        };
        serde_json::to_string_pretty(&view).unwrap_or_default()
    }
}

/// Raw event or source failure
pub type RawEvent = Result<FileChangeEvent, WatcherError>;

/// Live subscription to a filesystem event source.
/// Dropping it stops the underlying OS watch.
pub struct Subscription {
    pub events: mpsc::UnboundedReceiver<RawEvent>,
    _guard: Option<Box<dyn Any + Send>>,
}

impl Subscription {
    pub fn new(events: mpsc::UnboundedReceiver<RawEvent>, guard: impl Any + Send) -> Self {
        Self {
            events,
            _guard: Some(Box::new(guard)),
        }
    }

    /// Subscription with nothing to keep alive besides the channel
    pub fn detached(events: mpsc::UnboundedReceiver<RawEvent>) -> Self {
        Self {
            events,
            _guard: None,
        }
    }
}

/// Something that can report filesystem changes under a set of roots
pub trait FilesystemEventSource {
    fn subscribe(&self, roots: &[PathBuf], recursive: bool) -> Subscription;
}

/// OS notifications through the `notify` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifySource;

impl FilesystemEventSource for NotifySource {
    fn subscribe(&self, roots: &[PathBuf], recursive: bool) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();

        let callback_tx = tx.clone();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let kind = ChangeKind::from(&event.kind);
                    for path in event.paths {
                        let _ = callback_tx.send(Ok(FileChangeEvent { path, kind }));
                    }
                }
                Err(err) => {
                    let _ = callback_tx.send(Err(WatcherError::Source(err.to_string())));
                }
            },
            notify::Config::default(),
        );

        let mut watcher = match watcher {
            Ok(watcher) => watcher,
            Err(err) => {
                let _ = tx.send(Err(WatcherError::Source(err.to_string())));
                return Subscription::detached(rx);
            }
        };

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        // A root that cannot be watched is reported; the others keep going.
        for root in roots {
            if let Err(err) = watcher.watch(root, mode) {
                let _ = tx.send(Err(WatcherError::Subscribe {
                    path: root.clone(),
                    message: err.to_string(),
                }));
            }
        }

        Subscription::new(rx, watcher)
    }
}

/// Output of [`Watcher::next`]
#[derive(Debug)]
pub enum WatchItem {
    Batch(ChangeBatch),
    Error(WatcherError),
}

/// One debounced watch session. Not restartable; build a new one instead.
pub struct Watcher {
    batches: mpsc::UnboundedReceiver<ChangeBatch>,
    errors: mpsc::UnboundedReceiver<WatcherError>,
    task: JoinHandle<()>,
}

impl Watcher {
    /// Watch the spec's roots with OS notifications
    pub fn start(spec: &WatchSpec) -> Self {
        Self::with_source(spec, &NotifySource)
    }

    pub fn with_source(spec: &WatchSpec, source: &impl FilesystemEventSource) -> Self {
        let subscription = source.subscribe(&spec.roots, spec.recursive);
        Self::from_subscription(spec, subscription)
    }

    /// Must be called inside a tokio runtime
    pub fn from_subscription(spec: &WatchSpec, subscription: Subscription) -> Self {
        let (batch_tx, batches) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();

        let task = tokio::spawn(debounce(
            subscription,
            spec.filter.clone(),
            spec.interval,
            batch_tx,
            error_tx,
        ));

        Self {
            batches,
            errors,
            task,
        }
    }

    /// Wait for the next batch or source error.
    /// Returns `None` once the source has closed and everything is drained.
    pub async fn next(&mut self) -> Option<WatchItem> {
        tokio::select! {
            biased;
            Some(err) = self.errors.recv() => Some(WatchItem::Error(err)),
            batch = self.batches.recv() => batch.map(WatchItem::Batch),
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn debounce(
    mut subscription: Subscription,
    filter: WatchFilter,
    interval: Duration,
    batch_tx: mpsc::UnboundedSender<ChangeBatch>,
    error_tx: mpsc::UnboundedSender<WatcherError>,
) {
    let mut pending = ChangeBatch::default();
    let mut deadline: Option<Instant> = None;

    loop {
        let wake = deadline;
        let timer = async move {
            match wake {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            raw = subscription.events.recv() => match raw {
                Some(Ok(event)) => {
                    if filter.accepts(&event) {
                        pending.record(event);
                        deadline = Some(Instant::now() + interval);
                    }
                }
                Some(Err(err)) => {
                    if error_tx.send(err).is_err() {
                        return;
                    }
                }
                None => break,
            },
            _ = timer => {
                deadline = None;
                if batch_tx.send(std::mem::take(&mut pending)).is_err() {
                    return;
                }
            }
        }
    }

    // Source closed: flush what is still waiting out its quiet period.
    if let Some(at) = deadline {
        time::sleep_until(at).await;
        let _ = batch_tx.send(pending);
    }
}
