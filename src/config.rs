//! Config parser - parses scripts.yml into script definitions and groups

use crate::error::ConfigError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Config file names looked up by [`Config::auto_load`], in priority order
pub const CONFIG_FILE_NAMES: &[&str] = &["scripts.yml", "scripts.yaml"];

/// Default env file picked up when present and not configured
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Raw configuration as written by the user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: GlobalOptions,
    #[serde(default)]
    pub scripts: BTreeMap<String, RawScript>,
    #[serde(default)]
    pub groups: BTreeMap<String, ConcurrentGroup>,
}

/// Script entry before its target is resolved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawScript {
    pub run: Option<String>,
    pub file: Option<PathBuf>,
    #[serde(flatten)]
    pub options: ExecutionOptions,
}

/// What a script executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptTarget {
    /// Shell command line
    Command { command: String },
    /// File handed to the host interpreter
    File { path: PathBuf },
}

/// A resolved script
#[derive(Debug, Clone)]
pub struct ScriptDefinition {
    pub target: ScriptTarget,
    pub options: ExecutionOptions,
}

/// Per-script options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    pub env: BTreeMap<String, EnvValue>,
    pub env_file: Option<EnvFileSetting>,
    /// Arguments placed after the script
    pub args: Option<Args>,
    pub watch: Option<WatchSetting>,
    pub permissions: Option<Permissions>,
    pub tsconfig: Option<PathBuf>,
    /// Arguments placed between the interpreter and the file
    pub interpreter_args: Option<Args>,
}

/// Options shared by every script
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalOptions {
    pub debug: bool,
    pub env: BTreeMap<String, EnvValue>,
    pub env_file: Option<EnvFileSetting>,
    pub args: Option<Args>,
    /// Host interpreter for file scripts, `deno run` when unset
    pub interpreter: Option<Args>,
    pub interpreter_args: Option<Args>,
    pub permissions: Option<Permissions>,
    pub tsconfig: Option<PathBuf>,
    pub import_map: Option<PathBuf>,
    pub unstable: bool,
    /// Shell for command scripts, `sh -c` (or `cmd.exe`) when unset
    pub shell: Option<String>,
    /// Default watch options; never enables watch mode on its own
    pub watch: Option<WatchOptions>,
    pub fmt: Option<FmtSetting>,
    /// Formatter command, `deno fmt` when unset
    pub formatter: Option<Args>,
}

/// Arguments given either as one space separated string or as a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Args {
    Line(String),
    List(Vec<String>),
}

impl Args {
    pub fn to_list(&self) -> Vec<String> {
        match self {
            Self::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            Self::List(list) => list.clone(),
        }
    }
}

/// Concatenate local then global arguments
pub fn join_args(local: Option<&Args>, global: Option<&Args>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(local) = local {
        args.extend(local.to_list());
    }
    if let Some(global) = global {
        args.extend(global.to_list());
    }
    args
}

/// Environment value; numbers and booleans are rendered as strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => write!(f, "{}", s),
        }
    }
}

/// `env_file: true` or `env_file: path/to/file`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvFileSetting {
    Enabled(bool),
    Path(PathBuf),
}

impl EnvFileSetting {
    pub fn path(&self) -> Option<PathBuf> {
        match self {
            Self::Enabled(true) => Some(PathBuf::from(DEFAULT_ENV_FILE)),
            Self::Enabled(false) => None,
            Self::Path(path) => Some(path.clone()),
        }
    }
}

/// `watch: true` or `watch: { ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WatchSetting {
    Enabled(bool),
    Options(WatchOptions),
}

impl WatchSetting {
    /// Local watch options, or `None` when watch mode is off
    pub fn options(&self) -> Option<WatchOptions> {
        match self {
            Self::Enabled(true) => Some(WatchOptions::default()),
            Self::Enabled(false) => None,
            Self::Options(options) => Some(options.clone()),
        }
    }
}

/// Watch options as written in config
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Extra paths to watch
    pub paths: Option<Vec<PathBuf>>,
    /// Only paths matching one of these globs
    #[serde(rename = "match")]
    pub match_globs: Option<Vec<String>>,
    /// Paths matching any of these globs are ignored
    #[serde(rename = "skip")]
    pub skip_globs: Option<Vec<String>>,
    pub extensions: Option<Vec<String>>,
    /// Debounce interval in milliseconds
    pub interval: Option<u64>,
    pub recursive: Option<bool>,
}

impl WatchOptions {
    /// Field-wise merge, `local` wins wherever it is set
    pub fn overridden_by(&self, local: &WatchOptions) -> WatchOptions {
        WatchOptions {
            paths: local.paths.clone().or_else(|| self.paths.clone()),
            match_globs: local.match_globs.clone().or_else(|| self.match_globs.clone()),
            skip_globs: local.skip_globs.clone().or_else(|| self.skip_globs.clone()),
            extensions: local.extensions.clone().or_else(|| self.extensions.clone()),
            interval: local.interval.or(self.interval),
            recursive: local.recursive.or(self.recursive),
        }
    }
}

/// Permission grant: a plain switch or a scoped list (`allow_net: "example.com"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionValue {
    Flag(bool),
    Scope(String),
}

/// Permission intent forwarded to the interpreter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    pub allow_all: Option<bool>,
    pub allow_env: Option<bool>,
    pub allow_hrtime: Option<bool>,
    pub allow_net: Option<PermissionValue>,
    pub allow_plugin: Option<bool>,
    pub allow_read: Option<PermissionValue>,
    pub allow_run: Option<bool>,
    pub allow_write: Option<PermissionValue>,
}

impl Permissions {
    /// Per-key merge, `local` wins wherever it is set
    pub fn overridden_by(&self, local: &Permissions) -> Permissions {
        Permissions {
            allow_all: local.allow_all.or(self.allow_all),
            allow_env: local.allow_env.or(self.allow_env),
            allow_hrtime: local.allow_hrtime.or(self.allow_hrtime),
            allow_net: local.allow_net.clone().or_else(|| self.allow_net.clone()),
            allow_plugin: local.allow_plugin.or(self.allow_plugin),
            allow_read: local.allow_read.clone().or_else(|| self.allow_read.clone()),
            allow_run: local.allow_run.or(self.allow_run),
            allow_write: local.allow_write.clone().or_else(|| self.allow_write.clone()),
        }
    }
}

/// `fmt: true`, `fmt: "--check"` or `fmt: [--check, src]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FmtSetting {
    Enabled(bool),
    Args(Args),
}

impl FmtSetting {
    /// Extra formatter args, or `None` when formatting is off
    pub fn args(&self) -> Option<Vec<String>> {
        match self {
            Self::Enabled(true) => Some(Vec::new()),
            Self::Enabled(false) => None,
            Self::Args(args) => Some(args.to_list()),
        }
    }
}

/// Group execution policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupMode {
    #[default]
    Parallel,
    Sequential,
}

impl fmt::Display for GroupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parallel => write!(f, "parallel"),
            Self::Sequential => write!(f, "sequential"),
        }
    }
}

/// Named list of scripts run together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrentGroup {
    #[serde(rename = "scripts")]
    pub members: Vec<String>,
    #[serde(default)]
    pub mode: GroupMode,
}

/// Validated scripts, groups and global options
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub scripts: BTreeMap<String, ScriptDefinition>,
    pub groups: BTreeMap<String, ConcurrentGroup>,
    pub global: GlobalOptions,
}

/// What a command line name refers to
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Script(&'a ScriptDefinition),
    Group(&'a ConcurrentGroup),
}

impl Config {
    /// Load config from YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Auto-detect and load config from the current directory
    pub fn auto_load() -> Result<Self> {
        for name in CONFIG_FILE_NAMES {
            let path = Path::new(name);
            if path.exists() {
                return Self::from_file(path);
            }
        }

        anyhow::bail!(
            "No config file found. Expected {} in current directory.",
            CONFIG_FILE_NAMES.join(" or ")
        )
    }

    /// Validate names and targets, apply defaults
    pub fn resolve(self) -> Result<Catalog, ConfigError> {
        let mut global = self.settings;

        if global.env_file.is_none() && Path::new(DEFAULT_ENV_FILE).exists() {
            global.env_file = Some(EnvFileSetting::Enabled(true));
        }

        for group_name in self.groups.keys() {
            if self.scripts.contains_key(group_name) {
                return Err(ConfigError::NamespaceCollision(group_name.clone()));
            }
        }

        let mut scripts = BTreeMap::new();
        for (name, raw) in self.scripts {
            let target = match (raw.run, raw.file) {
                (Some(command), None) => ScriptTarget::Command { command },
                (None, Some(path)) => ScriptTarget::File { path },
                _ => return Err(ConfigError::AmbiguousTarget(name)),
            };
            scripts.insert(
                name,
                ScriptDefinition {
                    target,
                    options: raw.options,
                },
            );
        }

        Ok(Catalog {
            scripts,
            groups: self.groups,
            global,
        })
    }
}

impl Catalog {
    /// Resolve a command line name to a script or a group
    pub fn lookup(&self, name: &str) -> Option<Target<'_>> {
        if let Some(group) = self.groups.get(name) {
            return Some(Target::Group(group));
        }
        self.scripts.get(name).map(Target::Script)
    }

    pub fn script(&self, name: &str) -> Option<&ScriptDefinition> {
        self.scripts.get(name)
    }
}

impl ScriptDefinition {
    /// Effective watch options (global defaults overridden by local), if watch is on
    pub fn watch_options(&self, global: &GlobalOptions) -> Option<WatchOptions> {
        let local = self.options.watch.as_ref()?.options()?;
        let defaults = global.watch.clone().unwrap_or_default();
        Some(defaults.overridden_by(&local))
    }
}
