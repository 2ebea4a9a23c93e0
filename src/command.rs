//! Command assembly - turns a script definition into argv + env

use crate::config::{
    join_args, GlobalOptions, PermissionValue, Permissions, ScriptDefinition, ScriptTarget,
};
use crate::core::{Formatter, Invocation, WatchSpec};
use crate::env::script_env;
use crate::error::ConfigError;
use std::collections::BTreeMap;

/// Interpreter used for file scripts when none is configured
pub const DEFAULT_INTERPRETER: &[&str] = &["deno", "run"];

/// Formatter used when `fmt` is on and no `formatter` is configured
pub const DEFAULT_FORMATTER: &[&str] = &["deno", "fmt"];

/// Everything needed to run one script
#[derive(Debug, Clone)]
pub struct ScriptPlan {
    pub name: String,
    pub invocation: Invocation,
    /// Present when watch mode is enabled for the script
    pub watch: Option<WatchSpec>,
}

/// Shell prefix for command scripts
pub fn shell_args(shell: Option<&str>) -> Vec<String> {
    let shell = shell.unwrap_or(if cfg!(windows) { "cmd.exe" } else { "sh -c" });

    if cfg!(windows) {
        let program = shell.rsplit('\\').next().unwrap_or(shell).to_ascii_lowercase();
        if program == "cmd" || program == "cmd.exe" {
            return vec![shell.to_string(), "/d".into(), "/s".into(), "/c".into()];
        }
    }

    shell.split_whitespace().map(str::to_string).collect()
}

/// Render permission intent as interpreter flags
pub fn permission_flags(permissions: &Permissions) -> Vec<String> {
    fn switch(flags: &mut Vec<String>, name: &str, value: Option<bool>) {
        if value == Some(true) {
            flags.push(format!("--{}", name));
        }
    }

    fn scoped(flags: &mut Vec<String>, name: &str, value: Option<&PermissionValue>) {
        match value {
            Some(PermissionValue::Flag(true)) => flags.push(format!("--{}", name)),
            Some(PermissionValue::Scope(scope)) => flags.push(format!("--{}={}", name, scope)),
            _ => {}
        }
    }

    let mut flags = Vec::new();
    switch(&mut flags, "allow-all", permissions.allow_all);
    switch(&mut flags, "allow-env", permissions.allow_env);
    switch(&mut flags, "allow-hrtime", permissions.allow_hrtime);
    scoped(&mut flags, "allow-net", permissions.allow_net.as_ref());
    switch(&mut flags, "allow-plugin", permissions.allow_plugin);
    scoped(&mut flags, "allow-read", permissions.allow_read.as_ref());
    switch(&mut flags, "allow-run", permissions.allow_run);
    scoped(&mut flags, "allow-write", permissions.allow_write.as_ref());
    flags
}

/// Builds ready-to-spawn plans from resolved config
#[derive(Debug, Clone, Copy)]
pub struct CommandAssembler<'a> {
    global: &'a GlobalOptions,
}

impl<'a> CommandAssembler<'a> {
    pub fn new(global: &'a GlobalOptions) -> Self {
        Self { global }
    }

    /// Assemble argv, env and watch spec for one script
    pub fn assemble(
        &self,
        name: &str,
        script: &ScriptDefinition,
        trailing: &[String],
    ) -> Result<ScriptPlan, ConfigError> {
        let env = script_env(&script.options, self.global)?;
        let argv = match &script.target {
            ScriptTarget::Command { command } => {
                let shell = shell_args(self.global.shell.as_deref());
                if shell.is_empty() {
                    return Err(ConfigError::EmptyCommand(name.to_string()));
                }
                self.command_argv(shell, command, script, trailing)
            }
            ScriptTarget::File { path } => {
                if !path.exists() {
                    return Err(ConfigError::MissingFile(path.clone()));
                }
                let interpreter = self.interpreter();
                if interpreter.is_empty() {
                    return Err(ConfigError::EmptyCommand(name.to_string()));
                }
                self.file_argv(interpreter, &path.to_string_lossy(), script, &env, trailing)
            }
        };

        let watch = match script.watch_options(self.global) {
            Some(options) => Some(WatchSpec::from_options(&options, &script.target)?),
            None => None,
        };

        Ok(ScriptPlan {
            name: name.to_string(),
            invocation: Invocation { argv, env },
            watch,
        })
    }

    /// Automatic formatter, when `fmt` is enabled
    pub fn formatter(&self) -> Option<Formatter> {
        let extra = self.global.fmt.as_ref()?.args()?;
        let mut argv: Vec<String> = match &self.global.formatter {
            Some(formatter) => formatter.to_list(),
            None => DEFAULT_FORMATTER.iter().map(|s| s.to_string()).collect(),
        };
        if argv.is_empty() {
            return None;
        }
        argv.extend(extra);
        Some(Formatter::new(argv))
    }

    fn interpreter(&self) -> Vec<String> {
        match &self.global.interpreter {
            Some(interpreter) => interpreter.to_list(),
            None => DEFAULT_INTERPRETER.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn command_argv(
        &self,
        mut argv: Vec<String>,
        command: &str,
        script: &ScriptDefinition,
        trailing: &[String],
    ) -> Vec<String> {
        let args = join_args(script.options.args.as_ref(), self.global.args.as_ref());
        let line = format!("{} {} {}", command, args.join(" "), trailing.join(" "));
        argv.push(line.trim().to_string());
        argv
    }

    fn file_argv(
        &self,
        mut argv: Vec<String>,
        file: &str,
        script: &ScriptDefinition,
        env: &BTreeMap<String, String>,
        trailing: &[String],
    ) -> Vec<String> {
        let global_permissions = self.global.permissions.clone().unwrap_or_default();
        let mut permissions = match &script.options.permissions {
            Some(local) => global_permissions.overridden_by(local),
            None => global_permissions,
        };
        if !env.is_empty() {
            permissions.allow_env = Some(true);
        }
        argv.extend(permission_flags(&permissions));

        if let Some(tsconfig) = script.options.tsconfig.as_ref().or(self.global.tsconfig.as_ref()) {
            argv.push(format!("-c={}", tsconfig.display()));
        }

        argv.extend(join_args(
            script.options.interpreter_args.as_ref(),
            self.global.interpreter_args.as_ref(),
        ));

        if let Some(import_map) = &self.global.import_map {
            argv.push(format!("--import-map={}", import_map.display()));
        }
        if self.global.unstable {
            argv.push("--unstable".to_string());
        }

        argv.push(file.to_string());
        argv.extend(join_args(script.options.args.as_ref(), self.global.args.as_ref()));
        argv.extend(trailing.iter().cloned());
        argv
    }
}
