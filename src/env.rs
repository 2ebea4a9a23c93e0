//! Environment assembly - env file < global env < script env

use crate::config::{EnvValue, ExecutionOptions, GlobalOptions};
use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::path::Path;

/// Read `KEY=value` pairs from an env file
pub fn load_env_file(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let iter = dotenvy::from_path_iter(path).map_err(|source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    })?;

    let mut vars = BTreeMap::new();
    for item in iter {
        let (key, value) = item.map_err(|source| ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        })?;
        vars.insert(key, value);
    }
    Ok(vars)
}

/// Render config env values to strings
pub fn render_env(values: &BTreeMap<String, EnvValue>) -> BTreeMap<String, String> {
    values
        .iter()
        .map(|(key, value)| (key.clone(), value.to_string()))
        .collect()
}

/// Environment for one script; later sources win per key
pub fn script_env(
    local: &ExecutionOptions,
    global: &GlobalOptions,
) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut env = BTreeMap::new();

    let env_file = local.env_file.as_ref().or(global.env_file.as_ref());
    if let Some(path) = env_file.and_then(|setting| setting.path()) {
        env.extend(load_env_file(&path)?);
    }

    env.extend(render_env(&global.env));
    env.extend(render_env(&local.env));

    Ok(env)
}
