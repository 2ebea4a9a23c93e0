//! `sr init` - scaffold a starter config file

use crate::config::CONFIG_FILE_NAMES;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Starter config written by `sr init`
pub const DEFAULT_CONFIG: &str = r#"# Scripts run with `sr <name> [args...]`
settings:
  # shell: sh -c
  # fmt: false
  watch:
    interval: 500

scripts:
  start:
    run: echo "Hello from scriptrun"

  dev:
    file: main.ts
    watch: true
    permissions:
      allow_net: true
      allow_read: true

  test:
    run: echo "no tests yet"

groups:
  ci:
    scripts: [test, start]
    mode: sequential
"#;

/// Write the starter config into `dir`. Refuses to overwrite unless `force`.
pub fn write_default_config(dir: &Path, force: bool) -> Result<PathBuf> {
    let path = dir.join(CONFIG_FILE_NAMES[0]);

    if path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        );
    }

    std::fs::write(&path, DEFAULT_CONFIG)?;
    log::info!("Created {}", path.display());
    Ok(path)
}
