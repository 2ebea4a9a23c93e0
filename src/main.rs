//! scriptrun CLI entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use scriptrun::config::{Catalog, Config, ScriptTarget};
use scriptrun::App;
use std::path::PathBuf;

/// Run named scripts from scripts.yml, alone, in groups or in watch mode.
#[derive(Parser, Debug)]
#[command(name = "sr", version, about)]
struct Cli {
    /// Config file (defaults to scripts.yml or scripts.yaml in the current directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print assembled commands, environment and watcher details
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Script or group to run
    script: Option<String>,

    /// Arguments forwarded to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter scripts.yml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// List scripts and groups
    List,
}

fn load_catalog(path: Option<&PathBuf>) -> Result<Catalog> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::auto_load()?,
    };
    Ok(config.resolve()?)
}

fn print_catalog(catalog: &Catalog) {
    println!("Scripts:");
    for (name, script) in &catalog.scripts {
        match &script.target {
            ScriptTarget::Command { command } => println!("  {:<16} {}", name, command),
            ScriptTarget::File { path } => println!("  {:<16} {}", name, path.display()),
        }
    }

    if !catalog.groups.is_empty() {
        println!("Groups:");
        for (name, group) in &catalog.groups {
            println!(
                "  {:<16} {} ({})",
                name,
                group.members.join(", "),
                group.mode
            );
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Some(Commands::Init { force }) => {
            let dir = std::env::current_dir()?;
            scriptrun::init::write_default_config(&dir, force)?;
            Ok(0)
        }
        Some(Commands::List) => {
            let catalog = load_catalog(cli.config.as_ref())?;
            print_catalog(&catalog);
            Ok(0)
        }
        None => {
            let catalog = load_catalog(cli.config.as_ref())?;
            match cli.script {
                Some(name) => App::new(catalog, cli.debug).execute(&name, &cli.args).await,
                None => {
                    print_catalog(&catalog);
                    Ok(0)
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    log::debug!("scriptrun v{}", env!("CARGO_PKG_VERSION"));

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            1
        }
    };

    std::process::exit(code);
}
