//! vos-run: boot an environment, run one command, print its output.
//!
//! # Usage
//!
//! ```bash
//! # Echo through the mock context
//! vos-run --mock echo hello
//!
//! # Mount a host directory at / and run from a subdirectory
//! vos-run --mount ./site --cwd /public pwd
//!
//! # Persist the filesystem between runs
//! vos-run --store .vos --config vos.json -- env
//! ```
//!
//! The exit status is the command's exit code.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vos_process::SpawnOptions;
use vos_supervisor::{EnvConfig, EnvOverrides, Environment, MountTree, StoreKind};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host directory to mount at the VFS root
    #[arg(long, value_name = "DIR")]
    mount: Option<PathBuf>,

    /// JSON config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Persist the VFS in this host directory
    #[arg(long, value_name = "DIR")]
    store: Option<PathBuf>,

    /// Directory holding the execution context assets
    #[arg(long, value_name = "DIR")]
    assets: Option<PathBuf>,

    /// Always use the in-process mock context
    #[arg(long)]
    mock: bool,

    /// Working directory inside the VFS
    #[arg(long, default_value = "/")]
    cwd: String,

    /// Text written to the command's stdin
    #[arg(long)]
    input: Option<String>,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long)]
    verbose: bool,

    /// Command to run
    command: String,

    /// Arguments passed to the command
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn load_config(cli: &Cli) -> Result<EnvConfig> {
    let mut config = match &cli.config {
        Some(path) => EnvConfig::load_from(path)
            .await
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EnvConfig::default(),
    };
    config.merge(EnvOverrides {
        store_kind: cli.store.as_ref().map(|_| StoreKind::Disk),
        store_path: cli.store.clone(),
        asset_dir: cli.assets.clone(),
        force_mock: cli.mock.then_some(true),
        ..Default::default()
    });
    Ok(config)
}

async fn run(cli: Cli, env: &Environment) -> Result<i32> {
    if let Some(dir) = &cli.mount {
        let tree = MountTree::from_host_dir(dir)
            .await
            .with_context(|| format!("failed to read {}", dir.display()))?;
        let files = env.mount(&tree).await.context("mount failed")?;
        tracing::info!(dir = %dir.display(), files, "mounted host directory");
    }

    let args: Vec<&str> = cli.args.iter().map(String::as_str).collect();
    let process = env
        .spawn(&cli.command, &args, SpawnOptions::default().cwd(cli.cwd.clone()))
        .await
        .with_context(|| format!("failed to spawn {}", cli.command))?;

    let stdin = process.stdin();
    if let Some(input) = cli.input {
        if let Err(e) = stdin.write(input.into_bytes()).await {
            tracing::debug!(error = %e, "command did not take stdin");
        }
    }
    if let Err(e) = stdin.close().await {
        tracing::debug!(error = %e, "stdin already closed");
    }

    let stdout = process.take_stdout();
    let stderr = process.take_stderr();
    let (out, err, code) = tokio::join!(
        async {
            match stdout {
                Some(s) => s.read_to_end().await,
                None => Vec::new(),
            }
        },
        async {
            match stderr {
                Some(s) => s.read_to_end().await,
                None => Vec::new(),
            }
        },
        process.wait()
    );

    std::io::stdout().write_all(&out)?;
    std::io::stderr().write_all(&err)?;
    Ok(code)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli).await?;
    let env = Environment::builder()
        .config(config)
        .start()
        .await
        .context("environment failed to start")?;
    tracing::info!(bridge = %env.bridge_kind().await?, "environment up");

    let result = run(cli, &env).await;
    env.dispose().await;

    let code = result?;
    tracing::debug!(code, "command finished");
    std::process::exit(code);
}
