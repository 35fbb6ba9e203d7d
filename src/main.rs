use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;

use server_locator::{LocatorConfig, ProcessFinder};

#[derive(Debug, Parser)]
#[command(name = "server-locator", version, about = "Find the local language server for a workspace")]
struct Cli {
    /// TOML config file. Missing files fall back to defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Workspace folder; repeat for multi-root workspaces.
    #[arg(long = "folder", global = true)]
    folders: Vec<PathBuf>,
    #[arg(long, global = true)]
    workspace_file: Option<PathBuf>,
    #[arg(long, global = true)]
    attempts: Option<u32>,
    #[arg(long, global = true)]
    base_delay_ms: Option<u64>,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Locate and verify the server, print `{"port", "token"}`.
    Detect,
    /// Run detection and print a human-readable report.
    Diagnostics,
    /// Print the workspace ids expected for the given folders.
    Ids,
}

fn load_config(cli: &Cli) -> anyhow::Result<LocatorConfig> {
    let mut cfg = match &cli.config {
        Some(path) => LocatorConfig::load_or_default(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => LocatorConfig::default(),
    };
    if !cli.folders.is_empty() {
        cfg.workspace.folders = cli.folders.clone();
    }
    if cli.workspace_file.is_some() {
        cfg.workspace.workspace_file = cli.workspace_file.clone();
    }
    if let Some(attempts) = cli.attempts {
        cfg.detect.attempts = attempts;
    }
    if let Some(ms) = cli.base_delay_ms {
        cfg.detect.base_delay_ms = ms;
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    let level = if cli.verbose || cfg.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if cfg.workspace.is_empty() {
        log::warn!("no workspace folders given; any verified server is accepted");
    }
    let finder = ProcessFinder::new(&cfg).context("invalid server host")?;
    let options = cfg.detect_options(cli.verbose);

    match cli.command.unwrap_or(Cmd::Detect) {
        Cmd::Ids => {
            let platform = finder.platform();
            let out = json!({
                "os": platform.os(),
                "arch": platform.arch(),
                "process_name": platform.process_name(),
                "host": finder.host(),
                "workspace_ids": finder.expected_workspace_ids(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Cmd::Detect => match finder.detect(&options).await? {
            Some(conn) => println!("{}", serde_json::to_string(&conn)?),
            None => {
                let reason = finder.failure_reason();
                println!(
                    "{}",
                    json!({
                        "error": reason.map(|r| r.as_str()),
                        "message": reason.map(|r| r.user_message()),
                        "attempts": finder.attempt_details(),
                    })
                );
                std::process::exit(1);
            }
        },
        Cmd::Diagnostics => {
            let found = finder.detect(&options).await?;
            print!("{}", finder.diagnostics_report());
            if found.is_none() {
                log::info!(
                    "detection gave up after {} attempt(s), base delay {:?}",
                    options.attempts,
                    options.base_delay
                );
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
