use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _};
use colored::Colorize;
use serde::Serialize;
use tether_archive::ArchiveCodec;
use tether_creds::{CredentialRepository, FsCredentialRepository};
use tether_store::{RemoteSessionStore, SessionStore, StoreError};
use tether_sync::{FinalSyncOutcome, HydrationResult, SyncCoordinator, SyncUpOutcome};
use tether_types::{ArchiveVersion, CredentialState, RemoteBlobRef};

use crate::cli::*;
use crate::config::TetherConfig;

/// Everything a command needs, built from configuration.
pub struct Context {
    pub config: TetherConfig,
    pub blob: RemoteBlobRef,
    pub store: Arc<dyn SessionStore>,
    pub repo: Arc<dyn CredentialRepository>,
    pub coordinator: Arc<SyncCoordinator>,
}

impl Context {
    pub fn new(config: TetherConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let blob = config.blob_ref()?;
        let store: Arc<dyn SessionStore> = Arc::new(RemoteSessionStore::new(config.blob_backend()));
        let codec = match &config.scratch_dir {
            Some(dir) => ArchiveCodec::new().with_staging_dir(dir),
            None => ArchiveCodec::new(),
        };
        let repo: Arc<dyn CredentialRepository> =
            Arc::new(FsCredentialRepository::with_codec(&config.credentials_dir, codec));
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&repo),
            config.sync_options()?,
        ));
        Ok(Self {
            config,
            blob,
            store,
            repo,
            coordinator,
        })
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let config = TetherConfig::load(&cli.config)?.with_overrides(cli.container, cli.credentials_dir);
    match cli.command {
        Command::Config(args) => cmd_config(&config, args),
        Command::Push(args) => cmd_push(&Context::new(config)?, args, format).await,
        Command::Pull(_) => cmd_pull(&Context::new(config)?, format).await,
        Command::Status(_) => cmd_status(&Context::new(config)?, format).await,
        Command::Clear(args) => cmd_clear(&Context::new(config)?, args, format).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_push(ctx: &Context, args: PushArgs, format: OutputFormat) -> anyhow::Result<()> {
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or(ctx.coordinator.options().final_sync_timeout);
    let outcome = ctx.coordinator.final_sync_within(timeout).await?;
    if format == OutputFormat::Json {
        print_json(&outcome)?;
    }
    match outcome {
        FinalSyncOutcome::Completed(SyncUpOutcome::Uploaded { version }) => {
            if format == OutputFormat::Text {
                println!("{} Uploaded session {} to {}", "✓".green().bold(), version.short_hex().yellow(), ctx.blob.to_string().bold());
            }
        }
        FinalSyncOutcome::Completed(SyncUpOutcome::UpToDate { .. }) => {
            if format == OutputFormat::Text {
                println!("{} Remote is up to date.", "✓".green());
            }
        }
        FinalSyncOutcome::Completed(SyncUpOutcome::NothingToUpload) => {
            if format == OutputFormat::Text {
                println!("No credentials in {}; nothing to upload.", ctx.config.credentials_dir.display());
            }
        }
        FinalSyncOutcome::TimedOut => bail!("upload did not finish within {}s", timeout.as_secs()),
    }
    Ok(())
}

async fn cmd_pull(ctx: &Context, format: OutputFormat) -> anyhow::Result<()> {
    let result = ctx.coordinator.hydrate().await?;
    if format == OutputFormat::Json {
        return print_json(&result);
    }
    match result {
        HydrationResult::Restored { version, files } => println!(
            "{} Restored {} files (session {}) into {}",
            "✓".green().bold(),
            files,
            version.short_hex().yellow(),
            ctx.config.credentials_dir.display()
        ),
        HydrationResult::NotFound => println!(
            "No session stored at {}; the next connection will need pairing.",
            ctx.blob.to_string().bold()
        ),
        HydrationResult::LocalNewer { version } => println!(
            "Kept local credentials (session {}); they have not been uploaded yet.",
            version.short_hex().yellow()
        ),
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub enum SyncState {
    InSync,
    Differs,
    RemoteMissing,
    LocalMissing,
    Empty,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub blob: String,
    pub local_files: usize,
    pub local_bytes: u64,
    pub local_version: Option<ArchiveVersion>,
    pub remote_version: Option<ArchiveVersion>,
    pub state: SyncState,
}

pub async fn status_report(ctx: &Context) -> anyhow::Result<StatusReport> {
    let repo = Arc::clone(&ctx.repo);
    let local: CredentialState = tokio::task::spawn_blocking(move || repo.snapshot()).await??;
    let local_version = (!local.is_empty()).then(|| local.version());

    let remote_version = match ctx.store.get(&ctx.blob).await {
        Ok(archive) => {
            let state = ArchiveCodec::new()
                .decode(&archive)
                .context("remote session archive is unreadable")?;
            Some(state.version())
        }
        Err(StoreError::NotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };

    let state = match (local_version, remote_version) {
        (Some(l), Some(r)) if l == r => SyncState::InSync,
        (Some(_), Some(_)) => SyncState::Differs,
        (Some(_), None) => SyncState::RemoteMissing,
        (None, Some(_)) => SyncState::LocalMissing,
        (None, None) => SyncState::Empty,
    };
    Ok(StatusReport {
        blob: ctx.blob.to_string(),
        local_files: local.len(),
        local_bytes: local.total_bytes(),
        local_version,
        remote_version,
        state,
    })
}

async fn cmd_status(ctx: &Context, format: OutputFormat) -> anyhow::Result<()> {
    let report = status_report(ctx).await?;
    if format == OutputFormat::Json {
        return print_json(&report);
    }
    let short = |v: Option<ArchiveVersion>| v.map(|v| v.short_hex()).unwrap_or_else(|| "-".into());
    println!("Remote:  {}", report.blob.bold());
    println!(
        "Local:   {} files, {} bytes, session {}",
        report.local_files,
        report.local_bytes,
        short(report.local_version).cyan()
    );
    println!("Stored:  session {}", short(report.remote_version).cyan());
    let summary = match report.state {
        SyncState::InSync => "in sync".green(),
        SyncState::Differs => "local differs from remote (run `tether push`)".yellow(),
        SyncState::RemoteMissing => "not backed up (run `tether push`)".yellow(),
        SyncState::LocalMissing => "remote only (run `tether pull`)".yellow(),
        SyncState::Empty => "no session anywhere; pairing required".normal(),
    };
    println!("State:   {summary}");
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

async fn cmd_clear(ctx: &Context, args: ClearArgs, format: OutputFormat) -> anyhow::Result<()> {
    if !args.yes && !confirm(&format!("Delete the session stored at {}?", ctx.blob))? {
        println!("Aborted.");
        return Ok(());
    }
    clear(ctx, args.local).await?;
    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({ "blob": ctx.blob.to_string(), "local": args.local }));
    }
    println!("{} Removed {}", "✓".green().bold(), ctx.blob.to_string().bold());
    if args.local {
        println!("{} Cleared {}", "✓".green().bold(), ctx.config.credentials_dir.display());
    }
    Ok(())
}

pub async fn clear(ctx: &Context, local: bool) -> anyhow::Result<()> {
    ctx.store.delete(&ctx.blob).await?;
    if local {
        let repo = Arc::clone(&ctx.repo);
        tokio::task::spawn_blocking(move || repo.replace(&CredentialState::new())).await??;
    }
    Ok(())
}

fn cmd_config(config: &TetherConfig, args: ConfigArgs) -> anyhow::Result<()> {
    let shown = if args.defaults {
        TetherConfig::default()
    } else {
        config.clone()
    };
    shown.validate()?;
    print!("{}", shown.to_toml()?);
    Ok(())
}
