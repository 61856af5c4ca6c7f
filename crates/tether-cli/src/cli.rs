use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tether",
    about = "tether: keep a chat session's credentials backed up remotely",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Configuration file; missing means defaults
    #[arg(long, global = true, default_value = "tether.toml")]
    pub config: PathBuf,

    /// Override the remote container
    #[arg(long, global = true)]
    pub container: Option<String>,

    /// Override the local credential directory
    #[arg(long, global = true)]
    pub credentials_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Upload local credentials to the remote store
    Push(PushArgs),
    /// Restore credentials from the remote store
    Pull(PullArgs),
    /// Compare local and remote session state
    Status(StatusArgs),
    /// Delete the remote session (and optionally local credentials)
    Clear(ClearArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct PushArgs {
    /// Give up after this many seconds (default from config)
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Args)]
pub struct PullArgs {}

#[derive(Args)]
pub struct StatusArgs {}

#[derive(Args)]
pub struct ClearArgs {
    /// Also remove the local credential files
    #[arg(long)]
    pub local: bool,
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Print built-in defaults instead of the loaded file
    #[arg(long)]
    pub defaults: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_overrides() {
        let cli = Cli::try_parse_from([
            "tether",
            "push",
            "--container",
            "prod-bot",
            "--credentials-dir",
            "/var/lib/bot/auth",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.container.as_deref(), Some("prod-bot"));
        assert_eq!(cli.credentials_dir, Some(PathBuf::from("/var/lib/bot/auth")));
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.config, PathBuf::from("tether.toml"));
        assert!(matches!(cli.command, Command::Push(PushArgs { timeout: None })));
    }

    #[test]
    fn clear_flags() {
        let cli = Cli::try_parse_from(["tether", "clear", "--local", "-y"]).unwrap();
        let Command::Clear(args) = cli.command else {
            panic!("expected clear");
        };
        assert!(args.local && args.yes);
    }
}
