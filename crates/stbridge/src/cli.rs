//! Clap derive structures for the `stbridge` command line.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Bridge SmartThings air conditioners to an MQTT broker.
#[derive(Debug, Parser)]
#[command(name = "stbridge", version, about, propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "STBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Default, Subcommand)]
pub enum Command {
    /// Run the bridge until interrupted (default)
    #[default]
    Run,

    /// Validate the configuration without connecting to the broker
    CheckConfig(CheckConfigArgs),
}

#[derive(Debug, Args)]
pub struct CheckConfigArgs {
    /// Read every configured device once and show what it maps to
    #[arg(long)]
    pub probe: bool,

    /// Print the effective configuration with secrets masked
    #[arg(long)]
    pub print: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["stbridge", "-vv"]).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(cli.global.verbose, 2);
        assert!(matches!(cli.command.unwrap_or_default(), Command::Run));
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "stbridge",
            "check-config",
            "--probe",
            "--config",
            "/tmp/bridge.toml",
            "--log-format",
            "json",
        ])
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(cli.global.config, Some(PathBuf::from("/tmp/bridge.toml")));
        assert_eq!(cli.global.log_format, LogFormat::Json);
        let Some(Command::CheckConfig(args)) = cli.command else {
            panic!("expected check-config");
        };
        assert!(args.probe);
        assert!(!args.print);
    }
}
