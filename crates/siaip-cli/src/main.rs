//! `siaip-receiver`: listens for SIA-IP panels, or acts as one.

mod serve;
mod send;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use siaip_core::{ReceiverConfig, Verbosity};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// SIA-IP alarm panel event receiver
#[derive(Parser, Debug)]
#[command(name = "siaip-receiver")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Receiver configuration (YAML)
    #[arg(short, long, default_value = "config.yml", global = true)]
    config: PathBuf,

    /// Signal code catalog (YAML)
    #[arg(long, default_value = "codes.yml", global = true)]
    codes: PathBuf,

    /// Blacklisted accounts (YAML)
    #[arg(long, default_value = "blacklist.yml", global = true)]
    blacklist: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept panel connections (default)
    Serve(serve::ServeArgs),

    /// Send one frame as a panel and print the reply
    Send(send::SendArgs),
}

fn default_filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::new(verbosity.filter_directive())
}

fn init_tracing(verbosity: Verbosity) {
    // RUST_LOG wins over the configured verbosity
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbosity));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ReceiverConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    init_tracing(config.server.verbose);

    match cli.command {
        Some(Command::Send(args)) => send::run(&config, args).await,
        Some(Command::Serve(args)) => serve::run(config, &cli.codes, &cli.blacklist, args).await,
        None => serve::run(config, &cli.codes, &cli.blacklist, serve::ServeArgs::default()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_to_serve() {
        let cli = Cli::try_parse_from(["siaip-receiver"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config.yml"));
        assert_eq!(cli.codes, PathBuf::from("codes.yml"));
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::try_parse_from(["siaip-receiver", "serve", "-p", "7100", "-d", "--config", "rx.yml"])
            .unwrap();
        let Some(Command::Serve(args)) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.port, Some(7100));
        assert!(args.debug);
        assert_eq!(cli.config, PathBuf::from("rx.yml"));
    }

    #[test]
    fn test_send_flags() {
        let cli = Cli::try_parse_from([
            "siaip-receiver",
            "send",
            "--host",
            "10.0.0.5:7000",
            "--account",
            "1234",
            "--signal",
            "NBA012",
            "--skew",
            "-600",
        ])
        .unwrap();
        let Some(Command::Send(args)) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.host, "10.0.0.5:7000");
        assert_eq!(args.sequence, "0001");
        assert_eq!(args.skew, -600);
    }

    #[test]
    fn test_diagnostic_output_shown_at_every_verbosity() {
        use siaip_core::constants::DIAGNOSTIC_LOG_TARGET;
        use tracing::Level;

        for level in 0..=3 {
            let subscriber = tracing_subscriber::registry().with(default_filter(Verbosity(level)));
            let (diagnostic, chunk_drops) = tracing::subscriber::with_default(subscriber, || {
                (
                    tracing::enabled!(target: DIAGNOSTIC_LOG_TARGET, Level::INFO),
                    tracing::enabled!(target: "siaip_network::handler", Level::INFO),
                )
            });
            assert!(diagnostic, "diagnostic output hidden at verbose {level}");
            assert_eq!(chunk_drops, level >= 2, "verbose {level}");
        }
    }

    #[test]
    fn test_send_requires_account() {
        let result = Cli::try_parse_from(["siaip-receiver", "send", "--signal", "NBA012"]);
        assert!(result.is_err());
    }
}
