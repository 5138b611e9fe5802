use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use vpn_kill_users::{Config, KillerError, VpnKiller};

#[derive(Parser)]
#[command(name = "vpn-kill-users")]
#[command(about = "Force disallowed users off the VPN without waiting for renegotiation")]
#[command(version)]
struct Cli {
    /// VPN management socket to connect to
    #[arg(required_unless_present = "init")]
    vpn_socket: Option<PathBuf>,

    /// Write a starter config to ./vpn-kill-users.toml and exit
    #[arg(long, conflicts_with_all = ["noop", "config"])]
    init: bool,

    /// Do not disconnect anyone
    #[arg(long)]
    noop: bool,

    /// Config file (defaults to ./vpn-kill-users.toml, then ~/.vpn-kill-users/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the per-user notices
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if cli.init {
        let path = Config::local_path();
        if path.exists() {
            error!("{} already exists, not overwriting", path.display());
            std::process::exit(1);
        }
        info!("Generating default config...");
        Config::template().save(&path)?;
        println!("Created default config: {}", path.display());
        return Ok(());
    }

    let Some(vpn_socket) = cli.vpn_socket else {
        error!("No management socket given");
        std::process::exit(1);
    };

    let mut killer = match VpnKiller::load(&vpn_socket, cli.config.as_deref()) {
        Ok(killer) => killer,
        Err(e) => {
            error!("Unable to set up: {}", e);
            std::process::exit(1);
        }
    };

    if cli.noop {
        info!("Dry run: nobody will be disconnected");
    }

    match killer.run(cli.noop) {
        Ok(summary) => {
            info!(
                "Done: {} of {} disconnected",
                summary.evicted, summary.planned
            );
        }
        Err(KillerError::Unreachable(path)) => {
            println!("Unable to connect to {}", path.display());
            std::process::exit(1);
        }
        Err(e) => {
            error!("Run failed: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
