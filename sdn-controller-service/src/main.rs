//! SDN controller service
//!
//! Runs the policy engine against recorded switch events:
//! - `replay`: feed a JSON-lines event log through the controller and print
//!   every message sent to a switch as one JSON line
//! - `rules`: show the baseline rules a switch gets on connect
//! - `hosts`: show the address directory

use anyhow::Result;
use clap::Parser;
use sdn_core::Dpid;
use sdn_policy::{start, PolicySettings, SwitchSessionController};
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod listing;
mod recorder;
mod replay;

use replay::ReplaySource;

#[derive(Parser, Debug)]
#[command(name = "sdn-controller")]
#[command(about = "Policy controller for a segmented OpenFlow network")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Policy settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Replay a switch event log through the controller
    Replay {
        /// Path to event log, `-` for stdin
        #[arg(default_value = "-")]
        path: PathBuf,
    },
    /// Print the baseline rules a switch receives on connect
    Rules {
        #[arg(long)]
        dpid: Dpid,
    },
    /// Print the address directory
    Hosts,
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("sdn_controller_service=info".parse()?)
        .add_directive("sdn_policy=info".parse()?)
        .add_directive("sdn_network=info".parse()?);

    // stdout carries switch messages
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from /etc/sdn-controller/environment (if exists)
    sdn_core::config::load_environment();

    let args = Args::parse();
    init_tracing(args.json_logs)?;

    let settings = PolicySettings::load(args.config.as_deref())?;
    let controller = SwitchSessionController::from_settings(&settings)?;

    match args.command.unwrap_or(Commands::Replay {
        path: PathBuf::from("-"),
    }) {
        Commands::Rules { dpid } => {
            for line in listing::rule_lines(&controller, dpid)? {
                println!("{}", line);
            }
        }
        Commands::Hosts => {
            for line in listing::host_lines(&controller) {
                println!("{}", line);
            }
        }
        Commands::Replay { path } => {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            let writer = recorder::spawn_writer(rx, tokio::io::stdout());

            let mut source = ReplaySource::new(tx);
            start(&mut source, controller);

            let report = if path.as_os_str() == "-" {
                info!("Replaying switch events from stdin");
                source.replay(BufReader::new(tokio::io::stdin())).await?
            } else {
                info!("Replaying switch events from {:?}", path);
                let file = tokio::fs::File::open(&path).await?;
                source.replay(BufReader::new(file)).await?
            };

            // Closes the outbound channel so the writer can finish
            drop(source);
            let written = writer.await?;

            info!(written, "Switch messages written");
            if report.security_degraded > 0 {
                error!(
                    count = report.security_degraded,
                    "Firewall rules failed to install during replay"
                );
            }
            eprintln!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
