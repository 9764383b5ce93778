//! OBD-II Horsepower Monitor - Main Entry Point

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use obd_protocol::Elm327Connector;
use torque_monitor::{init_logging, self_test_report, Monitor, MonitorConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "torque-monitor", version, about = "Live engine horsepower over OBD-II")]
struct Args {
    /// Print the horsepower calculation for fixed inputs and exit
    #[arg(long)]
    self_test: bool,

    /// Configuration file (defaults to ./torque-monitor.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.self_test {
        print!("{}", self_test_report());
        return ExitCode::SUCCESS;
    }

    let config = match MonitorConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return exit_code(e.exit_code());
        }
    };

    init_logging(&config.log_filter);
    info!("=== Torque Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let connector = Elm327Connector::new();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match Monitor::new(config, &connector).run(shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            exit_code(e.exit_code())
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
