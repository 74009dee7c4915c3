//! devstack binary

use clap::Parser;
use devstack::{commands, Cli};
use tokio_util::sync::CancellationToken;

fn main() {
    // Default to info level if RUST_LOG not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Unable to start the async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, cancelling");
                on_signal.cancel();
            }
        });

        match commands::run(cli, cancel).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                1
            }
        }
    });

    std::process::exit(code);
}
