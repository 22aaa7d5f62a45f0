//! faultline binary.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: listen on :3000, sidecar on 127.0.0.1:3500
//! faultline
//!
//! # With a config file; APP_PORT / DAPR_HTTP_PORT still override ports
//! faultline --config faultline.toml
//! ```

use anyhow::Context;
use faultline_server::HarnessConfig;

fn print_help() {
    println!("faultline - scriptable fault-injection target");
    println!();
    println!("Usage: faultline [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <PATH>  Load configuration from a TOML file");
    println!("  --help           Show this help");
    println!();
    println!("Environment:");
    println!("  APP_PORT         Port to listen on (default 3000)");
    println!("  DAPR_HTTP_PORT   Sidecar HTTP port (default 3500)");
    println!("  RUST_LOG         Log filter (default info)");
}

fn config_path(args: &[String]) -> anyhow::Result<Option<&str>> {
    match args.iter().position(|a| a == "--config") {
        Some(index) => args
            .get(index + 1)
            .map(|path| Some(path.as_str()))
            .context("--config requires a path"),
        None => Ok(None),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let mut config = match config_path(&args)? {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => HarnessConfig::default(),
    };
    config.apply_env().context("invalid port override")?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        sidecar = %config.sidecar.endpoint,
        "starting faultline"
    );

    faultline_server::run(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    })
    .await
    .context("faultline stopped with an error")
}
