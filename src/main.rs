//! Funclet — a small Functions-as-a-Service control plane.

use clap::Parser;
use funclet::config::ServiceArgs;
use funclet::{AppState, Result};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    if let Err(e) = run() {
        eprintln!("funclet failed to start: {e}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> Result<()> {
    let args = ServiceArgs::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(args))
}

async fn serve(args: ServiceArgs) -> Result<()> {
    let state = AppState::new(&args.base_dir, args.invoke_timeout(), args.max_upload_bytes)?;
    state.hydrate()?;
    info!(
        functions = state.registry.len(),
        base_dir = %args.base_dir.display(),
        "functions loaded from disk"
    );

    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    info!(addr = %args.listen_addr, "funclet listening");
    axum::serve(listener, funclet::router(state)).await?;
    Ok(())
}
