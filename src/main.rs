use axum::Router;
use clap::Parser;
use sessiongate::cli::{
    Args, build_config, init_logging, load_session_secret, validate_upstream_url,
};
use sessiongate::run_server;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(session_secret) = load_session_secret(args.session_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(upstream_url) = validate_upstream_url(&args.upstream_url, args.production) else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "Failed to read listener address");
            std::process::exit(1);
        }
    };

    info!(address = %local_addr, upstream = %upstream_url, "Listening");

    let config = build_config(args, upstream_url, session_secret);

    if let Err(e) = run_server(config, Router::new(), listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
