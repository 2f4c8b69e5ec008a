use clap::Parser;
use storefront_edge::cli::{
    Args, build_config, init_logging, validate_public_origin, validate_upstream,
};
use storefront_edge::create_app;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(public_origin) = validate_public_origin(&args.public_origin) else {
        std::process::exit(1);
    };

    let Some(upstream) = validate_upstream(&args.upstream) else {
        std::process::exit(1);
    };

    let config = build_config(upstream, &public_origin, args.forgery_mode);
    let app = create_app(&config).unwrap_or_else(|e| {
        error!(error = %e, "Failed to create upstream client");
        std::process::exit(1);
    });

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap_or_else(|e| {
        error!(error = %e, "Failed to read local address");
        std::process::exit(1);
    });

    info!(
        address = %local_addr,
        upstream = %config.upstream,
        forgery_policy = ?config.forgery_policy,
        secure_cookies = config.secure_cookies,
        "Listening"
    );

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
