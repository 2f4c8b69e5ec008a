pub mod cli;
pub mod client;
pub mod cookie;
pub mod correlation;
pub mod forgery;
pub mod gate;
pub mod login;
pub mod proxy;

use axum::{Router, middleware, routing::get};
use correlation::{make_span, propagate_correlation_layer, set_correlation_layer};
use forgery::{FORGERY_TOKEN_PATH, ForgeryGuard, ForgeryIssuer, ForgeryPolicy, forgery_guard};
use gate::{AccessGate, RouteTable, access_gate, normalize_request_path};
use proxy::{Upstream, forward};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use url::Url;

pub struct ServerConfig {
    /// Storefront upstream receiving every request the edge does not answer itself
    pub upstream: Url,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// What to do with mutating requests failing the forgery check
    pub forgery_policy: ForgeryPolicy,
    /// Access classification of paths
    pub routes: RouteTable,
}

/// Create the edge router with the given configuration.
///
/// Layers, outermost first: correlation id, tracing, path normalization, access gate,
/// forgery guard. Requests surviving them are routed on the normalized path to the
/// token route or forwarded upstream.
pub fn create_app(config: &ServerConfig) -> Result<Router, reqwest::Error> {
    let upstream = Upstream::new(config.upstream.clone())?;
    let gate = Arc::new(AccessGate::new(config.routes.clone()));
    let guard = Arc::new(ForgeryGuard::new(config.forgery_policy));
    let issuer = ForgeryIssuer {
        secure_cookies: config.secure_cookies,
    };

    let token_routes = Router::new()
        .route(FORGERY_TOKEN_PATH, get(forgery::issue_forgery_token))
        .with_state(issuer);

    let proxy_routes = Router::new().fallback(forward).with_state(upstream);

    // Router layers run after routing; nesting as a fallback routes on the rewritten path.
    let routes = token_routes.merge(proxy_routes);

    Ok(Router::new()
        .fallback_service(routes)
        .layer(middleware::from_fn_with_state(guard, forgery_guard))
        .layer(middleware::from_fn_with_state(gate, access_gate))
        .layer(middleware::from_fn(normalize_request_path))
        .layer(TraceLayer::new_for_http().make_span_with(make_span))
        .layer(propagate_correlation_layer())
        .layer(set_correlation_layer()))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config).map_err(std::io::Error::other)?;
    axum::serve(listener, app).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    Ok((handle, local_addr))
}
