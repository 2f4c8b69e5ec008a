//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::forgery::ForgeryPolicy;
use crate::gate::RouteTable;
use clap::Parser;
use tracing::error;
use url::Url;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "storefront-edge",
    about = "Session and access edge in front of the storefront"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "STOREFRONT_EDGE_PORT", default_value = "7300")]
    pub port: u16,

    /// Storefront upstream receiving forwarded requests (e.g., "http://localhost:3000")
    #[arg(
        short,
        long,
        env = "STOREFRONT_UPSTREAM",
        default_value = "http://localhost:3000"
    )]
    pub upstream: String,

    /// Public origin of the edge; HTTPS enables Secure cookies
    #[arg(
        long,
        env = "STOREFRONT_PUBLIC_ORIGIN",
        default_value = "http://localhost:7300"
    )]
    pub public_origin: String,

    /// Enforce rejects requests failing the forgery check, observe only logs them
    #[arg(long, env = "STOREFRONT_FORGERY_MODE", default_value = "enforce")]
    pub forgery_mode: ForgeryPolicy,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Parse and validate the public origin URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_origin(public_origin: &str) -> Option<Url> {
    let url = match Url::parse(public_origin) {
        Ok(url) => url,
        Err(e) => {
            error!(origin = %public_origin, error = %e, "Invalid public-origin URL");
            return None;
        }
    };

    let is_https = url.scheme() == "https";
    let is_localhost = url.host_str() == Some("localhost");

    if !is_https && !is_localhost {
        error!("public-origin must use HTTPS for non-localhost deployments");
        return None;
    }

    Some(url)
}

/// Parse and validate the upstream URL.
/// Returns None and logs an error if validation fails.
pub fn validate_upstream(upstream: &str) -> Option<Url> {
    let url = match Url::parse(upstream) {
        Ok(url) => url,
        Err(e) => {
            error!(upstream = %upstream, error = %e, "Invalid upstream URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        error!(upstream = %upstream, "upstream must be an http(s) URL with a host");
        return None;
    }

    Some(url)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(upstream: Url, public_origin: &Url, forgery_policy: ForgeryPolicy) -> ServerConfig {
    let secure_cookies = public_origin.scheme() == "https";

    ServerConfig {
        upstream,
        secure_cookies,
        forgery_policy,
        routes: RouteTable::storefront(),
    }
}
