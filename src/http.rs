//! Shared HTTP client construction policy.
//!
//! Listing fetches and file transfers use separate clients with different
//! timeout profiles, but both are built here so user agent, proxy handling
//! and compression stay consistent.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy};
use tracing::warn;

use crate::error::TransportError;
use crate::user_agent;

/// Listing client connect timeout (10 seconds).
pub const LISTING_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Listing client total timeout (30 seconds).
pub const LISTING_READ_TIMEOUT_SECS: u64 = 30;

/// Transfer client connect timeout (30 seconds).
pub const TRANSFER_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Transfer client total timeout (5 minutes for large files).
pub const TRANSFER_READ_TIMEOUT_SECS: u64 = 300;

/// Per-call timeout profile for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// Connect timeout in seconds.
    pub connect_secs: u64,
    /// Whole-request timeout in seconds.
    pub read_secs: u64,
}

impl HttpTimeouts {
    /// Timeouts used for directory listing pages.
    #[must_use]
    pub const fn listing() -> Self {
        Self {
            connect_secs: LISTING_CONNECT_TIMEOUT_SECS,
            read_secs: LISTING_READ_TIMEOUT_SECS,
        }
    }

    /// Timeouts used for HEAD probes and file bodies.
    #[must_use]
    pub const fn transfer() -> Self {
        Self {
            connect_secs: TRANSFER_CONNECT_TIMEOUT_SECS,
            read_secs: TRANSFER_READ_TIMEOUT_SECS,
        }
    }
}

/// Builds a reqwest client with the project policy.
///
/// `decompress` controls transparent gzip. File transfers turn it off so the
/// bytes written to disk are the bytes counted by `Content-Length`.
///
/// # Errors
///
/// Returns [`TransportError::ClientBuild`] when the builder rejects the
/// configuration.
pub fn build_http_client(
    timeouts: HttpTimeouts,
    decompress: bool,
) -> Result<Client, TransportError> {
    match try_build_client(timeouts, decompress, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed macOS environments panic while reading system
            // proxy settings; env proxies still apply on the fallback path.
            warn!("HTTP client builder panicked while loading system proxy settings; retrying with env-proxy fallback");
            match try_build_client(timeouts, decompress, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Build(source)) => {
                    Err(TransportError::ClientBuild { source })
                }
                Err(BuildClientFailure::Panic) => {
                    panic!("HTTP client builder panicked while applying env-proxy fallback")
                }
            }
        }
        Err(BuildClientFailure::Build(source)) => Err(TransportError::ClientBuild { source }),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    timeouts: HttpTimeouts,
    decompress: bool,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(timeouts, decompress);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(timeouts: HttpTimeouts, decompress: bool) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .timeout(Duration::from_secs(timeouts.read_secs))
        .gzip(decompress)
        .user_agent(user_agent::default_user_agent())
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
