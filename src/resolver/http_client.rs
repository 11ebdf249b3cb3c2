//! HTTP client construction for the remote catalogues.
//!
//! Connect and read timeouts are process-wide: the binary sets them once from
//! its config file before the registry is built. The overall per-lookup
//! budget is separate and enforced by the registry.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::RwLock;
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, warn};

use crate::user_agent;

use super::ResolveError;

/// Connect and read timeouts applied to every catalogue client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CatalogueTimeouts {
    connect: Duration,
    read: Duration,
}

static CATALOGUE_TIMEOUTS: RwLock<CatalogueTimeouts> = RwLock::new(CatalogueTimeouts {
    connect: Duration::from_secs(10),
    read: Duration::from_secs(30),
});

/// Sets the connect and read timeouts used by clients built afterwards.
pub fn configure_resolver_http_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) {
    if let Ok(mut timeouts) = CATALOGUE_TIMEOUTS.write() {
        *timeouts = CatalogueTimeouts {
            connect: Duration::from_secs(connect_timeout_secs),
            read: Duration::from_secs(read_timeout_secs),
        };
    }
}

fn current_timeouts() -> CatalogueTimeouts {
    match CATALOGUE_TIMEOUTS.read() {
        Ok(timeouts) => *timeouts,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Builds the client one catalogue resolver uses for all of its requests.
///
/// # Errors
///
/// Returns [`ResolveError::ClientSetup`] when no client can be built.
pub(crate) fn build_resolver_http_client(resolver: &str) -> Result<Client, ResolveError> {
    let timeouts = current_timeouts();
    debug!(
        resolver,
        connect_secs = timeouts.connect.as_secs(),
        read_secs = timeouts.read.as_secs(),
        "building catalogue client"
    );

    // Reading system proxy settings panics in some sandboxes; the second
    // attempt only looks at proxy environment variables.
    let first = build_guarded(timeouts, ProxySource::System);
    let outcome = match first {
        Err(Failure::Panicked) => {
            warn!(resolver, "system proxy lookup panicked; retrying with env proxies only");
            build_guarded(timeouts, ProxySource::Environment)
        }
        other => other,
    };

    outcome.map_err(|failure| match failure {
        Failure::Panicked => {
            ResolveError::client_setup(resolver, "HTTP client construction panicked")
        }
        Failure::Build(error) => ResolveError::client_setup(
            resolver,
            &format!("HTTP client construction failed: {error}"),
        ),
    })
}

#[derive(Debug, Clone, Copy)]
enum ProxySource {
    System,
    Environment,
}

enum Failure {
    Panicked,
    Build(reqwest::Error),
}

fn build_guarded(timeouts: CatalogueTimeouts, proxies: ProxySource) -> Result<Client, Failure> {
    catch_unwind(AssertUnwindSafe(|| {
        let builder = Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.read)
            .user_agent(user_agent::default_resolver_user_agent())
            .gzip(true);
        let builder = match proxies {
            ProxySource::System => builder,
            ProxySource::Environment => with_env_proxies(builder.no_proxy()),
        };
        builder.build().map_err(Failure::Build)
    }))
    .unwrap_or(Err(Failure::Panicked))
}

fn with_env_proxies(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(proxy) = Proxy::https(&proxy)
    {
        builder = builder.proxy(proxy);
    }
    if let Some(proxy) = env_proxy(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(proxy) = Proxy::http(&proxy)
    {
        builder = builder.proxy(proxy);
    }
    builder
}

fn env_proxy(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
