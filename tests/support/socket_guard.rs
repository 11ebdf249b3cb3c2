//! Mock catalogue servers for integration tests in sandboxes without loopback sockets.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_SOCKETS_VAR: &str = "BOOKSHELF_REQUIRE_SOCKET_TESTS";

fn loopback_available() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn sockets_required() -> bool {
    std::env::var(REQUIRE_SOCKETS_VAR)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Starts a mock catalogue, or returns `None` when loopback sockets are unavailable.
///
/// # Panics
///
/// Panics instead of skipping when `BOOKSHELF_REQUIRE_SOCKET_TESTS` is set.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if loopback_available() {
        return Some(MockServer::start().await);
    }
    assert!(
        !sockets_required(),
        "mock catalogue needs a loopback socket and {REQUIRE_SOCKETS_VAR} is set"
    );
    eprintln!("skipping mock catalogue test: loopback sockets unavailable");
    None
}
