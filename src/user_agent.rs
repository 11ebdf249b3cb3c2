//! User-Agent string shared by the remote metadata clients.

/// Product token sent with every remote lookup.
const PRODUCT: &str = "bookshelf";

/// Default User-Agent for resolver requests (one format for every source).
#[must_use]
pub(crate) fn default_resolver_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version} (library-organizer; metadata lookup)")
}
