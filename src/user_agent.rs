//! Default User-Agent for outbound requests.

/// Project URL included in the User-Agent (RFC 9308 identification).
const PROJECT_UA_URL: &str = "https://github.com/fierce/netbound-http";

/// User-Agent sent when a request carries none of its own.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("netbound-http/{version} (+{PROJECT_UA_URL})")
}
