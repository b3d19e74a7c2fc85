//! Shared User-Agent string for listing and transfer HTTP clients.
//!
//! Single source for project URL and UA format so listing and file traffic
//! stay consistent and easy to update.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/etsi-sync";

/// Default User-Agent for every request the mirror issues.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("etsi-sync/{version} (document-mirror; +{PROJECT_UA_URL})")
}
