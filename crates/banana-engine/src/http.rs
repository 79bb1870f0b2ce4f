//! Shared HTTP client factory and the timeouts each call class runs under.

use std::time::Duration;

use reqwest::blocking::Client;

/// Generation POST. Image models routinely take minutes.
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Fetching a provider-hosted image after extraction.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

pub const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Some image CDNs reject requests without a browser-like agent.
pub const DOWNLOAD_USER_AGENT: &str = "Mozilla/5.0";

/// Blocking client without a global timeout; each request sets its own.
pub fn create_client() -> reqwest::Result<Client> {
    Client::builder().build()
}
