//! Shared HTTP client construction. One client is built per process and is
//! internally safe for concurrent calls.
//!
//! Every component that talks to the upstream archive — the crawler's
//! listing fetches and the download engine's range GETs — goes through one
//! [`reqwest::Client`] built from [`Config`]'s user agent and timeouts.

use reqwest::Client;
use thiserror::Error;

use crate::config::Config;

/// Errors building the shared HTTP client.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// `reqwest`'s builder rejected the supplied configuration.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// Builds the process-wide [`Client`], configured per `config`'s
/// `user_agent` and `timeouts`. Redirects are followed by default, matching
/// the crawler's and transfer's requirements.
///
/// # Errors
///
/// Returns [`HttpClientError::Build`] if the underlying TLS/proxy setup
/// fails.
pub fn build(config: &Config) -> Result<Client, HttpClientError> {
    Client::builder()
        .user_agent(&config.user_agent)
        .connect_timeout(std::time::Duration::from_secs(config.timeouts.connect_s))
        .read_timeout(std::time::Duration::from_secs(config.timeouts.read_s))
        .build()
        .map_err(HttpClientError::Build)
}
