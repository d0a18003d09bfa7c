//! HTTP Client Factory
//!
//! Builds reqwest clients with optional proxy support.

use std::time::Duration;

use crate::types::{LlmError, LlmResult};

/// Upper bound on one HTTP round trip to a provider.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Build a `reqwest::Client` for the given proxy URL.
///
/// - `Some(url)` -> route every request through the proxy
/// - `None` -> explicitly disable proxy (`no_proxy`), ignoring env vars
pub fn build_http_client(proxy: Option<&str>) -> LlmResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
    match proxy {
        Some(url) => {
            let p = reqwest::Proxy::all(url).map_err(|e| LlmError::InvalidRequest {
                message: format!("invalid proxy URL {}: {}", url, e),
            })?;
            builder = builder.proxy(p);
        }
        None => {
            builder = builder.no_proxy();
        }
    }
    builder.build().map_err(|e| LlmError::Other {
        message: format!("failed to build HTTP client: {}", e),
    })
}
