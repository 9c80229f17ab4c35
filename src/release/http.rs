//! Shared HTTP client setup and status classification.

use super::ResolverOptions;
use crate::core::{LauncherError, Result};
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use std::time::Duration;
use tracing::warn;

const USER_AGENT: &str = concat!("launchkit/", env!("CARGO_PKG_VERSION"));

/// `Accept` value that makes the release API answer with the asset bytes.
pub(crate) const OCTET_STREAM: &str = "application/octet-stream";

pub(crate) fn build_client(options: &ResolverOptions) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(options.connect_timeout)
        .read_timeout(options.read_timeout)
        .build()
        .map_err(|e| LauncherError::network("building HTTP client", e))
}

/// Map a non-success response onto the error taxonomy.
///
/// `what` names the thing requested, for `NotFound` messages.
pub(crate) fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(LauncherError::NotFound {
            what: what.to_string(),
        });
    }

    if is_rate_limited(status, response.headers()) {
        let retry_after = retry_after(response.headers());
        warn!("Rate limited while requesting {} (retry after {:?})", what, retry_after);
        return Err(LauncherError::RateLimited {
            retry_after,
        });
    }

    Err(LauncherError::network(format!("requesting {what}"), format!("HTTP {status}")))
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    // GitHub reports an exhausted quota as 403 with remaining = 0
    status == StatusCode::FORBIDDEN
        && (header_str(headers, "x-ratelimit-remaining") == Some("0")
            || headers.contains_key("retry-after"))
}

/// Retry hint from `Retry-After` (seconds) or `X-RateLimit-Reset` (epoch seconds).
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    if let Some(seconds) = header_str(headers, "retry-after").and_then(|v| v.trim().parse::<f64>().ok())
        && let Ok(hint) = Duration::try_from_secs_f64(seconds)
    {
        return Some(hint);
    }

    let reset = header_str(headers, "x-ratelimit-reset")?.trim().parse::<i64>().ok()?;
    let now = chrono::Utc::now().timestamp();
    Some(Duration::from_secs(reset.saturating_sub(now).max(0) as u64))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
