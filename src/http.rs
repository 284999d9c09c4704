//! Shared JSON-over-HTTP plumbing for service providers.
//!
//! Maps transport and status failures onto [`ServiceErrorKind`] so the
//! retry policy can decide what to retry:
//!
//! | Failure | Kind |
//! |---------|------|
//! | request timed out | `Timeout` |
//! | connection / network error | `ServiceUnavailable` |
//! | HTTP 429 | `RateLimited` |
//! | HTTP 408 | `Timeout` |
//! | HTTP 5xx | `ServiceUnavailable` |
//! | other HTTP 4xx | `Rejected` |
//! | body is not the expected JSON | `MalformedResponse` |

use std::time::Duration;

use anyhow::Result;
use nestie_core::error::{Error, ServiceErrorKind};

/// Build a client with a per-request timeout.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send `request`, returning the decoded JSON body of a 2xx response.
///
/// `service` names the provider in error messages and `make_err` builds the
/// typed error (e.g. [`Error::embedding`]).
pub async fn send_json<F>(
    request: reqwest::RequestBuilder,
    service: &str,
    make_err: F,
) -> Result<serde_json::Value, Error>
where
    F: Fn(ServiceErrorKind, String) -> Error,
{
    let response = request.send().await.map_err(|e| {
        let kind = if e.is_timeout() {
            ServiceErrorKind::Timeout
        } else {
            ServiceErrorKind::ServiceUnavailable
        };
        make_err(kind, format!("{} request failed: {}", service, e))
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(make_err(
            ServiceErrorKind::from_status(status.as_u16()),
            format!("{} API error {}: {}", service, status, truncate(&body, 300)),
        ));
    }

    response.json::<serde_json::Value>().await.map_err(|e| {
        make_err(
            ServiceErrorKind::MalformedResponse,
            format!("{} returned invalid JSON: {}", service, e),
        )
    })
}

/// Parse a JSON array of numbers into a vector.
pub fn parse_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
