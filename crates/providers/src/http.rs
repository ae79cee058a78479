//! Shared HTTP response handling for all vendors.

use extforge_core::error::ProviderError;
use tracing::warn;

const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Build the HTTP client shared by one adapter.
pub(crate) fn client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map a transport failure.
pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// Map a vendor HTTP response to its JSON body or a `ProviderError`.
pub(crate) async fn read_json(
    response: reqwest::Response,
    vendor: &str,
) -> Result<serde_json::Value, ProviderError> {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;

    classify(status, &text, retry_after, vendor)
}

/// Status/body classification, separated from I/O for testing.
pub(crate) fn classify(
    status: u16,
    text: &str,
    retry_after: Option<u64>,
    vendor: &str,
) -> Result<serde_json::Value, ProviderError> {
    let parsed: Option<serde_json::Value> = serde_json::from_str(text).ok();

    if status == 429 {
        return Err(ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        });
    }

    if status == 401 || status == 403 {
        let detail = parsed.as_ref().and_then(error_message);
        return Err(ProviderError::AuthenticationFailed(detail.unwrap_or_else(|| {
            format!("Invalid {vendor} API key or insufficient permissions")
        })));
    }

    if !(200..300).contains(&status) {
        warn!(vendor, status, body = %text, "Provider returned error");
        let message = parsed
            .as_ref()
            .and_then(error_message)
            .unwrap_or_else(|| text.to_string());
        return Err(ProviderError::ApiError {
            status_code: status,
            message,
            raw: parsed,
        });
    }

    let Some(body) = parsed else {
        return Err(ProviderError::ApiError {
            status_code: status,
            message: format!("Failed to parse {vendor} response"),
            raw: Some(serde_json::Value::String(text.to_string())),
        });
    };

    // Some gateways answer 200 with an error envelope
    if body.get("error").is_some_and(|e| !e.is_null()) {
        let message = error_message(&body).unwrap_or_else(|| "Unknown provider error".into());
        return Err(ProviderError::ApiError {
            status_code: status,
            message,
            raw: Some(body),
        });
    }

    Ok(body)
}

/// Pull a readable message out of the common vendor error envelopes.
fn error_message(body: &serde_json::Value) -> Option<String> {
    let error = body.get("error").unwrap_or(body);
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.as_str())
        .map(str::to_string)
}
