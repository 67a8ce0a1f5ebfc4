//! JSON-over-HTTP calls with retry and backoff, shared by the remote
//! embedding providers and generators.
//!
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors and timeouts → retry
//! - backoff: 1s, 2s, 4s, … capped at 2^5 seconds

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum HttpFailure {
    #[error("{service} API error {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} connection error: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned an unreadable response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

pub fn build_client(
    service: &'static str,
    timeout_secs: u64,
) -> Result<reqwest::Client, HttpFailure> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| HttpFailure::Transport {
            service,
            message: e.to_string(),
        })
}

/// A POST target: client, URL and optional bearer token.
pub struct Endpoint<'a> {
    pub service: &'static str,
    pub client: &'a reqwest::Client,
    pub url: &'a str,
    pub bearer: Option<&'a str>,
}

/// POST `body` and decode the JSON response, retrying transient failures.
pub async fn post_json(
    endpoint: &Endpoint<'_>,
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<serde_json::Value, HttpFailure> {
    let service = endpoint.service;
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = endpoint
            .client
            .post(endpoint.url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = endpoint.bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| HttpFailure::Decode {
                            service,
                            message: e.without_url().to_string(),
                        });
                }

                let body_text = response.text().await.unwrap_or_default();
                let failure = HttpFailure::Status {
                    service,
                    status: status.as_u16(),
                    body: body_text,
                };

                // Rate limited or server error, retry
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(service, attempt, status = status.as_u16(), "retryable API error");
                    last_err = Some(failure);
                    continue;
                }

                return Err(failure);
            }
            Err(e) => {
                // URLs may carry API keys.
                let message = e.without_url().to_string();
                warn!(service, attempt, error = %message, "API request failed");
                last_err = Some(HttpFailure::Transport { service, message });
                continue;
            }
        }
    }

    Err(last_err.unwrap_or(HttpFailure::Transport {
        service,
        message: "request failed after retries".to_string(),
    }))
}

/// Read a `[f32]` JSON array.
pub fn parse_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}
