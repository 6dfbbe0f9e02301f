use crate::errors::AppError;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Registry of outbound HTTP clients, keyed by base URL.
///
/// Each upstream keeps one connection-pooling client with its own timeout.
/// The registry is owned by `AppState` and passed into connectors explicitly;
/// `clear()` drops every client, which is the teardown contract tests rely on.
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, reqwest::Client>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the client for `base_url`, building one with the given timeout
    /// on first use.
    pub fn client_for(
        &self,
        base_url: &str,
        timeout: Duration,
    ) -> Result<reqwest::Client, AppError> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| AppError::InternalError("Client registry lock poisoned".to_string()))?;

        if let Some(client) = clients.get(base_url) {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("plot-enrichment-api/0.1")
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to build HTTP client: {}", e))
            })?;

        clients.insert(base_url.to_string(), client.clone());
        Ok(client)
    }

    /// Drops every cached client.
    pub fn clear(&self) {
        if let Ok(mut clients) = self.clients.lock() {
            clients.clear();
        }
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff schedule for upstream retries. The attempt count is the table
/// length; delays are applied after the first failure.
pub const BACKOFF_DELAYS_MS: [u64; 3] = [500, 1_000, 2_000];

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

/// GET a JSON resource with bounded retry.
///
/// Retries transport failures, 5xx and 429 responses following
/// `BACKOFF_DELAYS_MS`; other non-success statuses fail immediately. The
/// final failure is reported as `ExternalApiError` — legitimate "no feature
/// here" responses are 200s with empty bodies and are the caller's business.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: reqwest::Url,
    label: &str,
) -> Result<T, AppError> {
    let mut last_error = String::new();

    for (attempt, delay_ms) in BACKOFF_DELAYS_MS.iter().enumerate() {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
        }

        match client.get(url.clone()).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response.json::<T>().await.map_err(|e| {
                        AppError::ExternalApiError(format!(
                            "Failed to parse {} response: {}",
                            label, e
                        ))
                    });
                }
                let body = response.text().await.unwrap_or_default();
                last_error = format!("{} returned status {}: {}", label, status, body);
                if !is_retryable_status(status) {
                    break;
                }
                tracing::warn!(
                    "{} attempt {} failed with {}, retrying",
                    label,
                    attempt + 1,
                    status
                );
            }
            Err(e) => {
                last_error = format!("{} request failed: {}", label, e);
                tracing::warn!("{} attempt {} failed: {}", label, attempt + 1, e);
            }
        }
    }

    Err(AppError::ExternalApiError(last_error))
}

/// POST a form body (Overpass QL goes up as `data=<query>`) with bounded retry.
pub async fn post_form<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: reqwest::Url,
    form: &[(&str, &str)],
    label: &str,
) -> Result<T, AppError> {
    let mut last_error = String::new();

    for (attempt, delay_ms) in BACKOFF_DELAYS_MS.iter().enumerate() {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
        }

        match client.post(url.clone()).form(form).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response.json::<T>().await.map_err(|e| {
                        AppError::ExternalApiError(format!(
                            "Failed to parse {} response: {}",
                            label, e
                        ))
                    });
                }
                let body = response.text().await.unwrap_or_default();
                last_error = format!("{} returned status {}: {}", label, status, body);
                if !is_retryable_status(status) {
                    break;
                }
                tracing::warn!(
                    "{} attempt {} failed with {}, retrying",
                    label,
                    attempt + 1,
                    status
                );
            }
            Err(e) => {
                last_error = format!("{} request failed: {}", label, e);
                tracing::warn!("{} attempt {} failed: {}", label, attempt + 1, e);
            }
        }
    }

    Err(AppError::ExternalApiError(last_error))
}

/// POST a JSON body with bounded retry (Open-Elevation bulk lookups).
pub async fn post_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: reqwest::Url,
    body: &serde_json::Value,
    label: &str,
) -> Result<T, AppError> {
    let mut last_error = String::new();

    for (attempt, delay_ms) in BACKOFF_DELAYS_MS.iter().enumerate() {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
        }

        match client.post(url.clone()).json(body).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response.json::<T>().await.map_err(|e| {
                        AppError::ExternalApiError(format!(
                            "Failed to parse {} response: {}",
                            label, e
                        ))
                    });
                }
                let text = response.text().await.unwrap_or_default();
                last_error = format!("{} returned status {}: {}", label, status, text);
                if !is_retryable_status(status) {
                    break;
                }
                tracing::warn!(
                    "{} attempt {} failed with {}, retrying",
                    label,
                    attempt + 1,
                    status
                );
            }
            Err(e) => {
                last_error = format!("{} request failed: {}", label, e);
                tracing::warn!("{} attempt {} failed: {}", label, attempt + 1, e);
            }
        }
    }

    Err(AppError::ExternalApiError(last_error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_reuses_clients_per_base_url() {
        let registry = ClientRegistry::new();
        let a = registry
            .client_for("https://example.org", Duration::from_secs(5))
            .unwrap();
        let b = registry
            .client_for("https://example.org", Duration::from_secs(30))
            .unwrap();
        // Second call returns the cached client; the differing timeout is ignored.
        drop((a, b));
        let clients = registry.clients.lock().unwrap();
        assert_eq!(clients.len(), 1);
    }

    #[test]
    fn registry_clear_drops_clients() {
        let registry = ClientRegistry::new();
        registry
            .client_for("https://example.org", Duration::from_secs(5))
            .unwrap();
        registry.clear();
        assert!(registry.clients.lock().unwrap().is_empty());
    }

    #[test]
    fn backoff_table_is_increasing() {
        for pair in BACKOFF_DELAYS_MS.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
