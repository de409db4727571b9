use async_trait::async_trait;
use std::time::Duration;

use crate::domain::DomainError;

/// Trait for HTTP client operations (for mocking)
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    /// POST a JSON body and parse the JSON answer.
    ///
    /// Network errors, timeouts, HTTP 429 and 5xx come back as
    /// `DomainError::Unavailable`; other failures as `DomainError::Provider`.
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DomainError>;
}

/// Real HTTP client using reqwest
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether an HTTP status is worth retrying
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DomainError> {
        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.json(body).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                DomainError::unavailable("http", format!("Request failed: {}", e))
            } else {
                DomainError::provider("http", format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status, error_body);
            return Err(if is_transient_status(status.as_u16()) {
                DomainError::unavailable("http", message)
            } else {
                DomainError::provider("http", message)
            });
        }

        response
            .json()
            .await
            .map_err(|e| DomainError::provider("http", format!("Failed to parse response: {}", e)))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_transient_status() {
        assert!(is_transient_status(500));
        assert!(is_transient_status(503));
        assert!(is_transient_status(429));
        assert!(!is_transient_status(400));
        assert!(!is_transient_status(404));
    }

    #[tokio::test]
    async fn test_post_json_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(header("x-test", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let result = client
            .post_json(&format!("{}/echo", server.uri()), vec![("x-test", "1")], &json!({}))
            .await
            .unwrap();
        assert_eq!(result, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_post_json_classifies_errors() {
        let server = MockServer::start().await;
        Mock::given(path("/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(path("/bad"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let busy = client
            .post_json(&format!("{}/busy", server.uri()), vec![], &json!({}))
            .await
            .unwrap_err();
        assert!(busy.is_transient());

        let bad = client
            .post_json(&format!("{}/bad", server.uri()), vec![], &json!({}))
            .await
            .unwrap_err();
        assert!(!bad.is_transient());
        assert!(bad.to_string().contains("bad model"));
    }
}
