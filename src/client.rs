use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use std::env;
use std::time::{Duration, Instant};
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::types::{CompletionRequest, CompletionResponse};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/";
const COMPLETIONS_PATH: &str = "chat/completions";

/// Connect, read and write budget of a completion round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Something that can turn a [`CompletionRequest`] into a [`CompletionResponse`].
///
/// [`OpenAi`] talks to the real endpoint; tests substitute their own.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    /// Perform one completion round trip.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;
}

/// Client for the chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct OpenAi {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

impl OpenAi {
    /// Create a new client.
    ///
    /// The API key can be provided directly or read from the CONVERSO_API_KEY
    /// or OPENAI_API_KEY environment variables, in that order.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var("CONVERSO_API_KEY")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .map_err(|_| {
                    Error::authentication(
                        "API key not provided and neither CONVERSO_API_KEY nor OPENAI_API_KEY is set",
                    )
                })?,
        };
        // Validate up front so a bad key is a construction error, not a
        // failure on every request.
        HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| Error::authentication("API key contains invalid header characters"))?;

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
        })
    }

    /// The time budget applied to each request.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The URL completions are posted to.
    pub fn completions_url(&self) -> Result<Url> {
        Ok(self.base_url.join(COMPLETIONS_PATH)?)
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::authentication("API key contains invalid header characters"))?;
        bearer.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status = response.status();
        let status_code = status.as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
            param: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        let parsed_error = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = parsed_error.as_ref().and_then(|e| e.error_type.clone());
        let error_param = parsed_error.as_ref().and_then(|e| e.param.clone());
        let error_message = parsed_error
            .and_then(|e| e.message)
            .unwrap_or_else(|| {
                if error_body.trim().is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                } else {
                    error_body.clone()
                }
            });

        match status_code {
            400 => Error::bad_request(error_message, error_param),
            401 => Error::authentication(error_message),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500..=599 => Error::server(status_code, error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message),
        }
    }

    /// Send a completion request and wait for the whole reply.
    pub async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let url = self.completions_url()?;
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        tracing::debug!(url = %url, model = %request.model, messages = request.messages.len(), "sending completion request");

        let result = self.send_inner(url, request).await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        if let Err(err) = &result {
            CLIENT_REQUEST_ERRORS.click();
            tracing::warn!(
                error = %err,
                status = ?err.status_code(),
                retryable = err.is_retryable(),
                "completion request failed"
            );
        }
        result
    }

    async fn send_inner(&self, url: Url, request: &CompletionRequest) -> Result<CompletionResponse> {
        let response = self
            .client
            .post(url)
            .headers(self.default_headers()?)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        CompletionResponse::from_json(&body)
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }
}

#[async_trait::async_trait]
impl CompletionClient for OpenAi {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OpenAi::new(Some("test-key".to_string())).unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url.as_str(), DEFAULT_API_URL);
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);
        assert_eq!(
            client.completions_url().unwrap().as_str(),
            "https://api.openai.com/v1/chat/completions"
        );

        let client = OpenAi::with_options(
            Some("test-key".to_string()),
            Some("http://127.0.0.1:8080/v1".to_string()),
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        assert_eq!(
            client.completions_url().unwrap().as_str(),
            "http://127.0.0.1:8080/v1/chat/completions"
        );
        assert_eq!(client.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn default_timeout_is_twenty_seconds() {
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(20));
    }

    #[test]
    fn bearer_header() {
        let client = OpenAi::new(Some("sk-test".to_string())).unwrap();
        let headers = client.default_headers().unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer sk-test");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn rejects_unusable_key_and_url() {
        let err = OpenAi::new(Some("bad\nkey".to_string())).unwrap_err();
        assert!(err.is_authentication());

        let err = OpenAi::with_options(Some("k".to_string()), Some("not a url".to_string()), None)
            .unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
    }
}
