use crate::domain::gateway::{Credentials, GatewayError};
use crate::domain::ports::PaymentGateway;
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::error;

pub const DEFAULT_API_BASE: &str = "https://api.razorpay.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin typed shim over the gateway's REST API, built on reqwest.
///
/// Every call authenticates with HTTP basic auth and is bounded by the client timeout.
/// No retries happen here.
pub struct RazorpayClient {
    http: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    code: Option<String>,
    description: Option<String>,
}

impl RazorpayClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReconcileError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn read_response(
        resp: reqwest::Response,
        context: &str,
    ) -> std::result::Result<Value, GatewayError> {
        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            GatewayError::Gateway(format!("failed to read response body for {context}: {e}"))
        })?;

        if !status.is_success() {
            let failure = classify_failure(status, &body);
            error!(
                status = %status,
                context = %context,
                error = %failure,
                "razorpay api request failed"
            );
            return Err(failure);
        }

        serde_json::from_str(&body).map_err(|e| {
            GatewayError::Gateway(format!("malformed response for {context}: {e}"))
        })
    }
}

/// Maps a non-success HTTP response onto the gateway error taxonomy.
pub fn classify_failure(status: StatusCode, body: &str) -> GatewayError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => match (error.code, error.description) {
            (Some(code), Some(description)) => format!("{code}: {description}"),
            (None, Some(description)) => description,
            (Some(code), None) => code,
            (None, None) => status.to_string(),
        },
        Err(_) => status.to_string(),
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Authentication(message),
        s if s.is_client_error() => GatewayError::InvalidRequest(message),
        _ => GatewayError::Gateway(message),
    }
}

fn transport_error(context: &str, e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Gateway(format!("{context} timed out"))
    } else {
        GatewayError::Gateway(format!("{context} failed: {e}"))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn fetch(
        &self,
        path: &str,
        credentials: &Credentials,
    ) -> std::result::Result<Value, GatewayError> {
        let context = format!("GET {path}");
        let resp = self
            .http
            .get(self.url(path))
            .basic_auth(&credentials.api_key, Some(credentials.api_secret()))
            .send()
            .await
            .map_err(|e| transport_error(&context, e))?;
        Self::read_response(resp, &context).await
    }

    async fn submit(
        &self,
        path: &str,
        payload: Value,
        credentials: &Credentials,
    ) -> std::result::Result<Value, GatewayError> {
        let context = format!("POST {path}");
        let resp = self
            .http
            .post(self.url(path))
            .basic_auth(&credentials.api_key, Some(credentials.api_secret()))
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(&context, e))?;
        Self::read_response(resp, &context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_is_authentication_error() {
        let body = r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"Authentication failed"}}"#;
        assert_eq!(
            classify_failure(StatusCode::UNAUTHORIZED, body),
            GatewayError::Authentication("BAD_REQUEST_ERROR: Authentication failed".into())
        );
    }

    #[test]
    fn test_bad_request_is_invalid_request() {
        let body = r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"This payment has already been captured"}}"#;
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, body),
            GatewayError::InvalidRequest(msg) if msg.contains("already been captured")
        ));
    }

    #[test]
    fn test_server_error_without_envelope() {
        let failure = classify_failure(StatusCode::BAD_GATEWAY, "<html>upstream</html>");
        assert_eq!(failure, GatewayError::Gateway("502 Bad Gateway".into()));
        assert!(failure.is_retryable());
    }

    #[test]
    fn test_url_joins_base_and_path() {
        let client = RazorpayClient::new("http://localhost:9000/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(
            client.url("/v1/payments/pay_1"),
            "http://localhost:9000/v1/payments/pay_1"
        );
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_gateway_error() {
        // Port 9 (discard) on localhost is not expected to accept HTTP connections.
        let client = RazorpayClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let creds = Credentials::new("rzp_test_key", "secret");

        let result = client.fetch("/v1/payments/pay_1", &creds).await;
        assert!(matches!(result, Err(GatewayError::Gateway(_))));
    }
}
