//! Proxy gateway client for plugin network access.
//!
//! Plugins never hold raw credentials. An outbound call names a
//! `service_id`; the backend proxy endpoint resolves the stored
//! credential, attaches it, and forwards the call. This module is the
//! trust boundary: plugin code is otherwise unaudited and arbitrary,
//! so no credential is ever observable by a plugin except a value the
//! plugin itself just submitted for storage.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// JSON envelope for a proxied request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub service_id: String,
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// Response returned to the plugin. Failures are folded into
/// `success: false` — nothing on this path is a thrown error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GatewayResponse {
    /// A successful response carrying the proxied payload.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed response carrying the reason.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Client for the backend proxy endpoints.
pub struct ProxyGatewayClient {
    client: reqwest::Client,
    base_url: String,
}

impl ProxyGatewayClient {
    /// Create a gateway client for a backend base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: trim_trailing_slash(base_url.into()),
        }
    }

    /// Forward a request through the proxy.
    ///
    /// The caller never holds the raw credential; the backend resolves
    /// `service_id` and attaches it. Any non-2xx status or network
    /// failure yields `success: false`, never an `Err` across the
    /// plugin boundary.
    pub async fn request(&self, request: ProxyRequest) -> GatewayResponse {
        match self.try_request(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "proxy request failed");
                GatewayResponse::fail(e.to_string())
            }
        }
    }

    async fn try_request(&self, request: ProxyRequest) -> Result<GatewayResponse, GatewayError> {
        // Reject malformed methods before they reach the wire.
        reqwest::Method::from_str(&request.method)
            .map_err(|_| GatewayError::InvalidMethod(request.method.clone()))?;

        let response = self
            .client
            .post(format!("{}/api/proxy", self.base_url))
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: serde_json::Value = response.json().await?;
        Ok(GatewayResponse::ok(data))
    }

    /// Upload a file through the proxy using a multipart envelope:
    /// file + `service_id` + `url` + `extra_fields` (JSON string) +
    /// `file_field_name`.
    pub async fn upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        service_id: &str,
        url: &str,
        extra_fields: &serde_json::Map<String, serde_json::Value>,
        file_field_name: &str,
    ) -> GatewayResponse {
        match self
            .try_upload(file_name, bytes, service_id, url, extra_fields, file_field_name)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "proxy upload failed");
                GatewayResponse::fail(e.to_string())
            }
        }
    }

    async fn try_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        service_id: &str,
        url: &str,
        extra_fields: &serde_json::Map<String, serde_json::Value>,
        file_field_name: &str,
    ) -> Result<GatewayResponse, GatewayError> {
        let mime = mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .to_string();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(&mime)
            .map_err(GatewayError::Http)?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("service_id", service_id.to_string())
            .text("url", url.to_string())
            .text(
                "extra_fields",
                serde_json::Value::Object(extra_fields.clone()).to_string(),
            )
            .text("file_field_name", file_field_name.to_string());

        let response = self
            .client
            .post(format!("{}/api/proxy/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: serde_json::Value = response.json().await?;
        Ok(GatewayResponse::ok(data))
    }

    /// Submit a credential for server-side storage under a service id.
    ///
    /// This is the one moment plugin-submitted credential material
    /// passes through the client; it is wrapped in `SecretString` so
    /// it never appears in debug output or logs.
    pub async fn register_service(
        &self,
        service_id: &str,
        credential: SecretString,
    ) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(format!("{}/api/proxy/services", self.base_url))
            .json(&serde_json::json!({
                "service_id": service_id,
                "credential": credential.expose_secret(),
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

fn trim_trailing_slash(mut s: String) -> String {
    while s.ends_with('/') {
        s.pop();
    }
    s
}

// ---------------------------------------------------------------------------
// URL scoping
// ---------------------------------------------------------------------------

/// Validate that a plugin-supplied URL is safe to route through a
/// proxy service.
/// - Must be http:// or https://
/// - Must match one of the service's allowed patterns, when declared
pub fn validate_service_url(url: &str, allowed_urls: &[String]) -> Result<(), String> {
    let parsed = url::Url::parse(url).map_err(|e| format!("Invalid URL: {e}"))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(format!("Scheme \"{scheme}\" is not allowed; use http or https")),
    }

    if allowed_urls.is_empty() {
        return Ok(());
    }

    if allowed_urls
        .iter()
        .any(|pattern| url_matches_pattern(url, pattern))
    {
        return Ok(());
    }

    Err(format!("URL \"{url}\" does not match any allowed URL pattern"))
}

/// Check if a URL matches a pattern: a URL prefix, optionally ending
/// with `*` for a wildcard suffix.
fn url_matches_pattern(url: &str, pattern: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        url.starts_with(prefix)
    } else {
        url == pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Envelope shapes ---

    #[test]
    fn test_proxy_request_serialized_shape() {
        let req = ProxyRequest {
            service_id: "brave-api".to_string(),
            url: "https://api.search.brave.com/res/v1/web/search?q=rust".to_string(),
            method: "GET".to_string(),
            headers: HashMap::from([("Accept".to_string(), "application/json".to_string())]),
            body: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["service_id"], "brave-api");
        assert_eq!(json["method"], "GET");
        assert!(json.get("body").is_none(), "absent body is omitted");
    }

    #[test]
    fn test_proxy_request_deserializes_with_defaults() {
        let req: ProxyRequest = serde_json::from_str(
            r#"{"service_id": "s", "url": "https://x.test", "method": "POST"}"#,
        )
        .unwrap();
        assert!(req.headers.is_empty());
        assert!(req.body.is_none());
    }

    #[test]
    fn test_gateway_response_roundtrip() {
        let ok = GatewayResponse::ok(serde_json::json!({"n": 1}));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["n"], 1);
        assert!(json.get("error").is_none());

        let fail = GatewayResponse::fail("nope");
        let json = serde_json::to_value(&fail).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "nope");
    }

    // --- Method validation ---

    #[tokio::test]
    async fn test_invalid_method_yields_failed_response() {
        let client = ProxyGatewayClient::new("http://localhost:1");
        let response = client
            .request(ProxyRequest {
                service_id: "s".to_string(),
                url: "https://x.test".to_string(),
                method: "not a method".to_string(),
                headers: HashMap::new(),
                body: None,
            })
            .await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("not a method"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_yields_failed_response_not_err() {
        // Port 1 is essentially never listening; the point is that the
        // failure comes back as a response, not a panic or Err.
        let client = ProxyGatewayClient::new("http://127.0.0.1:1");
        let response = client
            .request(ProxyRequest {
                service_id: "s".to_string(),
                url: "https://x.test".to_string(),
                method: "GET".to_string(),
                headers: HashMap::new(),
                body: None,
            })
            .await;
        assert!(!response.success);
        assert!(response.error.is_some());
    }

    // --- Base URL normalization ---

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(
            trim_trailing_slash("http://localhost:51111/".to_string()),
            "http://localhost:51111"
        );
        assert_eq!(
            trim_trailing_slash("http://localhost:51111".to_string()),
            "http://localhost:51111"
        );
    }

    // --- URL scoping ---

    #[test]
    fn test_validate_allows_https() {
        assert!(validate_service_url("https://api.example.com/data", &[]).is_ok());
    }

    #[test]
    fn test_validate_blocks_file_scheme() {
        let result = validate_service_url("file:///etc/passwd", &[]);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("not allowed"));
    }

    #[test]
    fn test_validate_enforces_allowed_patterns() {
        let allowed = vec!["https://api.search.brave.com/*".to_string()];
        assert!(
            validate_service_url("https://api.search.brave.com/res/v1/web/search", &allowed)
                .is_ok()
        );
        assert!(validate_service_url("https://evil.test/steal", &allowed).is_err());
    }

    #[test]
    fn test_pattern_exact_and_wildcard() {
        assert!(url_matches_pattern(
            "https://example.com/api/v1",
            "https://example.com/api/v1"
        ));
        assert!(!url_matches_pattern(
            "https://example.com/api/v2",
            "https://example.com/api/v1"
        ));
        assert!(url_matches_pattern(
            "https://example.com/api/v2/deep",
            "https://example.com/api/*"
        ));
    }
}
