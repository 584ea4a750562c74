//! HTTP request forwarding through the local outbound proxy.
//!
//! The browser extension hands over a URL, a method, optional headers and
//! a hex-encoded body; the request is replayed from this process and the
//! upstream response is returned as JSON or text.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::BridgeError;
use crate::Result;

/// Default outbound proxy (a local forward proxy).
pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:7890";
/// Default upstream request timeout.
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

/// Forwarder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardConfig {
    /// Proxy for all outbound requests; `None` connects directly.
    pub proxy: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            proxy: Some(DEFAULT_PROXY_URL.to_string()),
            timeout: DEFAULT_FORWARD_TIMEOUT,
        }
    }
}

impl ForwardConfig {
    /// Connect directly, without a proxy.
    pub fn direct() -> Self {
        Self {
            proxy: None,
            ..Self::default()
        }
    }
}

/// Supported upstream methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMethod {
    Get,
    Post,
}

impl ForwardMethod {
    /// Parse a method name, case-insensitively.
    pub fn parse(method: &str) -> Result<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            _ => Err(BridgeError::InvalidRequest("Unsupported HTTP method".into())),
        }
    }
}

/// How the upstream body is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    Json,
    #[default]
    Text,
}

impl ResponseFormat {
    /// `JSON` (any case) selects JSON; everything else is text.
    pub fn parse(format: &str) -> Self {
        if format.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// A validated request to replay upstream.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub method: ForwardMethod,
    pub body: Option<String>,
    pub headers: HashMap<String, String>,
    pub format: ResponseFormat,
}

/// Decoded upstream response body.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    Json(Value),
    Text(String),
}

/// Upstream status and body.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: UpstreamBody,
}

/// Decode a hex string into UTF-8 text.
pub fn decode_hex_body(hex: &str) -> Result<String> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return Err(BridgeError::InvalidRequest(
            "body hex has odd length".into(),
        ));
    }

    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| BridgeError::InvalidRequest("body is not valid hex".into()))
        })
        .collect::<Result<Vec<u8>>>()?;

    String::from_utf8(bytes)
        .map_err(|_| BridgeError::InvalidRequest("body is not valid UTF-8".into()))
}

/// Replays extension requests with a shared, pooled HTTP client.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    config: ForwardConfig,
}

impl Forwarder {
    /// Build a forwarder from its configuration.
    pub fn new(config: &ForwardConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);

        builder = match &config.proxy {
            Some(url) => builder.proxy(
                reqwest::Proxy::all(url)
                    .map_err(|e| BridgeError::InvalidRequest(format!("invalid proxy URL: {e}")))?,
            ),
            None => builder.no_proxy(),
        };

        let client = builder.build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Settings this forwarder was built with.
    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    /// Send a request upstream and decode the response.
    pub async fn forward(&self, request: &UpstreamRequest) -> Result<UpstreamResponse> {
        let headers = header_map(&request.headers)?;

        let builder = match request.method {
            ForwardMethod::Get => self.client.get(&request.url),
            ForwardMethod::Post => {
                let builder = self.client.post(&request.url);
                match &request.body {
                    Some(body) => builder.body(body.clone()),
                    None => builder,
                }
            }
        };

        debug!("Forwarding {:?} {}", request.method, request.url);

        let response = builder
            .headers(headers)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| {
                error!("Request failed: {}", e);
                BridgeError::from(e)
            })?;

        let status = response.status().as_u16();
        let text = response.text().await?;

        let body = match request.format {
            ResponseFormat::Json => UpstreamBody::Json(
                serde_json::from_str(&text)
                    .map_err(|_| BridgeError::Decode("Invalid JSON response".into()))?,
            ),
            ResponseFormat::Text => UpstreamBody::Text(text),
        };

        Ok(UpstreamResponse { status, body })
    }
}

/// Uses the local proxy and the default timeout.
impl Default for Forwarder {
    fn default() -> Self {
        Self::new(&ForwardConfig::default()).unwrap_or_else(|e| {
            error!("Failed to configure default proxy, forwarding directly: {}", e);
            Self {
                client: reqwest::Client::new(),
                config: ForwardConfig::direct(),
            }
        })
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| BridgeError::InvalidRequest(format!("invalid header name: {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| BridgeError::InvalidRequest(format!("invalid value for header {name}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn direct() -> Forwarder {
        Forwarder::new(&ForwardConfig::direct()).unwrap()
    }

    fn request(url: String, method: ForwardMethod, format: ResponseFormat) -> UpstreamRequest {
        UpstreamRequest {
            url,
            method,
            body: None,
            headers: HashMap::new(),
            format,
        }
    }

    #[test]
    fn test_decode_hex_body() {
        assert_eq!(decode_hex_body("7b2261223a317d").unwrap(), r#"{"a":1}"#);
        assert_eq!(decode_hex_body("").unwrap(), "");
        assert_eq!(decode_hex_body("E4BDA0").unwrap(), "你");
        assert!(decode_hex_body("abc").is_err());
        assert!(decode_hex_body("zz").is_err());
        assert!(decode_hex_body("ff").is_err());
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(ForwardMethod::parse("get").unwrap(), ForwardMethod::Get);
        assert_eq!(ForwardMethod::parse("POST").unwrap(), ForwardMethod::Post);
        assert!(matches!(
            ForwardMethod::parse("DELETE"),
            Err(BridgeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(ResponseFormat::parse("json"), ResponseFormat::Json);
        assert_eq!(ResponseFormat::parse("JSON"), ResponseFormat::Json);
        assert_eq!(ResponseFormat::parse("TEXT"), ResponseFormat::Text);
        assert_eq!(ResponseFormat::parse("html"), ResponseFormat::Text);
    }

    #[test]
    fn test_default_config_uses_local_proxy() {
        let config = ForwardConfig::default();
        assert_eq!(config.proxy.as_deref(), Some(DEFAULT_PROXY_URL));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(ForwardConfig::direct().proxy.is_none());
    }

    #[test]
    fn test_default_forwarder_uses_default_config() {
        let forwarder = Forwarder::default();
        assert_eq!(forwarder.config(), &ForwardConfig::default());
        assert_eq!(forwarder.config().proxy.as_deref(), Some(DEFAULT_PROXY_URL));
        assert_eq!(forwarder.config().timeout, DEFAULT_FORWARD_TIMEOUT);
    }

    #[tokio::test]
    async fn test_forward_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let config = ForwardConfig {
            proxy: None,
            timeout: Duration::from_millis(100),
        };
        let forwarder = Forwarder::new(&config).unwrap();
        let req = request(server.uri(), ForwardMethod::Get, ResponseFormat::Text);

        let err = forwarder.forward(&req).await.unwrap_err();
        assert!(matches!(err, BridgeError::Upstream(_)));
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let config = ForwardConfig {
            proxy: Some("http://[invalid".into()),
            ..ForwardConfig::default()
        };
        assert!(Forwarder::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_forward_get_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ticker"))
            .and(header("x-api", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"last":"42"}"#))
            .mount(&server)
            .await;

        let mut req = request(
            format!("{}/ticker", server.uri()),
            ForwardMethod::Get,
            ResponseFormat::Json,
        );
        req.headers.insert("x-api".into(), "1".into());

        let response = direct().forward(&req).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(
            response.body,
            UpstreamBody::Json(serde_json::json!({"last": "42"}))
        );
    }

    #[tokio::test]
    async fn test_forward_post_body_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .and(body_string(r#"{"a":1}"#))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .mount(&server)
            .await;

        let mut req = request(
            format!("{}/order", server.uri()),
            ForwardMethod::Post,
            ResponseFormat::Text,
        );
        req.body = Some(decode_hex_body("7b2261223a317d").unwrap());

        let response = direct().forward(&req).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.body, UpstreamBody::Text("created".into()));
    }

    #[tokio::test]
    async fn test_forward_invalid_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let req = request(server.uri(), ForwardMethod::Get, ResponseFormat::Json);
        let err = direct().forward(&req).await.unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));
        assert!(err.to_string().contains("Invalid JSON response"));
    }

    #[tokio::test]
    async fn test_forward_unreachable() {
        let req = request(
            "http://127.0.0.1:1/".into(),
            ForwardMethod::Get,
            ResponseFormat::Text,
        );
        let err = direct().forward(&req).await.unwrap_err();
        assert!(matches!(err, BridgeError::Upstream(_)));
    }
}
