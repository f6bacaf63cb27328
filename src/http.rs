//! HTTP client wrapper for MEGA API and content requests.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::{Client, Response};

use crate::config::{Config, DEFAULT_USER_AGENT};
use crate::error::{MegaError, Result};

/// Header carrying a proof-of-work challenge.
pub const HASHCASH_HEADER: &str = "X-Hashcash";

/// Raw answer to an API POST.
#[derive(Debug)]
pub struct ApiReply {
    /// Challenge the server wants solved before it answers.
    pub hashcash: Option<String>,
    pub body: String,
}

/// HTTP client for making requests to MEGA servers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a client with default headers and timeouts.
    pub fn new() -> Result<Self> {
        Self::from_config(&Config::default())
    }

    /// Create a client honoring proxy, timeouts, user agent, extra headers
    /// and cookies from the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let agent = if config.user_agent.is_empty() {
            DEFAULT_USER_AGENT
        } else {
            config.user_agent.as_str()
        };
        headers.insert(USER_AGENT, header_value(agent)?);

        for (name, value) in &config.extra_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| MegaError::Config(format!("Invalid header name '{}': {}", name, e)))?;
            headers.insert(name, header_value(value)?);
        }

        if !config.extra_cookies.is_empty() {
            let cookie = config
                .extra_cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; ");
            headers.insert(COOKIE, header_value(&cookie)?);
        }

        let mut builder = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs));

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| MegaError::Config(format!("Invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| MegaError::Config(format!("Failed to build client: {}", e)))?;

        Ok(Self { client })
    }

    /// POST a JSON body, optionally answering a hashcash challenge.
    ///
    /// A reply carrying a challenge header is returned regardless of status.
    pub async fn post_json(&self, url: &str, body: &str, hashcash: Option<&str>) -> Result<ApiReply> {
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string());
        if let Some(answer) = hashcash {
            request = request.header(HASHCASH_HEADER, answer);
        }

        let response = request.send().await?;

        let challenge = response
            .headers()
            .get(HASHCASH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if challenge.is_some() {
            return Ok(ApiReply {
                hashcash: challenge,
                body: String::new(),
            });
        }

        if !response.status().is_success() {
            return Err(MegaError::HttpError(response.status().as_u16()));
        }

        Ok(ApiReply {
            hashcash: None,
            body: response.text().await?,
        })
    }

    /// GET a content URL; the body is left unread for streaming.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(MegaError::HttpError(response.status().as_u16()));
        }
        Ok(response)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| MegaError::Config(format!("Invalid header value '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(HttpClient::new().is_ok());
    }

    #[test]
    fn test_proxy_creation() {
        let config = Config {
            proxy: Some("socks5://127.0.0.1:1080".to_string()),
            ..Config::default()
        };
        assert!(HttpClient::from_config(&config).is_ok());
    }

    #[test]
    fn test_extra_headers_and_cookies() {
        let mut config = Config::default();
        config
            .extra_headers
            .insert("X-Test".to_string(), "1".to_string());
        config
            .extra_cookies
            .insert("session".to_string(), "abc".to_string());
        assert!(HttpClient::from_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_header_name() {
        let mut config = Config::default();
        config
            .extra_headers
            .insert("bad header".to_string(), "1".to_string());
        assert!(matches!(
            HttpClient::from_config(&config),
            Err(MegaError::Config(_))
        ));
    }
}
