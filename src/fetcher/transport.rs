use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Status and body of one completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[cfg(test)]
impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, body: body.into() }
    }
}

/// Failures below HTTP: nothing came back.
#[derive(Debug, Clone)]
pub enum TransportError {
    Timeout,
    /// DNS, refused connection, TLS handshake.
    Connect(String),
    Other(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "request timed out"),
            TransportError::Connect(detail) => write!(f, "connection failed: {detail}"),
            TransportError::Other(detail) => write!(f, "{detail}"),
        }
    }
}

/// One outbound GET. The rate gate and retry policy live above this seam.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> std::result::Result<RawResponse, TransportError>;

    /// True when requests are routed through an intermediary proxy.
    fn via_proxy(&self) -> bool {
        false
    }
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    proxy_url: Option<String>,
}

impl ReqwestTransport {
    pub fn new(proxy_url: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client, proxy_url })
    }

    fn outbound_url(&self, target: &str) -> String {
        match &self.proxy_url {
            Some(proxy) => proxied_url(proxy, target),
            None => target.to_string(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> std::result::Result<RawResponse, TransportError> {
        let outbound = self.outbound_url(url);
        let resp = self
            .client
            .get(&outbound)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(classify)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(classify)?;
        Ok(RawResponse { status, body: body.to_vec() })
    }

    fn via_proxy(&self) -> bool {
        self.proxy_url.is_some()
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

/// `https://proxy/` + `https://api/x?a=1` → `https://proxy/?target=https%3A%2F%2Fapi%2Fx%3Fa%3D1`
pub fn proxied_url(proxy: &str, target: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    let sep = if proxy.contains('?') { '&' } else { '?' };
    format!("{proxy}{sep}target={encoded}")
}

/// Replace the value of any `token` query parameter so URLs can be logged.
pub fn redact(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let query: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("token", _)) => "token=***".to_string(),
            _ => pair.to_string(),
        })
        .collect();
    format!("{base}?{}", query.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxied_url_encodes_target() {
        let url = proxied_url(
            "https://proxy.example.dev/",
            "https://api.example.com/v3/events/inplay?sport_id=1&token=abc",
        );
        assert_eq!(
            url,
            "https://proxy.example.dev/?target=https%3A%2F%2Fapi.example.com%2Fv3%2Fevents%2Finplay%3Fsport_id%3D1%26token%3Dabc"
        );
    }

    #[test]
    fn proxied_url_appends_to_existing_query() {
        let url = proxied_url("https://proxy.example.dev/?v=2", "https://a/b");
        assert!(url.starts_with("https://proxy.example.dev/?v=2&target="));
    }

    #[test]
    fn redact_hides_token_only() {
        assert_eq!(
            redact("https://api/odds?token=secret&event_id=42"),
            "https://api/odds?token=***&event_id=42"
        );
        assert_eq!(redact("https://api/odds"), "https://api/odds");
    }
}
