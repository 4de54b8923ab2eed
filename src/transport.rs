//! HTTP transport for form submissions.
//!
//! Both flows issue exactly one form-encoded POST per attempt and expect a JSON
//! body back. [`Transport`] is that single operation; [`HttpTransport`] performs
//! it with `reqwest`.

use std::future::Future;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::error::{EnrollError, Result};
use crate::protocol::FormFields;

/// User-Agent string for HTTP requests.
pub const USER_AGENT: &str = concat!("ca-enroll/", env!("CARGO_PKG_VERSION"));

/// One asynchronous form POST returning a JSON document.
pub trait Transport {
    fn post_form(
        &self,
        url: &Url,
        fields: &FormFields,
    ) -> impl Future<Output = Result<Value>> + Send;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport. Without a timeout a request waits indefinitely.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
        })
    }
}

impl Transport for HttpTransport {
    async fn post_form(&self, url: &Url, fields: &FormFields) -> Result<Value> {
        debug!(%url, fields = fields.len(), "POST");
        let response = self
            .http
            .post(url.clone())
            .header(ACCEPT, "application/json")
            .form(fields)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrollError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| EnrollError::Malformed(e.to_string()))
    }
}

/// Resolve a form action or endpoint path against the site base URL.
///
/// Absolute targets are returned unchanged.
pub fn resolve_url(base: &Url, target: &str) -> Result<Url> {
    base.join(target).map_err(|e| EnrollError::Url {
        target: target.to_string(),
        reason: e.to_string(),
    })
}

/// Parse an absolute base URL.
pub fn parse_base_url(base: &str) -> Result<Url> {
    Url::parse(base).map_err(|e| EnrollError::Url {
        target: base.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_and_absolute() {
        let base = parse_base_url("https://nm.example.org/sub/").unwrap();
        assert_eq!(
            resolve_url(&base, "/certs/enroll").unwrap().as_str(),
            "https://nm.example.org/certs/enroll"
        );
        assert_eq!(
            resolve_url(&base, "register").unwrap().as_str(),
            "https://nm.example.org/sub/register"
        );
        assert_eq!(
            resolve_url(&base, "http://other.test/x").unwrap().as_str(),
            "http://other.test/x"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = parse_base_url("not a url").unwrap_err();
        assert!(matches!(err, EnrollError::Url { .. }));
    }

    #[test]
    fn test_user_agent() {
        assert!(USER_AGENT.starts_with("ca-enroll/"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Port 9 (discard) is not expected to accept HTTP on loopback
        let transport = HttpTransport::new(Some(Duration::from_secs(5))).unwrap();
        let url = parse_base_url("http://127.0.0.1:9/register").unwrap();
        let err = transport
            .post_form(&url, &FormFields::new())
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
