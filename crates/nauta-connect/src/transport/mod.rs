//! Resilient HTTP transport for portal requests.
//!
//! The session engine only ever talks to a [`Transport`]. The production
//! implementation is [`HttpTransport`]; tests substitute scripted doubles.

pub mod cookies;
pub mod http;
pub mod retry;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::types::{Failure, HttpOutcome, PortalResult};

pub use cookies::CookieJar;
pub use http::HttpTransport;
pub use retry::{RetryContext, RetryPolicy};

/// HTTP methods the portal flow uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` pairs, sent in order.
    Form(Vec<(String, String)>),
    /// `application/json` document.
    Json(serde_json::Value),
}

impl RequestBody {
    pub fn form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        RequestBody::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn json<T: Serialize>(value: &T) -> PortalResult<Self> {
        serde_json::to_value(value).map(RequestBody::Json).map_err(|e| {
            Failure::unexpected_response("Invalid JSON body").with_details(e.to_string())
        })
    }

    /// Value of a form field, if this is a form body containing it.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        match self {
            RequestBody::Form(pairs) => pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            RequestBody::Json(_) => None,
        }
    }

    /// Names of the form fields, in send order.
    pub fn form_keys(&self) -> Vec<&str> {
        match self {
            RequestBody::Form(pairs) => pairs.iter().map(|(k, _)| k.as_str()).collect(),
            RequestBody::Json(_) => Vec::new(),
        }
    }
}

/// Per-request headers, filled in by a configuration callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderConfig {
    referer: Option<String>,
    user_agent: Option<String>,
    extra: Vec<(String, String)>,
}

impl HeaderConfig {
    pub fn referer(&mut self, value: impl Into<String>) -> &mut Self {
        self.referer = Some(value.into());
        self
    }

    pub fn user_agent(&mut self, value: impl Into<String>) -> &mut Self {
        self.user_agent = Some(value.into());
        self
    }

    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    /// Every header to send, `Referer` and `User-Agent` included.
    pub fn all(&self) -> Vec<(&str, &str)> {
        let mut headers = Vec::with_capacity(self.extra.len() + 2);
        if let Some(referer) = &self.referer {
            headers.push(("Referer", referer.as_str()));
        }
        if let Some(ua) = &self.user_agent {
            headers.push(("User-Agent", ua.as_str()));
        }
        headers.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        headers
    }

    /// Value of the first header named `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.all()
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

/// One logical request, before retries.
#[derive(Debug, Clone)]
pub struct PortalRequest {
    pub method: Method,
    /// Absolute, or relative to the transport's portal base URL.
    pub url: String,
    pub body: Option<RequestBody>,
    pub headers: HeaderConfig,
}

impl PortalRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            headers: HeaderConfig::default(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Run a header-configuration callback against this request.
    pub fn configure(mut self, config: impl FnOnce(&mut HeaderConfig)) -> Self {
        config(&mut self.headers);
        self
    }
}

/// Sends portal requests, applying retry, cookie, and failure policy.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`, retrying transient failures.
    ///
    /// Resolves to the 2xx outcome, or to a [`Failure`](crate::Failure)
    /// classified at this boundary. Signalling `cancel` aborts in-flight
    /// requests and pending backoff sleeps.
    async fn send(
        &self,
        request: PortalRequest,
        cancel: &CancellationToken,
    ) -> PortalResult<HttpOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FailureKind;

    #[test]
    fn test_configure_callback_sets_headers() {
        let request = PortalRequest::post("/LoginServlet").configure(|h| {
            h.referer("https://portal/").header("Origin", "https://portal");
        });

        assert_eq!(request.headers.get("referer"), Some("https://portal/"));
        assert_eq!(request.headers.get("Origin"), Some("https://portal"));
        assert_eq!(request.headers.get("User-Agent"), None);
    }

    #[test]
    fn test_form_body_lookup() {
        let body = RequestBody::form([("op", "getLeftTime"), ("CSRFHW", "abc")]);
        assert_eq!(body.form_value("op"), Some("getLeftTime"));
        assert_eq!(body.form_keys(), vec!["op", "CSRFHW"]);
        assert_eq!(body.form_value("password"), None);
    }

    #[test]
    fn test_json_body() {
        let body = RequestBody::json(&serde_json::json!({ "a": 1 })).unwrap();
        assert_eq!(body, RequestBody::Json(serde_json::json!({ "a": 1 })));
        assert_eq!(body.form_value("a"), None);
    }

    #[test]
    fn test_unserializable_json_body() {
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "pair keys");

        let err = RequestBody::json(&map).unwrap_err();
        assert_eq!(err.kind, FailureKind::UnexpectedResponse);
        assert_eq!(err.message, "Invalid JSON body");
        assert!(!err.details.is_empty());
    }
}
