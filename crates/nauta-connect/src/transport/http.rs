//! reqwest-backed [`Transport`] with bounded retry and failure classification.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{CookieJar, Method, PortalRequest, RequestBody, RetryContext, RetryPolicy, Transport};
use crate::config::PortalConfig;
use crate::events::{EventBus, PortalEvent, RetryNotice};
use crate::types::{Failure, HttpOutcome, PortalResult};

/// `Accept` sent when a request does not set its own.
const DEFAULT_ACCEPT: &str = "text/html";

/// Production transport talking to the portal over HTTPS.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
    jar: CookieJar,
    events: Option<EventBus>,
}

impl HttpTransport {
    /// Build a client for `config` that stores cookies in `jar`.
    pub fn new(config: &PortalConfig, jar: CookieJar) -> PortalResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(config.user_agent.as_str())
            .default_headers(default_headers)
            .cookie_provider(jar.provider())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| {
                Failure::unexpected_response("Could not initialize the HTTP client")
                    .with_details(e.to_string())
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            retry: config.retry,
            jar,
            events: None,
        })
    }

    /// Publish retry notices on `events`.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn resolve(&self, url: &str) -> PortalResult<Url> {
        self.base_url
            .join(url.trim_start_matches('/'))
            .map_err(|e| Failure::unexpected_response("Invalid request URL").with_details(e.to_string()))
    }

    fn build(&self, request: &PortalRequest, url: &Url) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            Method::Get => self.client.get(url.clone()),
            Method::Post => self.client.post(url.clone()),
        };

        for (name, value) in request.headers.all() {
            builder = builder.header(name, value);
        }

        match &request.body {
            Some(RequestBody::Form(pairs)) => builder.form(pairs),
            Some(RequestBody::Json(value)) => builder.json(value),
            None => builder,
        }
    }

    async fn finish(
        &self,
        response: reqwest::Response,
        cancel: &CancellationToken,
    ) -> PortalResult<HttpOutcome> {
        let status = response.status();
        let final_url = response.url().clone();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        if !status.is_success() {
            return Err(Failure::unexpected_response(format!(
                "Unexpected response from portal ({})",
                status.canonical_reason().unwrap_or("unknown status")
            ))
            .with_details(format!("Status: {}", status.as_u16())));
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            body = response.text() => body.map_err(|e| classify(&e, cancel))?,
        };

        Ok(HttpOutcome {
            status: status.as_u16(),
            body,
            cookies: self.jar.snapshot(&final_url),
            final_url: final_url.to_string(),
            headers,
        })
    }

    fn notify_retry(&self, notice: RetryNotice) {
        tracing::warn!(
            retry = notice.retry,
            total = notice.total_retries,
            status = notice.status_code,
            delay_ms = notice.delay.as_millis() as u64,
            "retrying portal request: {}",
            notice.message
        );
        if let Some(events) = &self.events {
            events.emit(PortalEvent::Retry(notice));
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: PortalRequest,
        cancel: &CancellationToken,
    ) -> PortalResult<HttpOutcome> {
        let url = self.resolve(&request.url)?;
        let mut ctx = RetryContext::default();

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }

            ctx.attempts += 1;
            tracing::debug!(
                method = request.method.as_str(),
                url = %url,
                attempt = ctx.attempts,
                "sending portal request"
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                result = self.build(&request, &url).send() => result,
            };

            let (message, status_code) = match result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    tracing::debug!(
                        status,
                        attempt = ctx.attempts,
                        waited_ms = ctx.total_delay.as_millis() as u64,
                        "portal responded"
                    );
                    if RetryPolicy::is_retryable_status(status)
                        && self.retry.allows_retry(ctx.retries_done())
                    {
                        let reason = response
                            .status()
                            .canonical_reason()
                            .unwrap_or("server error")
                            .to_string();
                        (reason, status)
                    } else {
                        return self.finish(response, cancel).await;
                    }
                }
                Err(e) => {
                    if is_retryable_error(&e) && self.retry.allows_retry(ctx.retries_done()) {
                        (e.to_string(), 0)
                    } else {
                        tracing::debug!(
                            attempt = ctx.attempts,
                            waited_ms = ctx.total_delay.as_millis() as u64,
                            "portal request failed"
                        );
                        return Err(classify(&e, cancel));
                    }
                }
            };

            let retry = ctx.retries_done() + 1;
            let delay = self.retry.delay_for(retry);
            self.notify_retry(RetryNotice {
                message,
                status_code,
                total_retries: self.retry.max_retries,
                retry,
                delay,
            });

            backoff(delay, cancel).await?;
            ctx.record_backoff(delay);
        }
    }
}

async fn backoff(delay: Duration, cancel: &CancellationToken) -> PortalResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled()),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

fn cancelled() -> Failure {
    Failure::network("Request cancelled")
}

/// Transient failures worth another attempt. Timeouts already spent the
/// per-call budget and are not retried.
fn is_retryable_error(e: &reqwest::Error) -> bool {
    !e.is_timeout() && (e.is_connect() || e.is_request())
}

/// Map a reqwest error onto the failure taxonomy.
fn classify(e: &reqwest::Error, cancel: &CancellationToken) -> Failure {
    if cancel.is_cancelled() {
        return cancelled();
    }
    if e.is_timeout() {
        return Failure::network("Slow connection: the portal did not answer in time")
            .with_details(e.to_string());
    }
    if is_connection_refused(e) {
        return Failure::network("Connection refused by the portal").with_details(e.to_string());
    }

    let chain = error_chain_text(e);
    if chain.contains("dns error") || chain.contains("failed to lookup") {
        return Failure::network("Could not resolve the portal host").with_details(chain);
    }
    if e.is_connect() {
        return Failure::network("Could not connect to the portal").with_details(chain);
    }

    Failure::unexpected_response("Request to the portal failed").with_details(chain)
}

fn is_connection_refused(e: &reqwest::Error) -> bool {
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = err.source();
    }
    false
}

fn error_chain_text(e: &reqwest::Error) -> String {
    let mut text = e.to_string();
    let mut source = e.source();
    while let Some(err) = source {
        text.push_str(": ");
        text.push_str(&err.to_string());
        source = err.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_paths() {
        let config = PortalConfig::with_base_url("http://127.0.0.1:8080/").unwrap();
        let transport = HttpTransport::new(&config, CookieJar::new()).unwrap();

        assert_eq!(
            transport.resolve("/LoginServlet").unwrap().as_str(),
            "http://127.0.0.1:8080/LoginServlet"
        );
        assert_eq!(transport.resolve("/").unwrap().as_str(), "http://127.0.0.1:8080/");
        assert_eq!(
            transport.resolve("https://other.host/x").unwrap().as_str(),
            "https://other.host/x"
        );
    }

    #[test]
    fn test_resolve_keeps_base_prefix() {
        let config = PortalConfig::with_base_url("http://10.0.0.1/portal/").unwrap();
        let transport = HttpTransport::new(&config, CookieJar::new()).unwrap();
        assert_eq!(
            transport.resolve("/LogoutServlet").unwrap().as_str(),
            "http://10.0.0.1/portal/LogoutServlet"
        );
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_short_circuits() {
        let config = PortalConfig::with_base_url("http://127.0.0.1:1/").unwrap();
        let transport = HttpTransport::new(&config, CookieJar::new()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = transport
            .send(PortalRequest::get("/"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, crate::FailureKind::NetworkError);
        assert!(failure.message.to_lowercase().contains("cancelled"));
    }
}
