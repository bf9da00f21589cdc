//! Shared cookie jar for portal requests.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use url::Url;

/// Thread-safe cookie store shared by every transport built from it.
///
/// Cloning is cheap and yields a handle to the same jar. The transport feeds
/// every `Set-Cookie` into it and replays matching cookies on later requests.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    inner: Arc<Jar>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle suitable for `reqwest::ClientBuilder::cookie_provider`.
    pub(crate) fn provider(&self) -> Arc<Jar> {
        Arc::clone(&self.inner)
    }

    /// Seed a cookie as if `url` had sent it in `Set-Cookie`.
    pub fn add(&self, cookie: &str, url: &Url) {
        self.inner.add_cookie_str(cookie, url);
    }

    /// Name/value pairs the jar would send to `url`.
    pub fn snapshot(&self, url: &Url) -> HashMap<String, String> {
        let Some(header) = self.inner.cookies(url) else {
            return HashMap::new();
        };
        let Ok(header) = header.to_str() else {
            return HashMap::new();
        };

        header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some((name.to_string(), value.to_string()))
            })
            .collect()
    }
}
