//! Portal connection settings.

use std::time::Duration;

use url::Url;

use crate::transport::RetryPolicy;

/// The ETECSA portal as reached from a Nauta hotspot.
pub const DEFAULT_PORTAL_URL: &str = "https://secure.etecsa.net:8443/";

/// Per-call timeout unless overridden.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/120.0.0.0 Safari/537.36";

/// Settings for the transport and the URLs the engine builds.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Portal root; relative request URLs resolve against it.
    pub base_url: Url,
    /// Timeout for a single attempt.
    pub timeout: Duration,
    pub user_agent: String,
    /// Skip TLS certificate validation (the portal's chain is often broken).
    pub accept_invalid_certs: bool,
    pub retry: RetryPolicy,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_PORTAL_URL).expect("default portal URL is valid"),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_invalid_certs: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl PortalConfig {
    /// Defaults with a different portal root.
    pub fn with_base_url(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            base_url: normalize_base(Url::parse(base_url)?),
            ..Default::default()
        })
    }

    /// Defaults overlaid with `NAUTA_PORTAL_URL`, `NAUTA_TIMEOUT_SECS` and
    /// `NAUTA_INSECURE`.
    pub fn from_env() -> Self {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`; unparsable values are ignored.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("NAUTA_PORTAL_URL") {
            match Url::parse(&raw) {
                Ok(url) => self.base_url = normalize_base(url),
                Err(e) => tracing::warn!(value = %raw, "ignoring NAUTA_PORTAL_URL: {e}"),
            }
        }

        if let Some(raw) = lookup("NAUTA_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %raw, "ignoring NAUTA_TIMEOUT_SECS"),
            }
        }

        if let Some(raw) = lookup("NAUTA_INSECURE") {
            self.accept_invalid_certs =
                matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        self
    }

    /// `scheme://host[:port]` of the portal, as sent in `Origin`.
    pub fn origin(&self) -> String {
        self.base_url.origin().ascii_serialization()
    }

    /// The portal root, as sent in the login `Referer`.
    pub fn root_url(&self) -> String {
        self.base_url.to_string()
    }

    /// `Referer` of the online page for the given CSRF token.
    pub fn online_referer(&self, csrf: &str) -> String {
        format!("{}web/online.do?CSRFHW={csrf}&", self.base_url)
    }
}

fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_urls() {
        let config = PortalConfig::default();
        assert_eq!(config.origin(), "https://secure.etecsa.net:8443");
        assert_eq!(config.root_url(), "https://secure.etecsa.net:8443/");
        assert_eq!(
            config.online_referer("abc"),
            "https://secure.etecsa.net:8443/web/online.do?CSRFHW=abc&"
        );
        assert_eq!(config.retry.max_retries, 3);
        assert!(!config.accept_invalid_certs);
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let config = PortalConfig::with_base_url("http://10.0.0.1:8080/portal").unwrap();
        assert_eq!(config.root_url(), "http://10.0.0.1:8080/portal/");
        assert_eq!(config.origin(), "http://10.0.0.1:8080");
    }

    #[test]
    fn test_apply_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("NAUTA_PORTAL_URL", "http://127.0.0.1:9000"),
            ("NAUTA_TIMEOUT_SECS", "30"),
            ("NAUTA_INSECURE", "true"),
        ]
        .into_iter()
        .collect();

        let config = PortalConfig::default().apply_env(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.root_url(), "http://127.0.0.1:9000/");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.accept_invalid_certs);
    }

    #[test]
    fn test_apply_env_ignores_garbage() {
        let config = PortalConfig::default().apply_env(|k| match k {
            "NAUTA_PORTAL_URL" => Some("not a url".to_string()),
            "NAUTA_TIMEOUT_SECS" => Some("soon".to_string()),
            _ => None,
        });
        assert_eq!(config.root_url(), DEFAULT_PORTAL_URL);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }
}
