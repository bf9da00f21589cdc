//! Core data types shared by the extractor, transport, and session engine.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keys;

/// Why an operation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NetworkError,
    UnexpectedResponse,
    InvalidCredentials,
    NoBalance,
    SessionExpired,
    ParserError,
    IoError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NetworkError => "network_error",
            FailureKind::UnexpectedResponse => "unexpected_response",
            FailureKind::InvalidCredentials => "invalid_credentials",
            FailureKind::NoBalance => "no_balance",
            FailureKind::SessionExpired => "session_expired",
            FailureKind::ParserError => "parser_error",
            FailureKind::IoError => "io_error",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal failure for the call that produced it.
///
/// `message` is meant for humans; `details` carries machine-oriented context
/// such as the HTTP status or the underlying error text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub details: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: String::new(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NetworkError, message)
    }

    pub fn unexpected_response(message: impl Into<String>) -> Self {
        Self::new(FailureKind::UnexpectedResponse, message)
    }

    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidCredentials, message)
    }

    pub fn no_balance(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NoBalance, message)
    }

    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::new(FailureKind::SessionExpired, message)
    }

    pub fn parser(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ParserError, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(FailureKind::IoError, message)
    }

    /// Attach machine-oriented details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

impl From<std::io::Error> for Failure {
    fn from(e: std::io::Error) -> Self {
        Failure::io("I/O error").with_details(e.to_string())
    }
}

impl From<serde_json::Error> for Failure {
    fn from(e: serde_json::Error) -> Self {
        Failure::io("Malformed session data").with_details(e.to_string())
    }
}

pub type PortalResult<T> = Result<T, Failure>;

/// Portal-issued tokens keyed by case-insensitive field name.
///
/// The name as first inserted is kept for serialization so payloads echo the
/// portal's own spelling back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct SessionFields {
    entries: BTreeMap<String, (String, String)>,
}

impl SessionFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    /// Value for `name`, or the empty string when absent.
    pub fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Insert or replace a field, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        let value = value.into();
        match self.entries.get_mut(&key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.insert(key, (name, value));
                None
            }
        }
    }

    /// Copy every field of `other` into `self`; `other` wins on conflicts.
    pub fn merge(&mut self, other: &SessionFields) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate as `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Whether the fields identify an authenticated portal session.
    pub fn is_authenticated(&self) -> bool {
        self.contains(keys::ATTRIBUTE_UUID) && self.contains(keys::USERNAME)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SessionFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = SessionFields::new();
        for (name, value) in iter {
            fields.insert(name, value);
        }
        fields
    }
}

impl From<BTreeMap<String, String>> for SessionFields {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<SessionFields> for BTreeMap<String, String> {
    fn from(fields: SessionFields) -> Self {
        fields.entries.into_values().collect()
    }
}

/// Coarse classification of an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Informational,
    Success,
    Redirection,
    ClientError,
    ServerError,
    NetworkError,
}

impl StatusClass {
    pub fn from_status(status: u16) -> Self {
        match status {
            0 => StatusClass::NetworkError,
            1..=199 => StatusClass::Informational,
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirection,
            400..=499 => StatusClass::ClientError,
            _ => StatusClass::ServerError,
        }
    }
}

/// Normalized result of one transport call.
#[derive(Debug, Clone)]
pub struct HttpOutcome {
    /// HTTP status code of the final response.
    pub status: u16,
    /// Response body as text.
    pub body: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// All response headers.
    pub headers: Vec<(String, String)>,
    /// Cookies the jar holds for the final URL.
    pub cookies: HashMap<String, String>,
}

impl HttpOutcome {
    pub fn status_class(&self) -> StatusClass {
        StatusClass::from_status(self.status)
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Durable copy of an authenticated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub username: String,
    pub login_time: DateTime<Utc>,
    pub fields: SessionFields,
}

impl SessionSnapshot {
    pub fn new(username: impl Into<String>, fields: SessionFields) -> Self {
        Self {
            username: username.into(),
            login_time: Utc::now(),
            fields,
        }
    }

    pub fn attribute_uuid(&self) -> Option<&str> {
        self.fields.get(keys::ATTRIBUTE_UUID)
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.fields.get(keys::CSRFHW)
    }

    pub fn user_ip(&self) -> Option<&str> {
        self.fields.get(keys::WLANUSERIP)
    }

    pub fn logger_id(&self) -> Option<&str> {
        self.fields.get(keys::LOGGER_ID)
    }
}
