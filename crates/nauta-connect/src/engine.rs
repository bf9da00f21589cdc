//! The portal session state machine.
//!
//! A [`PortalSession`] owns the [`SessionFields`] issued by the portal and
//! drives detect, login, remaining-time query and logout on top of a
//! [`Transport`]. It is either unauthenticated or authenticated, decided
//! solely by whether the fields hold both `ATTRIBUTE_UUID` and `username`.
//!
//! Operations take `&mut self`, so one call at a time per session is
//! enforced by the borrow checker. Outcomes are reported through the
//! [`EventBus`]; the boolean returns only tell the caller whether to go on.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::PortalConfig;
use crate::events::{EventBus, PortalEvent};
use crate::extractor;
use crate::keys;
use crate::transport::{PortalRequest, RequestBody, Transport};
use crate::types::{Failure, FailureKind, SessionFields, SessionSnapshot};

/// Hidden fields the login form echoes back, in the order the portal posts them.
const LOGIN_FORM_FIELDS: [&str; 11] = [
    keys::WLANUSERIP,
    keys::WLANACNAME,
    keys::WLANMAC,
    keys::FIRSTURL,
    keys::SSID,
    keys::USERTYPE,
    keys::GOTOPAGE,
    keys::SUCCESSPAGE,
    keys::LOGGER_ID,
    keys::LANG,
    keys::CSRFHW,
];

/// Session-derived fields of the query and logout payloads.
const SESSION_PAYLOAD_FIELDS: [&str; 5] = [
    keys::ATTRIBUTE_UUID,
    keys::CSRFHW,
    keys::WLANUSERIP,
    keys::LOGGER_ID,
    keys::USERNAME,
];

/// Fields the portal expects present but empty on query and logout.
const BLANK_PAYLOAD_FIELDS: [&str; 4] = [keys::SSID, keys::DOMAIN, keys::WLANACNAME, keys::WLANMAC];

const MSG_CHECKING_PORTAL: &str = "Checking access to the ETECSA portal";
const MSG_PORTAL_NOT_DETECTED: &str = "ETECSA portal not detected";
const MSG_LOGGING_IN: &str = "Logging in...";
const MSG_CONNECTED: &str = "Connected!";
const MSG_INVALID_CREDENTIALS: &str = "Invalid username or password";
const MSG_NO_SESSION: &str = "There is no active session to query the time.";
const MSG_SESSION_EXPIRED: &str = "The session has expired due to inactivity.";
const MSG_LOGGING_OUT: &str = "Logging out...";
const MSG_LOGGED_OUT: &str = "Session closed.";
const MSG_LOGOUT_FAILED: &str = "Error logging out. Try again.";

/// Session protocol engine for one portal session.
pub struct PortalSession {
    transport: Arc<dyn Transport>,
    config: PortalConfig,
    events: EventBus,
    fields: SessionFields,
}

impl PortalSession {
    /// Create an unauthenticated session with empty fields.
    pub fn new(transport: Arc<dyn Transport>, config: PortalConfig, events: EventBus) -> Self {
        Self {
            transport,
            config,
            events,
            fields: SessionFields::new(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Current portal-issued fields.
    pub fn fields(&self) -> &SessionFields {
        &self.fields
    }

    pub fn is_authenticated(&self) -> bool {
        self.fields.is_authenticated()
    }

    /// Durable copy of the session, if authenticated.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        if !self.is_authenticated() {
            return None;
        }
        let username = self.fields.get_or_empty(keys::USERNAME);
        Some(SessionSnapshot::new(username, self.fields.clone()))
    }

    /// Replace the fields with those of a persisted session. No network I/O.
    pub fn restore(&mut self, snapshot: &SessionSnapshot) {
        let mut fields = snapshot.fields.clone();
        if !fields.contains(keys::USERNAME) && !snapshot.username.is_empty() {
            fields.insert(keys::USERNAME, snapshot.username.as_str());
        }
        self.fields = fields;

        tracing::info!(username = %snapshot.username, "session restored");
        self.status(format!("Restored session for {}", snapshot.username));
    }

    /// Fetch the portal landing page and capture its hidden form fields.
    ///
    /// Returns `true` when the page carries a CSRF token. Any failure leaves
    /// the fields empty.
    pub async fn detect_portal(&mut self, cancel: &CancellationToken) -> bool {
        self.fields.clear();
        self.status(MSG_CHECKING_PORTAL);

        let request = PortalRequest::get(keys::PORTAL_ROOT_PATH);
        let detected = match self.transport.send(request, cancel).await {
            Ok(outcome) => extractor::extract_hidden_form_fields(&outcome.body),
            Err(failure) => Err(failure),
        };

        match detected {
            Ok(fields) if fields.contains(keys::CSRFHW) => {
                tracing::info!(fields = fields.len(), "portal detected");
                self.fields = fields;
                true
            }
            Ok(_) => {
                tracing::debug!("portal form has no CSRF token");
                self.status(MSG_PORTAL_NOT_DETECTED);
                false
            }
            Err(failure) => {
                tracing::debug!(kind = %failure.kind, details = %failure.details, "portal detection failed");
                self.status(format!("{MSG_PORTAL_NOT_DETECTED}: {}", failure.message));
                false
            }
        }
    }

    /// Submit credentials and establish an authenticated session.
    ///
    /// Detects the portal first when no fields are held yet. On failure the
    /// fields are left as they were.
    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> bool {
        if self.fields.is_empty() && !self.detect_portal(cancel).await {
            return false;
        }

        let body = login_payload(&self.fields, username, password);
        tracing::debug!(fields = ?body.form_keys(), "submitting login form");
        self.status(MSG_LOGGING_IN);

        let referer = self.config.root_url();
        let origin = self.config.origin();
        let request = PortalRequest::post(keys::LOGIN_PATH)
            .body(body)
            .configure(|h| {
                h.referer(referer).header("Origin", origin);
            });

        let outcome = match self.transport.send(request, cancel).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                self.error(&failure);
                return false;
            }
        };

        if !outcome.final_url.contains(keys::ONLINE_MARKER) {
            let failure = match extractor::check_for_inline_alert(&outcome.body) {
                Err(alert) => alert,
                Ok(()) => Failure::invalid_credentials(MSG_INVALID_CREDENTIALS)
                    .with_details(format!("final url: {}", outcome.final_url)),
            };
            tracing::info!(kind = %failure.kind, "login rejected");
            self.error(&failure);
            return false;
        }

        let tokens = match extractor::extract_session_tokens_from_script(&outcome.body) {
            Ok(tokens) => tokens,
            Err(failure) => {
                tracing::info!(kind = %failure.kind, details = %failure.details, "login tokens unreadable");
                self.error(&failure);
                return false;
            }
        };

        let mut fields = self.fields.clone();
        fields.insert(keys::USERNAME, username);
        fields.merge(&tokens);
        self.fields = fields;

        tracing::info!(username, "logged in");
        self.status(MSG_CONNECTED);
        self.events.emit(PortalEvent::ConnectionState { connected: true });
        true
    }

    /// Ask the portal how much connection time is left.
    ///
    /// Any failure to obtain a readable answer is taken as session expiry
    /// and clears the fields.
    pub async fn query_remaining_time(&mut self, cancel: &CancellationToken) {
        if !self.fields.is_authenticated() {
            self.error(&Failure::session_expired(MSG_NO_SESSION));
            return;
        }

        let mut pairs = vec![(keys::OP.to_string(), keys::OP_GET_LEFT_TIME.to_string())];
        pairs.extend(session_payload(&self.fields));

        let referer = self
            .config
            .online_referer(self.fields.get_or_empty(keys::CSRFHW));
        let origin = self.config.origin();
        let request = PortalRequest::post(keys::QUERY_PATH)
            .body(RequestBody::Form(pairs))
            .configure(|h| {
                h.referer(referer)
                    .header("Origin", origin)
                    .header("Accept", "*/*");
            });

        let remaining = match self.transport.send(request, cancel).await {
            Ok(outcome) => extractor::try_parse_duration(outcome.body.trim()).ok_or_else(|| {
                Failure::parser("Unreadable remaining time").with_details(outcome.body.trim().to_string())
            }),
            Err(failure) => Err(failure),
        };

        match remaining {
            Ok(remaining) => {
                tracing::debug!(secs = remaining.as_secs(), "remaining time");
                self.events.emit(PortalEvent::TimeRemaining { remaining });
            }
            Err(failure) => {
                tracing::info!(kind = %failure.kind, details = %failure.details, "session expired");
                self.fields.clear();
                self.events.emit(PortalEvent::ConnectionState { connected: false });
                self.error(&Failure::session_expired(MSG_SESSION_EXPIRED).with_details(failure.message));
            }
        }
    }

    /// Terminate the portal session.
    ///
    /// Does nothing when neither `ATTRIBUTE_UUID` nor `username` is held.
    /// On failure the fields are kept so the caller can try again.
    pub async fn logout(&mut self, cancel: &CancellationToken) {
        if !self.fields.contains(keys::ATTRIBUTE_UUID) && !self.fields.contains(keys::USERNAME) {
            return;
        }

        self.status(MSG_LOGGING_OUT);

        let mut pairs = session_payload(&self.fields);
        pairs.push((keys::REMOVE.to_string(), "1".to_string()));

        let referer = self
            .config
            .online_referer(self.fields.get_or_empty(keys::CSRFHW));
        let origin = self.config.origin();
        let request = PortalRequest::post(keys::LOGOUT_PATH)
            .body(RequestBody::Form(pairs))
            .configure(|h| {
                h.referer(referer).header("Origin", origin);
            });

        let kind = match self.transport.send(request, cancel).await {
            Ok(outcome) if outcome.body.contains(keys::LOGOUT_SUCCESS_MARKER) => {
                self.fields.clear();
                tracing::info!("logged out");
                self.status(MSG_LOGGED_OUT);
                self.events.emit(PortalEvent::ConnectionState { connected: false });
                return;
            }
            Ok(_) => FailureKind::UnexpectedResponse,
            Err(failure) => {
                tracing::debug!(kind = %failure.kind, details = %failure.details, "logout request failed");
                failure.kind
            }
        };

        tracing::info!(%kind, "logout failed");
        self.error(&Failure::new(kind, MSG_LOGOUT_FAILED));
    }

    fn status(&self, message: impl Into<String>) {
        self.events.emit(PortalEvent::Status {
            message: message.into(),
        });
    }

    fn error(&self, failure: &Failure) {
        self.events.emit(PortalEvent::Error {
            kind: failure.kind,
            message: failure.message.clone(),
        });
    }
}

/// Hidden fields first in portal order, then any others, then credentials.
fn login_payload(fields: &SessionFields, username: &str, password: &str) -> RequestBody {
    let mut pairs: Vec<(String, String)> = LOGIN_FORM_FIELDS
        .iter()
        .map(|key| (key.to_string(), fields.get_or_empty(key).to_string()))
        .collect();

    for (name, value) in fields.iter() {
        let known = LOGIN_FORM_FIELDS.iter().any(|k| k.eq_ignore_ascii_case(name));
        let credential =
            name.eq_ignore_ascii_case(keys::USERNAME) || name.eq_ignore_ascii_case(keys::PASSWORD);
        if !known && !credential {
            pairs.push((name.to_string(), value.to_string()));
        }
    }

    pairs.push((keys::USERNAME.to_string(), username.to_string()));
    pairs.push((keys::PASSWORD.to_string(), password.to_string()));
    RequestBody::Form(pairs)
}

/// The nine fields shared by the query and logout payloads.
fn session_payload(fields: &SessionFields) -> Vec<(String, String)> {
    SESSION_PAYLOAD_FIELDS
        .iter()
        .map(|key| (key.to_string(), fields.get_or_empty(key).to_string()))
        .chain(
            BLANK_PAYLOAD_FIELDS
                .iter()
                .map(|key| (key.to_string(), String::new())),
        )
        .collect()
}
