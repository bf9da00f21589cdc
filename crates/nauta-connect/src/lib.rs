//! NautaConnect: session engine for the ETECSA Nauta captive portal.

pub mod config;
pub mod engine;
pub mod events;
pub mod extractor;
pub mod keys;
pub mod persistence;
pub mod transport;
pub mod types;

pub use config::PortalConfig;
pub use engine::PortalSession;
pub use events::{EventBus, PortalEvent, RetryNotice};
pub use extractor::{
    check_for_inline_alert, extract_hidden_form_fields, extract_session_tokens_from_script,
    try_parse_duration,
};
pub use persistence::SessionStore;
pub use transport::{
    CookieJar, HeaderConfig, HttpTransport, Method, PortalRequest, RequestBody, RetryPolicy,
    Transport,
};
pub use types::*;

pub use tokio_util::sync::CancellationToken;
