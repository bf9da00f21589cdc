//! Field extraction from the portal's HTML forms and inline scripts.
//!
//! The portal's markup is an external, semi-stable contract. Absence of the
//! expected structure in any entry point here is a
//! [`FailureKind::ParserError`], never a panic.
//!
//! Three scrapers are layered on top of each other:
//!
//! 1. **Hidden form fields**: the landing page's `<input type="hidden">`
//!    elements carry the CSRF token and the client's network identity.
//! 2. **Inline alerts**: the portal reports login errors with a
//!    JavaScript `alert('...')` instead of an HTTP status.
//! 3. **Session tokens**: after login, the tokens are assembled into a
//!    query-string literal split across `"a" + "b"` fragments.
//!
//! All functions are synchronous and pure.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use scraper::{Html, Selector};

use crate::keys;
use crate::types::{Failure, FailureKind, PortalResult, SessionFields};

/// Tokens that must both be present after login.
const MANDATORY_TOKENS: [&str; 2] = [keys::ATTRIBUTE_UUID, keys::CSRFHW];

/// Tokens kept only when the portal includes them.
const OPTIONAL_TOKENS: [&str; 2] = [keys::LOGGER_ID, keys::USERNAME];

fn input_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("input[name]").expect("input selector is valid"))
}

fn script_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("script").expect("script selector is valid"))
}

fn alert_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"alert\s*\(\s*(?:'(?P<single>[^']*)'|"(?P<double>[^"]*)")\s*\)"#)
            .expect("alert regex is valid")
    })
}

/// A closing quote, a `+`, and an opening quote: one JS concatenation seam.
fn concat_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["']\s*\+\s*["']"#).expect("concat regex is valid"))
}

fn pair_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?P<key>[A-Za-z_][A-Za-z0-9_]*)\s*=\s*(?P<value>[^&"';\s]*)"#)
            .expect("pair regex is valid")
    })
}

/// Collect every `<input type="hidden" name="...">` into a field map.
///
/// Later duplicates overwrite earlier ones, in document order. Fails with
/// [`FailureKind::ParserError`] when the page has no hidden inputs at all,
/// which means it is not the portal's login form.
pub fn extract_hidden_form_fields(html: &str) -> PortalResult<SessionFields> {
    let document = Html::parse_document(html);
    let mut fields = SessionFields::new();
    let mut found = false;

    for input in document.select(input_selector()) {
        let element = input.value();
        let is_hidden = element
            .attr("type")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("hidden"));
        if !is_hidden {
            continue;
        }
        let name = element.attr("name").unwrap_or("").trim();
        if name.is_empty() {
            continue;
        }
        found = true;
        fields.insert(name, element.attr("value").unwrap_or(""));
    }

    if !found {
        return Err(Failure::parser("The page does not contain the portal login form")
            .with_details("no hidden input fields"));
    }

    tracing::debug!(count = fields.len(), "extracted hidden form fields");
    Ok(fields)
}

/// Look for a JavaScript `alert(...)` inside any `<script>` element.
///
/// The alert text becomes the failure message. Its kind is picked from the
/// wording: balance problems map to [`FailureKind::NoBalance`], user or
/// password problems to [`FailureKind::InvalidCredentials`], anything else to
/// [`FailureKind::UnexpectedResponse`].
pub fn check_for_inline_alert(html: &str) -> PortalResult<()> {
    let document = Html::parse_document(html);

    for script in document.select(script_selector()) {
        let body: String = script.text().collect();
        let Some(caps) = alert_regex().captures(&body) else {
            continue;
        };
        let message = caps
            .name("single")
            .or_else(|| caps.name("double"))
            .map_or("", |m| m.as_str());

        let kind = classify_alert(message);
        tracing::debug!(%kind, alert = message, "portal reported an inline alert");
        return Err(Failure::new(kind, message));
    }

    Ok(())
}

fn classify_alert(message: &str) -> FailureKind {
    let lowered = message.to_lowercase();
    if lowered.contains("saldo") {
        FailureKind::NoBalance
    } else if lowered.contains("usuario") || lowered.contains("contraseña") {
        FailureKind::InvalidCredentials
    } else {
        FailureKind::UnexpectedResponse
    }
}

/// Extract the post-login session tokens from the page's inline script.
///
/// Any inline alert short-circuits extraction and is returned unchanged.
/// Otherwise the text is normalized (control characters removed, `"a" + "b"`
/// seams collapsed) and scanned as `&`-delimited `key=value` pairs. Keys
/// match case-insensitively and the first non-empty value wins.
/// `ATTRIBUTE_UUID` and `CSRFHW` are mandatory; `loggerId` and `username`
/// are included when present. Values are kept raw, so a `+` stays a `+`.
pub fn extract_session_tokens_from_script(html: &str) -> PortalResult<SessionFields> {
    check_for_inline_alert(html)?;

    let normalized = normalize_script(html);
    let mut tokens = SessionFields::new();

    for caps in pair_regex().captures_iter(&normalized) {
        let key = caps.name("key").map_or("", |m| m.as_str());
        let value = caps.name("value").map_or("", |m| m.as_str());
        if value.is_empty() {
            continue;
        }
        let wanted = MANDATORY_TOKENS
            .iter()
            .chain(OPTIONAL_TOKENS.iter())
            .find(|wanted| wanted.eq_ignore_ascii_case(key));
        if let Some(canonical) = wanted {
            if !tokens.contains(canonical) {
                tokens.insert(*canonical, value);
            }
        }
    }

    let missing: Vec<&str> = MANDATORY_TOKENS
        .iter()
        .copied()
        .filter(|key| !tokens.contains(key))
        .collect();
    if !missing.is_empty() {
        return Err(
            Failure::parser("Could not extract the session tokens from the portal response")
                .with_details(format!("missing: {}", missing.join(", "))),
        );
    }

    tracing::debug!(count = tokens.len(), "extracted session tokens");
    Ok(tokens)
}

fn normalize_script(text: &str) -> String {
    let flattened: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    concat_regex().replace_all(&flattened, "").into_owned()
}

/// Parse a `HOURS:MM:SS` duration where hours may exceed 24.
///
/// Returns `None` on a wrong segment count, a non-numeric segment, or
/// overflow.
pub fn try_parse_duration(text: &str) -> Option<Duration> {
    let parts: Vec<&str> = text.split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        return None;
    };

    let hours: u64 = hours.parse().ok()?;
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;

    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;
    Some(Duration::from_secs(total))
}
