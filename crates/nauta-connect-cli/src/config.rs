//! Data file locations.

use std::path::PathBuf;

/// Directory under the platform data dir holding all state.
pub const APP_DIR: &str = "nauta-connect";

pub const SESSION_FILE_NAME: &str = nauta_connect::persistence::SESSION_FILE_NAME;
pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";

/// Resolve the session snapshot path: explicit > `NAUTA_SESSION_FILE` > data dir.
pub fn resolve_session_path(explicit: Option<&str>) -> PathBuf {
    resolve_path(
        explicit,
        std::env::var("NAUTA_SESSION_FILE").ok(),
        SESSION_FILE_NAME,
    )
}

/// Resolve the credentials path: explicit > `NAUTA_CREDENTIALS_FILE` > data dir.
pub fn resolve_credentials_path(explicit: Option<&str>) -> PathBuf {
    resolve_path(
        explicit,
        std::env::var("NAUTA_CREDENTIALS_FILE").ok(),
        CREDENTIALS_FILE_NAME,
    )
}

fn resolve_path(explicit: Option<&str>, env_value: Option<String>, file_name: &str) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Some(path) = env_value.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    default_data_dir().join(file_name)
}

/// `<data dir>/nauta-connect`, falling back to `~/.nauta-connect`.
pub fn default_data_dir() -> PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join(APP_DIR),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(format!(".{APP_DIR}")),
    }
}
