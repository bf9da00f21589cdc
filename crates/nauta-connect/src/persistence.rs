//! JSON file persistence for the active session.

use std::path::{Path, PathBuf};

use crate::types::{Failure, PortalResult, SessionSnapshot};

/// File name used under a data directory.
pub const SESSION_FILE_NAME: &str = "active_session.json";

/// Stores at most one [`SessionSnapshot`] in a JSON file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store rooted in `dir`, using [`SESSION_FILE_NAME`].
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(SESSION_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `snapshot`, replacing any previous one.
    pub fn save_session(&self, snapshot: &SessionSnapshot) -> PortalResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_error(&e))?;
        }

        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, json).map_err(|e| save_error(&e))?;

        tracing::debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    /// The persisted session, or `None` when nothing is stored.
    ///
    /// An unreadable or corrupt file is deleted and reported as an
    /// `IoError`.
    pub fn active_session(&self) -> PortalResult<Option<SessionSnapshot>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                self.discard();
                return Err(read_error(e.to_string()));
            }
        };

        match serde_json::from_str::<SessionSnapshot>(&contents) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "discarding corrupt session file: {e}");
                self.discard();
                Err(read_error(e.to_string()))
            }
        }
    }

    /// Remove the persisted session. Missing files are not an error.
    pub fn delete_session(&self) -> PortalResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Failure::io("Error deleting session").with_details(e.to_string())),
        }
    }

    fn discard(&self) {
        if let Err(e) = self.delete_session() {
            tracing::warn!(path = %self.path.display(), "could not delete session file: {}", e.details);
        }
    }
}

fn save_error(e: &std::io::Error) -> Failure {
    Failure::io("Error saving session").with_details(e.to_string())
}

fn read_error(details: String) -> Failure {
    Failure::io("Error reading the session file").with_details(details)
}
