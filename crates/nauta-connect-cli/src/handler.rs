//! Command orchestration: credentials, session restore, and persistence
//! around the session engine.

use std::io::{BufRead, Write};

use anyhow::Result;
use nauta_connect::{CancellationToken, PortalEvent, PortalSession, SessionStore};

use crate::credentials::{CredentialStore, Credentials};

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Login,
    Logout,
    Status,
}

/// Credential-related command line input.
#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    pub user: Option<String>,
    pub password: Option<String>,
    pub remember: bool,
}

/// An [`Action`] with everything interactive already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login {
        credentials: Credentials,
        remember: bool,
    },
    Logout,
    Status,
}

/// Interactive input source.
pub trait Prompt {
    fn ask(&mut self, label: &str) -> Result<String>;

    /// Like [`Prompt::ask`] but the answer is not echoed.
    fn ask_secret(&mut self, label: &str) -> Result<String>;
}

/// Reads answers from the terminal, one line each.
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, label: &str) -> Result<String> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{label}")?;
        stdout.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn ask_secret(&mut self, label: &str) -> Result<String> {
        Ok(rpassword::prompt_password(label)?)
    }
}

/// Username from flag > stored > prompt; password from flag > stored (same
/// user only) > hidden prompt. `None` when either ends up empty.
pub fn resolve_credentials(
    options: &LoginOptions,
    stored: Option<Credentials>,
    prompt: &mut dyn Prompt,
) -> Result<Option<Credentials>> {
    let username = match options.user.clone().filter(|u| !u.is_empty()) {
        Some(user) => user,
        None => match stored.as_ref() {
            Some(saved) if !saved.username.is_empty() => saved.username.clone(),
            _ => prompt.ask("Username: ")?,
        },
    };
    if username.is_empty() {
        return Ok(None);
    }

    let password = match options.password.clone().filter(|p| !p.is_empty()) {
        Some(password) => password,
        None => match stored {
            Some(saved) if saved.username == username => saved.password,
            _ => prompt.ask_secret(&format!("Password for {username}: "))?,
        },
    };
    if password.is_empty() {
        return Ok(None);
    }

    Ok(Some(Credentials::new(username, password)))
}

/// Runs one [`Command`] against a [`PortalSession`].
pub struct CommandHandler<C: CredentialStore> {
    session: PortalSession,
    sessions: SessionStore,
    credentials: C,
}

impl<C: CredentialStore> CommandHandler<C> {
    pub fn new(session: PortalSession, sessions: SessionStore, credentials: C) -> Self {
        Self {
            session,
            sessions,
            credentials,
        }
    }

    pub fn session(&self) -> &PortalSession {
        &self.session
    }

    /// Turn `action` into a [`Command`], prompting for whatever is missing.
    /// `None` when the login credentials end up empty.
    pub fn prepare(
        &self,
        action: Action,
        options: &LoginOptions,
        prompt: &mut dyn Prompt,
    ) -> Result<Option<Command>> {
        Ok(match action {
            Action::Login => resolve_credentials(options, self.credentials.load(), prompt)?.map(
                |credentials| Command::Login {
                    credentials,
                    remember: options.remember,
                },
            ),
            Action::Logout => Some(Command::Logout),
            Action::Status => Some(Command::Status),
        })
    }

    /// Execute `command`; the result says whether it succeeded.
    pub async fn execute(&mut self, command: Command, cancel: &CancellationToken) -> Result<bool> {
        if cancel.is_cancelled() {
            tracing::debug!("cancelled before start");
            return Ok(false);
        }
        match command {
            Command::Login {
                credentials,
                remember,
            } => self.login(&credentials, remember, cancel).await,
            Command::Logout => {
                if !self.restore() {
                    self.status("No saved session to close");
                    return Ok(false);
                }
                self.session.logout(cancel).await;
                let closed = self.session.fields().is_empty();
                if closed {
                    self.forget_session();
                }
                Ok(closed)
            }
            Command::Status => {
                if !self.restore() {
                    self.status("No saved session");
                    return Ok(false);
                }
                self.session.query_remaining_time(cancel).await;
                let alive = self.session.is_authenticated();
                if !alive {
                    self.forget_session();
                }
                Ok(alive)
            }
        }
    }

    async fn login(
        &mut self,
        creds: &Credentials,
        remember: bool,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if !self
            .session
            .login(&creds.username, &creds.password, cancel)
            .await
        {
            return Ok(false);
        }

        if let Some(snapshot) = self.session.snapshot() {
            if let Err(failure) = self.sessions.save_session(&snapshot) {
                self.report(PortalEvent::Error {
                    kind: failure.kind,
                    message: failure.message,
                });
            }
        }

        if remember {
            self.credentials.save(creds)?;
            tracing::info!(username = %creds.username, "credentials remembered");
        }
        Ok(true)
    }

    /// Load the persisted session into the engine. `false` when none.
    fn restore(&mut self) -> bool {
        match self.sessions.active_session() {
            Ok(Some(snapshot)) => {
                self.session.restore(&snapshot);
                true
            }
            Ok(None) => false,
            Err(failure) => {
                self.report(PortalEvent::Error {
                    kind: failure.kind,
                    message: failure.message,
                });
                false
            }
        }
    }

    fn forget_session(&self) {
        if let Err(failure) = self.sessions.delete_session() {
            tracing::warn!(details = %failure.details, "{}", failure.message);
        }
    }

    fn status(&self, message: &str) {
        self.report(PortalEvent::Status {
            message: message.to_string(),
        });
    }

    fn report(&self, event: PortalEvent) {
        self.session.events().emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted {
        answers: VecDeque<String>,
        secret_labels: Vec<String>,
    }

    impl Scripted {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: answers.iter().map(|a| a.to_string()).collect(),
                secret_labels: Vec::new(),
            }
        }
    }

    impl Prompt for Scripted {
        fn ask(&mut self, _label: &str) -> Result<String> {
            Ok(self.answers.pop_front().unwrap_or_default())
        }

        fn ask_secret(&mut self, label: &str) -> Result<String> {
            self.secret_labels.push(label.to_string());
            Ok(self.answers.pop_front().unwrap_or_default())
        }
    }

    fn options(user: Option<&str>, password: Option<&str>) -> LoginOptions {
        LoginOptions {
            user: user.map(String::from),
            password: password.map(String::from),
            remember: false,
        }
    }

    #[test]
    fn test_flags_win() {
        let stored = Some(Credentials::new("saved@nauta.com.cu", "saved"));
        let mut prompt = Scripted::new(&[]);
        let creds = resolve_credentials(&options(Some("u"), Some("p")), stored, &mut prompt)
            .unwrap()
            .unwrap();
        assert_eq!(creds, Credentials::new("u", "p"));
    }

    #[test]
    fn test_stored_password_only_for_same_user() {
        let stored = Some(Credentials::new("saved@nauta.com.cu", "saved"));

        let mut prompt = Scripted::new(&[]);
        let same = resolve_credentials(&options(None, None), stored.clone(), &mut prompt)
            .unwrap()
            .unwrap();
        assert_eq!(same, Credentials::new("saved@nauta.com.cu", "saved"));

        let mut prompt = Scripted::new(&["typed"]);
        let other = resolve_credentials(&options(Some("other"), None), stored, &mut prompt)
            .unwrap()
            .unwrap();
        assert_eq!(other, Credentials::new("other", "typed"));
    }

    #[test]
    fn test_prompts_when_nothing_stored() {
        let mut prompt = Scripted::new(&["user@nauta.com.cu", "pw"]);
        let creds = resolve_credentials(&options(None, None), None, &mut prompt)
            .unwrap()
            .unwrap();
        assert_eq!(creds, Credentials::new("user@nauta.com.cu", "pw"));
    }

    #[test]
    fn test_password_is_read_without_echo() {
        let mut prompt = Scripted::new(&["user@nauta.com.cu", "pw"]);
        resolve_credentials(&options(None, None), None, &mut prompt).unwrap();
        assert_eq!(
            prompt.secret_labels,
            vec!["Password for user@nauta.com.cu: ".to_string()]
        );

        let mut prompt = Scripted::new(&[]);
        resolve_credentials(&options(Some("u"), Some("p")), None, &mut prompt).unwrap();
        assert!(prompt.secret_labels.is_empty());
    }

    #[test]
    fn test_empty_answers_abort() {
        let mut prompt = Scripted::new(&[""]);
        assert!(resolve_credentials(&options(None, None), None, &mut prompt)
            .unwrap()
            .is_none());

        let mut prompt = Scripted::new(&[""]);
        assert!(resolve_credentials(&options(Some("u"), None), None, &mut prompt)
            .unwrap()
            .is_none());
    }
}
