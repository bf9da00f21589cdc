//! CommandHandler over a scripted transport and temp data files.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use nauta_connect::events::drain;
use nauta_connect::keys;
use nauta_connect::{
    CancellationToken, EventBus, Failure, HttpOutcome, PortalConfig, PortalEvent, PortalRequest,
    PortalResult, PortalSession, SessionFields, SessionSnapshot, SessionStore, Transport,
};
use nauta_connect_cli::credentials::{CredentialStore, Credentials, FileCredentialStore};
use nauta_connect_cli::handler::{Action, Command, CommandHandler, LoginOptions, Prompt};

// ─────────────────────── helpers ───────────────────────

#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<(String, String)>>,
    calls: Mutex<usize>,
}

impl ScriptedTransport {
    fn push(&self, final_path: &str, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back((final_path.to_string(), body.to_string()));
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        _request: PortalRequest,
        _cancel: &CancellationToken,
    ) -> PortalResult<HttpOutcome> {
        *self.calls.lock().unwrap() += 1;
        let (final_path, body) = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Failure::network("script exhausted"))?;
        Ok(HttpOutcome {
            status: 200,
            body,
            final_url: format!("https://secure.etecsa.net:8443{final_path}"),
            headers: Vec::new(),
            cookies: HashMap::new(),
        })
    }
}

struct NoPrompt;

impl Prompt for NoPrompt {
    fn ask(&mut self, label: &str) -> anyhow::Result<String> {
        panic!("unexpected prompt: {label}");
    }

    fn ask_secret(&mut self, label: &str) -> anyhow::Result<String> {
        panic!("unexpected prompt: {label}");
    }
}

/// Answers every prompt in order and counts them.
#[derive(Default)]
struct Answers {
    answers: VecDeque<String>,
    asked: usize,
}

impl Answers {
    fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            asked: 0,
        }
    }
}

impl Prompt for Answers {
    fn ask(&mut self, _label: &str) -> anyhow::Result<String> {
        self.asked += 1;
        Ok(self.answers.pop_front().unwrap_or_default())
    }

    fn ask_secret(&mut self, label: &str) -> anyhow::Result<String> {
        self.ask(label)
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    transport: Arc<ScriptedTransport>,
    events: EventBus,
    sessions: SessionStore,
    credentials: FileCredentialStore,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            sessions: SessionStore::in_dir(dir.path()),
            credentials: FileCredentialStore::new(dir.path().join("credentials.json")),
            _dir: dir,
            transport: Arc::new(ScriptedTransport::default()),
            events: EventBus::default(),
        }
    }

    fn handler(&self) -> CommandHandler<FileCredentialStore> {
        let session = PortalSession::new(
            self.transport.clone(),
            PortalConfig::default(),
            self.events.clone(),
        );
        CommandHandler::new(session, self.sessions.clone(), self.credentials.clone())
    }

    /// Prepare without prompting, then execute with a fresh token.
    async fn run(&self, action: Action, options: &LoginOptions) -> bool {
        let mut handler = self.handler();
        let command = handler
            .prepare(action, options, &mut NoPrompt)
            .unwrap()
            .expect("command");
        handler
            .execute(command, &CancellationToken::new())
            .await
            .unwrap()
    }

    fn save_session(&self) {
        let fields: SessionFields = [
            (keys::ATTRIBUTE_UUID, "UUID-1"),
            (keys::CSRFHW, "csrf"),
            (keys::USERNAME, "user@nauta.com.cu"),
        ]
        .into_iter()
        .collect();
        self.sessions
            .save_session(&SessionSnapshot::new("user@nauta.com.cu", fields))
            .unwrap();
    }
}

const LANDING_PAGE: &str = "<input type='hidden' name='CSRFHW' value='csrf'/>";
const ONLINE_PAGE: &str =
    "<script>var p = \"ATTRIBUTE_UUID=UUID-1&CSRFHW=csrf2\" + \"&username=user@nauta.com.cu\";</script>";

// ─────────────────────── tests ───────────────────────

#[tokio::test]
async fn test_login_persists_session_and_remembers() {
    let fx = Fixture::new();
    fx.transport.push("/", LANDING_PAGE);
    fx.transport.push("/web/online.do", ONLINE_PAGE);

    let options = LoginOptions {
        user: Some("user@nauta.com.cu".into()),
        password: Some("secret".into()),
        remember: true,
    };
    let ok = fx.run(Action::Login, &options).await;

    assert!(ok);
    let saved = fx.sessions.active_session().unwrap().unwrap();
    assert_eq!(saved.attribute_uuid(), Some("UUID-1"));
    assert_eq!(
        fx.credentials.load(),
        Some(Credentials::new("user@nauta.com.cu", "secret"))
    );
}

#[tokio::test]
async fn test_login_uses_remembered_credentials() {
    let fx = Fixture::new();
    fx.credentials
        .save(&Credentials::new("user@nauta.com.cu", "secret"))
        .unwrap();
    fx.transport.push("/", LANDING_PAGE);
    fx.transport.push("/web/online.do", ONLINE_PAGE);

    let ok = fx.run(Action::Login, &LoginOptions::default()).await;

    assert!(ok);
    assert_eq!(fx.transport.calls(), 2);
}

#[tokio::test]
async fn test_status_without_saved_session_is_offline() {
    let fx = Fixture::new();
    let mut rx = fx.events.subscribe();

    let ok = fx.run(Action::Status, &LoginOptions::default()).await;

    assert!(!ok);
    assert_eq!(fx.transport.calls(), 0);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, PortalEvent::Status { .. })));
}

#[tokio::test]
async fn test_status_expiry_deletes_saved_session() {
    let fx = Fixture::new();
    fx.save_session();
    fx.transport.push("/EtecsaQueryServlet", "errorop");

    let ok = fx.run(Action::Status, &LoginOptions::default()).await;

    assert!(!ok);
    assert!(fx.sessions.active_session().unwrap().is_none());
}

#[tokio::test]
async fn test_logout_deletes_saved_session() {
    let fx = Fixture::new();
    fx.save_session();
    fx.transport.push("/LogoutServlet", "SUCCESS");

    let ok = fx.run(Action::Logout, &LoginOptions::default()).await;

    assert!(ok);
    assert!(!fx.sessions.path().exists());
}

#[tokio::test]
async fn test_failed_logout_keeps_saved_session() {
    let fx = Fixture::new();
    fx.save_session();
    fx.transport.push("/LogoutServlet", "FAILURE");

    let ok = fx.run(Action::Logout, &LoginOptions::default()).await;

    assert!(!ok);
    assert!(fx.sessions.path().exists());
}

#[tokio::test]
async fn test_prepare_resolves_prompts_before_any_request() {
    let fx = Fixture::new();
    let mut answers = Answers::new(&["user@nauta.com.cu", "secret"]);

    let command = fx
        .handler()
        .prepare(Action::Login, &LoginOptions::default(), &mut answers)
        .unwrap();

    assert_eq!(
        command,
        Some(Command::Login {
            credentials: Credentials::new("user@nauta.com.cu", "secret"),
            remember: false,
        })
    );
    assert_eq!(answers.asked, 2);
    assert_eq!(fx.transport.calls(), 0);
}

#[tokio::test]
async fn test_prepare_empty_answer_yields_no_command() {
    let fx = Fixture::new();
    let mut answers = Answers::new(&[""]);

    let command = fx
        .handler()
        .prepare(Action::Login, &LoginOptions::default(), &mut answers)
        .unwrap();

    assert!(command.is_none());
}

#[tokio::test]
async fn test_cancelled_token_skips_command() {
    let fx = Fixture::new();
    fx.transport.push("/", LANDING_PAGE);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let command = Command::Login {
        credentials: Credentials::new("user@nauta.com.cu", "secret"),
        remember: true,
    };
    let ok = fx.handler().execute(command, &cancel).await.unwrap();

    assert!(!ok);
    assert_eq!(fx.transport.calls(), 0);
    assert!(fx.credentials.load().is_none());
}
