//! NautaConnect CLI entry point.

use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, CommandFactory, Parser};

use nauta_connect::{
    CancellationToken, CookieJar, EventBus, HttpTransport, PortalConfig, PortalSession,
    SessionStore,
};
use nauta_connect_cli::config::{resolve_credentials_path, resolve_session_path};
use nauta_connect_cli::credentials::FileCredentialStore;
use nauta_connect_cli::handler::{Action, CommandHandler, LoginOptions, StdinPrompt};
use nauta_connect_cli::render::print_events;

#[derive(Parser)]
#[command(
    name = "nauta-connect",
    about = "Log in to and out of the ETECSA Nauta captive portal",
    version
)]
#[command(group(ArgGroup::new("action").args(["login", "logout", "status"])))]
struct Cli {
    /// Log in to the portal.
    #[arg(short = 'l', long)]
    login: bool,

    /// Close the active session.
    #[arg(short = 'o', long)]
    logout: bool,

    /// Show the connection status and remaining time.
    #[arg(short = 's', long)]
    status: bool,

    /// Account name (e.g. user@nauta.com.cu).
    #[arg(short = 'u', long)]
    user: Option<String>,

    /// Account password.
    #[arg(short = 'p', long = "pass")]
    password: Option<String>,

    /// Remember the credentials after a successful login.
    #[arg(short = 'r', long)]
    remember: bool,

    /// Show HTTP request details.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Portal base URL.
    /// Also reads from NAUTA_PORTAL_URL env var.
    #[arg(long)]
    portal: Option<String>,

    /// Accept invalid TLS certificates from the portal.
    #[arg(long)]
    insecure: bool,

    /// Path to the saved session file.
    #[arg(long)]
    session_file: Option<String>,

    /// Path to the remembered credentials file.
    #[arg(long)]
    credentials_file: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn action(&self) -> Option<Action> {
        if self.login {
            Some(Action::Login)
        } else if self.logout {
            Some(Action::Logout)
        } else if self.status {
            Some(Action::Status)
        } else {
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let Some(action) = cli.action() else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = PortalConfig::from_env();
    if let Some(portal) = &cli.portal {
        config.base_url = PortalConfig::with_base_url(portal)
            .with_context(|| format!("invalid portal URL: {portal}"))?
            .base_url;
    }
    if cli.insecure {
        config.accept_invalid_certs = true;
    }

    let events = EventBus::default();
    let printer = tokio::spawn(print_events(events.subscribe(), std::io::stdout()));

    let transport = HttpTransport::new(&config, CookieJar::new())?.with_events(events.clone());
    let session = PortalSession::new(Arc::new(transport), config, events);

    let sessions = SessionStore::new(resolve_session_path(cli.session_file.as_deref()));
    let credentials =
        FileCredentialStore::new(resolve_credentials_path(cli.credentials_file.as_deref()));
    tracing::debug!(
        session_file = %sessions.path().display(),
        credentials_file = %credentials.path().display(),
        "data files"
    );

    let options = LoginOptions {
        user: cli.user.clone(),
        password: cli.password.clone(),
        remember: cli.remember,
    };

    let mut handler = CommandHandler::new(session, sessions, credentials);

    // Prompts block the runtime thread; Ctrl-C keeps its default meaning
    // until they are answered.
    let succeeded = match handler.prepare(action, &options, &mut StdinPrompt) {
        Ok(Some(command)) => {
            let cancel = CancellationToken::new();
            let interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    interrupt.cancel();
                }
            });
            handler.execute(command, &cancel).await
        }
        Ok(None) => Ok(false),
        Err(e) => Err(e),
    };

    // Dropping the last sender lets the printer drain and exit.
    drop(handler);
    printer.await?;

    if !succeeded? {
        std::process::exit(1);
    }
    Ok(())
}
