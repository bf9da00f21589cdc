//! Console rendering of portal events.

use std::io::Write;
use std::time::Duration;

use nauta_connect::PortalEvent;
use tokio::sync::broadcast;

/// One console line for `event`.
pub fn render_event(event: &PortalEvent) -> String {
    match event {
        PortalEvent::Status { message } => format!("[*] {message}"),
        PortalEvent::Error { message, .. } => format!("[!] ERROR: {message}"),
        PortalEvent::ConnectionState { connected: true } => "[+] Status: online".to_string(),
        PortalEvent::ConnectionState { connected: false } => {
            "[-] Status: disconnected".to_string()
        }
        PortalEvent::TimeRemaining { remaining } => {
            format!("Time remaining: {}", format_duration(*remaining))
        }
        PortalEvent::Retry(notice) => {
            format!("[*] [retry {}/{}]", notice.retry, notice.total_retries)
        }
    }
}

/// `HH:MM:SS`, hours not wrapped at 24.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

/// Print events until every sender is dropped.
pub async fn print_events(mut rx: broadcast::Receiver<PortalEvent>, out: impl Write) {
    let mut out = out;
    loop {
        match rx.recv().await {
            Ok(event) => {
                let _ = writeln!(out, "{}", render_event(&event));
                let _ = out.flush();
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "console fell behind on events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
