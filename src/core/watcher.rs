//! Idle-timeout watcher
//!
//! One watcher per session, spawned at connect time. Polls the time since
//! the last voiced frame and tears the session down once it exceeds the
//! configured limit, telling the client first so the close is explicable.

use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::info;

use super::events::{MessageRoute, OutgoingEvent};
use super::session::{cleanup, SharedSession};

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub async fn watch_idle(
    session: SharedSession,
    routes: mpsc::Sender<MessageRoute>,
    timeout: Duration,
) {
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;

        let (id, idle) = {
            let s = session.read().await;
            (s.id.clone(), s.last_speech.elapsed())
        };

        if idle > timeout {
            info!(session_id = %id, idle_secs = idle.as_secs(), "session idle, closing");
            let _ = routes
                .send(MessageRoute::Event(OutgoingEvent::timeout_status()))
                .await;
            // Detach our own handle so cleanup does not abort us mid-teardown
            drop(session.write().await.take_timeout_task());
            cleanup(&session).await;
            let _ = routes.send(MessageRoute::Close).await;
            return;
        }
    }
}
