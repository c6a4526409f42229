use std::sync::Arc;

use tracing::{info, warn};

use crate::messaging::MessagingClient;
use crate::recipients::RecipientStore;
use crate::scheduler::Scheduler;
use crate::session::{ClientEvent, SessionMonitor};

/// Ask the client for its connection state and feed it to the monitor.
/// An unreachable client counts as disconnected.
pub async fn poll_connection(client: &dyn MessagingClient, session: &SessionMonitor) {
    match client.connection_state().await {
        Ok(event) => session.apply(event),
        Err(e) => {
            if session.is_ready() {
                warn!("Connection state poll failed: {}", e);
            }
            session.apply(ClientEvent::Disconnected(e.to_string()));
        }
    }
}

/// Register the relay's background jobs.
pub async fn register_builtin_tasks(
    scheduler: &mut Scheduler,
    poll_cron: &str,
    client: Arc<dyn MessagingClient>,
    session: Arc<SessionMonitor>,
    store: Arc<RecipientStore>,
) -> anyhow::Result<()> {
    scheduler
        .add_connection_poll(poll_cron, client, session.clone())
        .await?;

    // Heartbeat: hourly summary of readiness and configured targets
    scheduler
        .add_cron_job("0 0 * * * *", "heartbeat", move || {
            let ready = session.is_ready();
            let targets = store.live().len();
            Box::pin(async move {
                info!("Heartbeat: whatsapp_ready={} targets={}", ready, targets);
            })
        })
        .await?;

    Ok(())
}
