mod alarm;
mod config;
mod delivery;
mod messaging;
mod recipients;
mod scheduler;
mod server;
mod session;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::delivery::Delivery;
use crate::messaging::gateway::GatewayClient;
use crate::messaging::MessagingClient;
use crate::recipients::RecipientStore;
use crate::scheduler::{tasks, Scheduler};
use crate::server::AppState;
use crate::session::SessionMonitor;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,salto_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Gateway: {}", config.gateway.base_url);
    info!("  Send delay: {}ms", config.delivery.send_delay_ms);

    let store = Arc::new(RecipientStore::open(
        config.recipients.env_file.clone(),
        config.recipients.key.clone(),
    ));
    info!("  Targets file: {}", store.path().display());

    let client: Arc<dyn MessagingClient> = Arc::new(GatewayClient::new(config.gateway.clone()));
    let session = Arc::new(SessionMonitor::new());

    // Announce readiness transitions with the current target count
    {
        let mut rx = session.subscribe();
        let store = store.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let ready = rx.borrow_and_update().ready;
                if ready {
                    info!("Ready to deliver to {} configured targets", store.list().len());
                }
            }
        });
    }

    // Learn the connection state before accepting webhooks
    tasks::poll_connection(client.as_ref(), &session).await;

    let mut scheduler = Scheduler::new().await?;
    tasks::register_builtin_tasks(
        &mut scheduler,
        &config.gateway.status_poll_cron,
        client.clone(),
        session.clone(),
        store.clone(),
    )
    .await?;
    scheduler.start().await?;

    let state = Arc::new(AppState {
        delivery: Delivery::new(client.clone(), store.clone(), config.delivery.send_delay()),
        store,
        session,
        client,
        port: config.server.port,
        test_message: config.delivery.test_message.clone(),
    });

    server::run(state, &config.server.bind).await?;

    scheduler.shutdown().await?;
    Ok(())
}
