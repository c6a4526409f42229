pub mod tasks;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};

use crate::messaging::MessagingClient;
use crate::session::SessionMonitor;

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Cron-driven background jobs (connection polling, heartbeat).
pub struct Scheduler {
    inner: JobScheduler,
    jobs: Vec<String>,
}

impl Scheduler {
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self {
            inner,
            jobs: Vec::new(),
        })
    }

    /// Add a recurring job. `cron_expr` uses the six-field form with seconds.
    pub async fn add_cron_job<F>(&mut self, cron_expr: &str, name: &str, task: F) -> Result<()>
    where
        F: Fn() -> JobFuture + Send + Sync + 'static,
    {
        let job_name = name.to_string();
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let name = job_name.clone();
            let fut = task();
            Box::pin(async move {
                debug!("Running scheduled job: {}", name);
                fut.await;
            })
        })
        .with_context(|| format!("Invalid cron expression for job '{}': {}", name, cron_expr))?;

        self.inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job: {}", name))?;

        info!("Scheduled job '{}' with cron: {}", name, cron_expr);
        self.jobs.push(name.to_string());
        Ok(())
    }

    /// Keep the session monitor in sync with the gateway's reported state.
    pub async fn add_connection_poll(
        &mut self,
        cron_expr: &str,
        client: Arc<dyn MessagingClient>,
        session: Arc<SessionMonitor>,
    ) -> Result<()> {
        self.add_cron_job(cron_expr, "connection-poll", move || {
            let client = client.clone();
            let session = session.clone();
            Box::pin(async move {
                tasks::poll_connection(client.as_ref(), &session).await;
            })
        })
        .await
    }

    /// Names of registered jobs, in registration order.
    pub fn jobs(&self) -> &[String] {
        &self.jobs
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        info!("Scheduler started with jobs: {}", self.jobs.join(", "));
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .context("Failed to shutdown scheduler")?;
        info!("Scheduler stopped");
        Ok(())
    }
}
