//! Subsystem initialization and dependency injection
//!
//! Wires the fan-out components together from configuration: job store
//! (Redis or in-memory), dispatch queue, delivery workers, connection
//! registry, broadcaster, session gateway, and coordinator. The caller
//! supplies the two external collaborators — Directory and Store — and
//! must run inside a tokio runtime (workers are spawned on it).

use std::sync::Arc;

use tracing::{info, warn};

use campushub_core::directory::Directory;
use campushub_core::dispatch::{
    job_store_from_config, DeliveryWorker, DispatchPolicy, DispatchQueue, WorkerPool,
};
use campushub_core::service::{AudienceResolver, SmtpChannel};
use campushub_core::store::Store;
use campushub_core::{Config, Result};

use crate::broadcast::Broadcaster;
use crate::coordinator::FanoutCoordinator;
use crate::registry::{ConnectionRegistry, RegistryLimits};
use crate::session::SessionGateway;

/// Container for the initialized fan-out subsystem
pub struct FanoutStack {
    pub registry: ConnectionRegistry,
    pub broadcaster: Broadcaster,
    pub gateway: SessionGateway,
    pub coordinator: FanoutCoordinator,
    pub queue: DispatchQueue,
    workers: WorkerPool,
}

impl std::fmt::Debug for FanoutStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutStack").finish()
    }
}

impl FanoutStack {
    /// Drain the workers and force-close every live session
    pub async fn shutdown(self) {
        self.workers.shutdown().await;
        self.registry.shutdown();
        info!("Fan-out subsystem shut down");
    }
}

/// Initialize the fan-out subsystem
pub fn init_fanout(
    config: &Config,
    directory: Arc<dyn Directory>,
    store: Arc<dyn Store>,
) -> Result<FanoutStack> {
    info!("Initializing communication fan-out...");

    let policy = DispatchPolicy::from(&config.dispatch);
    let jobs = job_store_from_config(&config.redis, &policy)?;
    let queue = DispatchQueue::new(Arc::clone(&jobs));

    if !config.smtp.is_configured() {
        warn!("SMTP not configured, delivery attempts will fail until it is");
    }
    let channel = Arc::new(SmtpChannel::new(config.smtp.clone()));

    let worker = DeliveryWorker::new(jobs, Arc::clone(&store), channel, policy);
    let workers = WorkerPool::spawn(worker, config.dispatch.worker_count);

    let registry = ConnectionRegistry::new(RegistryLimits::default());
    let broadcaster = Broadcaster::new(registry.clone());
    let gateway = SessionGateway::new(
        registry.clone(),
        broadcaster.clone(),
        Arc::clone(&store),
    );
    let coordinator = FanoutCoordinator::new(
        AudienceResolver::new(directory),
        broadcaster.clone(),
        queue.clone(),
        store,
    );

    info!(
        workers = config.dispatch.worker_count,
        "Communication fan-out initialized"
    );

    Ok(FanoutStack {
        registry,
        broadcaster,
        gateway,
        coordinator,
        queue,
        workers,
    })
}
