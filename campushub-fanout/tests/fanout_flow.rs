//! Integration tests for communication fan-out
//!
//! Drives the coordinator end-to-end: audience resolution, live broadcast
//! to connected sessions, durable enqueue, worker delivery, and the
//! operator retry/status surface.
//!
//! Run with: cargo test --test fanout_flow

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use campushub_core::channel::DeliveryChannel;
use campushub_core::directory::Directory;
use campushub_core::dispatch::{
    DeliveryWorker, DispatchPolicy, DispatchQueue, JobStore, MemoryJobStore, WorkerPool,
};
use campushub_core::models::{
    AudienceSpec, Communication, CommunicationId, CommunicationKind, JobStatus, RecipientId,
    RecipientIdentity, Role, RoomId, TenantId,
};
use campushub_core::service::AudienceResolver;
use campushub_core::store::Store;
use campushub_core::{Error, Result};
use campushub_fanout::{Broadcaster, ConnectionRegistry, FanoutCoordinator};

/// Directory fixture with a switchable outage
struct StaticDirectory {
    identities: Mutex<Vec<RecipientIdentity>>,
    down: AtomicBool,
}

impl StaticDirectory {
    fn new(identities: Vec<RecipientIdentity>) -> Arc<Self> {
        Arc::new(Self {
            identities: Mutex::new(identities),
            down: AtomicBool::new(false),
        })
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn add(&self, identity: RecipientIdentity) {
        self.identities.lock().push(identity);
    }

    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::DirectoryUnavailable(
                "directory is down".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn members_of_role(
        &self,
        tenant_id: &TenantId,
        role: Role,
    ) -> Result<Vec<RecipientIdentity>> {
        self.check()?;
        Ok(self
            .identities
            .lock()
            .iter()
            .filter(|i| i.tenant_id == *tenant_id && i.role == role)
            .cloned()
            .collect())
    }

    async fn identity(
        &self,
        tenant_id: &TenantId,
        recipient_id: &RecipientId,
    ) -> Result<Option<RecipientIdentity>> {
        self.check()?;
        Ok(self
            .identities
            .lock()
            .iter()
            .find(|i| i.tenant_id == *tenant_id && i.id == *recipient_id)
            .cloned())
    }
}

/// Store fixture holding communications
#[derive(Default)]
struct SharedStore {
    communications: Mutex<HashMap<String, Communication>>,
}

impl SharedStore {
    fn with(communication: &Communication) -> Arc<Self> {
        let store = Self::default();
        store
            .communications
            .lock()
            .insert(communication.id.as_str().to_string(), communication.clone());
        Arc::new(store)
    }
}

#[async_trait]
impl Store for SharedStore {
    async fn communication(&self, id: &CommunicationId) -> Result<Option<Communication>> {
        Ok(self.communications.lock().get(id.as_str()).cloned())
    }

    async fn append_room_message(
        &self,
        _tenant_id: &TenantId,
        _room_id: &RoomId,
        _sender_id: &RecipientId,
        _body: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// Channel fixture recording sends, optionally failing them all
struct RecordingChannel {
    failing: AtomicBool,
    sent: Mutex<Vec<String>>,
}

impl RecordingChannel {
    fn reliable() -> Arc<Self> {
        Arc::new(Self {
            failing: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn always_failing() -> Arc<Self> {
        Arc::new(Self {
            failing: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send(&self, address: &str, _subject: &str, _body: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::DeliveryAttemptFailed("smtp 451".to_string()));
        }
        self.sent.lock().push(address.to_string());
        Ok(())
    }
}

fn identity(tenant: &str, id: &str, role: Role) -> RecipientIdentity {
    RecipientIdentity {
        id: RecipientId::from_string(id.to_string()),
        tenant_id: TenantId::from_string(tenant.to_string()),
        display_name: id.to_string(),
        email: format!("{id}@example.com"),
        role,
    }
}

fn fast_policy() -> DispatchPolicy {
    DispatchPolicy {
        max_attempts: 5,
        backoff_min: Duration::from_millis(10),
        backoff_max: Duration::from_millis(40),
        attempt_timeout: Duration::from_millis(250),
        poll_interval: Duration::from_millis(10),
        visibility_timeout: Duration::from_secs(5),
    }
}

struct Fixture {
    directory: Arc<StaticDirectory>,
    registry: ConnectionRegistry,
    coordinator: FanoutCoordinator,
    queue: DispatchQueue,
    jobs: Arc<dyn JobStore>,
    store: Arc<SharedStore>,
}

fn fixture(communication: &Communication, identities: Vec<RecipientIdentity>) -> Fixture {
    let directory = StaticDirectory::new(identities);
    let registry = ConnectionRegistry::default();
    let broadcaster = Broadcaster::new(registry.clone());
    let jobs: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let queue = DispatchQueue::new(Arc::clone(&jobs));
    let store = SharedStore::with(communication);
    let coordinator = FanoutCoordinator::new(
        AudienceResolver::new(Arc::clone(&directory) as Arc<dyn Directory>),
        broadcaster,
        queue.clone(),
        Arc::clone(&store) as Arc<dyn Store>,
    );
    Fixture {
        directory,
        registry,
        coordinator,
        queue,
        jobs,
        store,
    }
}

async fn wait_for_status(
    queue: &DispatchQueue,
    communication_id: &CommunicationId,
    wanted: JobStatus,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(job) = queue
            .status_for_communication(communication_id)
            .await
            .unwrap()
        {
            if job.status == wanted {
                return;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "communication {communication_id} never reached {wanted}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_dispatch_reaches_every_live_session_exactly_once() {
    let communication = Communication::new(
        TenantId::from_string("t1".to_string()),
        RecipientId::from_string("admin".to_string()),
        "Sports day".to_string(),
        "Friday, 9am on the main field.".to_string(),
        CommunicationKind::Event,
        AudienceSpec {
            roles: vec![],
            recipients: vec![
                RecipientId::from_string("u1".to_string()),
                RecipientId::from_string("u2".to_string()),
            ],
        },
    );
    let fx = fixture(
        &communication,
        vec![
            identity("t1", "u1", Role::Student),
            identity("t1", "u2", Role::Teacher),
        ],
    );

    // U1 is connected twice (two devices), U2 once
    let (_s1, mut rx1a) = fx
        .registry
        .connect(
            RecipientId::from_string("u1".to_string()),
            TenantId::from_string("t1".to_string()),
            "u1".to_string(),
        )
        .unwrap();
    let (_s2, mut rx1b) = fx
        .registry
        .connect(
            RecipientId::from_string("u1".to_string()),
            TenantId::from_string("t1".to_string()),
            "u1".to_string(),
        )
        .unwrap();
    let (_s3, mut rx2) = fx
        .registry
        .connect(
            RecipientId::from_string("u2".to_string()),
            TenantId::from_string("t1".to_string()),
            "u2".to_string(),
        )
        .unwrap();

    let outcome = fx.coordinator.dispatch(&communication).await.unwrap();
    assert_eq!(outcome.audience_size, 2);
    assert_eq!(outcome.live_sessions_notified, 3);
    assert!(!outcome.duplicate);

    // Each session sees exactly one event
    for rx in [&mut rx1a, &mut rx1b, &mut rx2] {
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "communication_created");
        let extra = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(extra.is_err(), "session received a duplicate event");
    }

    // And the durable job carries both contact addresses
    let job = fx.queue.job(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(
        job.targets,
        vec!["u1@example.com".to_string(), "u2@example.com".to_string()]
    );
}

#[tokio::test]
async fn test_directory_outage_aborts_dispatch_entirely() {
    let communication = Communication::new(
        TenantId::from_string("t1".to_string()),
        RecipientId::from_string("admin".to_string()),
        "Closure".to_string(),
        "School closed tomorrow.".to_string(),
        CommunicationKind::Emergency,
        AudienceSpec {
            roles: vec![Role::Student],
            recipients: vec![],
        },
    );
    let fx = fixture(&communication, vec![identity("t1", "u1", Role::Student)]);
    fx.directory.set_down(true);

    let (_s1, mut rx1) = fx
        .registry
        .connect(
            RecipientId::from_string("u1".to_string()),
            TenantId::from_string("t1".to_string()),
            "u1".to_string(),
        )
        .unwrap();

    let err = fx.coordinator.dispatch(&communication).await.unwrap_err();
    assert!(matches!(err, Error::DirectoryUnavailable(_)));

    // Nothing was broadcast and nothing was enqueued
    let nothing = tokio::time::timeout(Duration::from_millis(50), rx1.recv()).await;
    assert!(nothing.is_err());
    assert!(fx
        .queue
        .status_for_communication(&communication.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_duplicate_dispatch_does_not_double_enqueue() {
    let communication = Communication::new(
        TenantId::from_string("t1".to_string()),
        RecipientId::from_string("admin".to_string()),
        "Reminder".to_string(),
        "Parent-teacher meetings next week.".to_string(),
        CommunicationKind::Announcement,
        AudienceSpec {
            roles: vec![Role::Guardian],
            recipients: vec![],
        },
    );
    let fx = fixture(&communication, vec![identity("t1", "g1", Role::Guardian)]);

    let first = fx.coordinator.dispatch(&communication).await.unwrap();
    let second = fx.coordinator.dispatch(&communication).await.unwrap();

    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(first.job_id, second.job_id);
    assert_eq!(
        fx.jobs
            .jobs_for_communication(&communication.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_empty_audience_dispatch_trivially_succeeds() {
    let communication = Communication::new(
        TenantId::from_string("t1".to_string()),
        RecipientId::from_string("admin".to_string()),
        "Draft".to_string(),
        "Not addressed to anyone yet.".to_string(),
        CommunicationKind::Announcement,
        AudienceSpec {
            roles: vec![Role::Guardian], // no guardians exist
            recipients: vec![],
        },
    );
    let fx = fixture(&communication, vec![]);

    let channel = RecordingChannel::reliable();
    let worker = DeliveryWorker::new(
        Arc::clone(&fx.jobs),
        Arc::clone(&fx.store) as Arc<dyn Store>,
        channel.clone(),
        fast_policy(),
    );
    let pool = WorkerPool::spawn(worker, 1);

    let outcome = fx.coordinator.dispatch(&communication).await.unwrap();
    assert_eq!(outcome.audience_size, 0);

    wait_for_status(&fx.queue, &communication.id, JobStatus::Succeeded).await;
    pool.shutdown().await;

    let job = fx.queue.job(&outcome.job_id).await.unwrap().unwrap();
    assert!(job.targets.is_empty());
    assert!(channel.sent.lock().is_empty());
}

#[tokio::test]
async fn test_permanent_failure_then_operator_retry() {
    let communication = Communication::new(
        TenantId::from_string("t1".to_string()),
        RecipientId::from_string("admin".to_string()),
        "Fees".to_string(),
        "Term fees are overdue.".to_string(),
        CommunicationKind::FeeReminder,
        AudienceSpec {
            roles: vec![Role::Guardian],
            recipients: vec![],
        },
    );
    let fx = fixture(&communication, vec![identity("t1", "g1", Role::Guardian)]);

    let channel = RecordingChannel::always_failing();
    let worker = DeliveryWorker::new(
        Arc::clone(&fx.jobs),
        Arc::clone(&fx.store) as Arc<dyn Store>,
        channel.clone(),
        fast_policy(),
    );
    let pool = WorkerPool::spawn(worker, 1);

    let outcome = fx.coordinator.dispatch(&communication).await.unwrap();
    wait_for_status(&fx.queue, &communication.id, JobStatus::FailedPermanent).await;

    let status = fx
        .coordinator
        .dispatch_status(&communication.id)
        .await
        .unwrap();
    assert_eq!(status.status, JobStatus::FailedPermanent);
    assert_eq!(status.attempts, 5);
    assert!(status.last_error.is_some());

    // A guardian joined the role after the failure; the retry resolves
    // the audience fresh and picks them up.
    fx.directory.add(identity("t1", "g2", Role::Guardian));
    channel.failing.store(false, Ordering::SeqCst);

    let retry_id = fx.coordinator.retry_delivery(&communication.id).await.unwrap();
    assert_ne!(retry_id, outcome.job_id);

    wait_for_status(&fx.queue, &communication.id, JobStatus::Succeeded).await;
    pool.shutdown().await;

    let retry_job = fx.queue.job(&retry_id).await.unwrap().unwrap();
    assert_eq!(retry_job.status, JobStatus::Succeeded);
    assert_eq!(
        retry_job.targets,
        vec!["g1@example.com".to_string(), "g2@example.com".to_string()]
    );

    // The original job's record is untouched history
    let original = fx.queue.job(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(original.status, JobStatus::FailedPermanent);
}

#[tokio::test]
async fn test_dispatch_status_unknown_communication() {
    let communication = Communication::new(
        TenantId::from_string("t1".to_string()),
        RecipientId::from_string("admin".to_string()),
        "x".to_string(),
        "y".to_string(),
        CommunicationKind::Announcement,
        AudienceSpec::default(),
    );
    let fx = fixture(&communication, vec![]);

    let err = fx
        .coordinator
        .dispatch_status(&CommunicationId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = fx
        .coordinator
        .retry_delivery(&CommunicationId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
