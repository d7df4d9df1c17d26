//! Public entry point of the notifier.

use std::sync::Arc;

use notifier_core::{
    ClusterManager, DriverConnector, NotificationCall, NotifierMetrics, NotifierSettings,
    ResourceGrant, SessionHandle, SessionRegistry,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::context::SessionNotificationContext;
use crate::error::NotifierError;
use crate::retry::RetryPolicy;
use crate::router::ShardRouter;
use crate::worker::NotifierWorker;

/// Non-blocking front end that routes notifications to a fixed pool of
/// [`NotifierWorker`]s.
///
/// Every notify/delete method is synchronous and never touches the network,
/// so it is safe to call from the cluster manager's decision path.
pub struct SessionNotifier {
    router: ShardRouter,
    workers: Vec<Arc<NotifierWorker>>,
    registry: Arc<dyn SessionRegistry>,
    metrics: Arc<dyn NotifierMetrics>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionNotifier {
    /// Spawn `settings.thread_count` workers on the current tokio runtime.
    pub fn start(
        settings: &NotifierSettings,
        registry: Arc<dyn SessionRegistry>,
        cluster_manager: Arc<dyn ClusterManager>,
        metrics: Arc<dyn NotifierMetrics>,
        connector: Arc<dyn DriverConnector>,
    ) -> Result<Self, NotifierError> {
        if settings.thread_count == 0 {
            return Err(NotifierError::InvalidConfig(
                "thread_count must be at least 1".into(),
            ));
        }
        if settings.poll_interval_ms == 0 {
            return Err(NotifierError::InvalidConfig(
                "poll_interval_ms must be positive".into(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| NotifierError::Runtime(e.to_string()))?;

        let policy = RetryPolicy::from(&settings.retry);
        let cancel = CancellationToken::new();
        let workers: Vec<Arc<NotifierWorker>> = (0..settings.thread_count)
            .map(|index| {
                Arc::new(NotifierWorker::new(
                    index,
                    settings.poll_interval(),
                    policy.clone(),
                    Arc::clone(&connector),
                    Arc::clone(&cluster_manager),
                    Arc::clone(&metrics),
                ))
            })
            .collect();
        let tasks: Vec<JoinHandle<()>> = workers
            .iter()
            .map(|worker| runtime.spawn(Arc::clone(worker).run(cancel.child_token())))
            .collect();

        info!(
            workers = settings.thread_count,
            poll_interval_ms = settings.poll_interval_ms,
            max_retries = settings.retry.max_retries,
            "session notifier started"
        );

        Ok(Self {
            router: ShardRouter::new(settings.thread_count),
            workers,
            registry,
            metrics,
            cancel,
            tasks: Mutex::new(tasks),
        })
    }

    /// Tell the session's driver it was granted `grants`.
    #[instrument(skip_all, fields(session_id = %handle, grants = grants.len()))]
    pub fn notify_grant_resource(&self, handle: &SessionHandle, grants: Vec<ResourceGrant>) {
        for grant in &grants {
            self.metrics.grant_resource(grant.resource_type);
        }
        self.add_call(NotificationCall::GrantResource {
            handle: handle.clone(),
            grants,
        });
    }

    /// Tell the session's driver to give `grants` back.
    #[instrument(skip_all, fields(session_id = %handle, grants = grants.len(), force = force))]
    pub fn notify_revoke_resource(
        &self,
        handle: &SessionHandle,
        grants: Vec<ResourceGrant>,
        force: bool,
    ) {
        for grant in &grants {
            self.metrics.revoke_resource(grant.resource_type);
        }
        self.add_call(NotificationCall::RevokeResource {
            handle: handle.clone(),
            grants,
            force,
        });
    }

    /// Tell the session's driver that `node` died.
    #[instrument(skip_all, fields(session_id = %handle, %node))]
    pub fn notify_dead_node(&self, handle: &SessionHandle, node: &str) {
        self.add_call(NotificationCall::DeadNode {
            handle: handle.clone(),
            node: node.to_string(),
        });
    }

    /// Drop the session's context. Calls queued for it are discarded; calls
    /// made afterwards start a fresh context.
    #[instrument(skip_all, fields(session_id = %handle))]
    pub fn delete_session(&self, handle: &SessionHandle) {
        let worker = self.worker_for(handle);
        if worker.delete_session(handle) {
            debug!(worker = worker.index(), "session marked for deletion");
        }
    }

    /// Calls queued but not yet acknowledged, across all sessions.
    pub fn num_pending_calls(&self) -> usize {
        self.workers.iter().map(|w| w.num_pending_calls()).sum()
    }

    pub fn num_contexts(&self) -> usize {
        self.workers.iter().map(|w| w.num_contexts()).sum()
    }

    /// The live context for `handle`, if one exists.
    pub fn context(&self, handle: &SessionHandle) -> Option<Arc<SessionNotificationContext>> {
        self.worker_for(handle).context(handle)
    }

    /// Stop all workers at their next wait point and close every context.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "notifier worker ended abnormally");
            }
        }
        info!("session notifier stopped");
    }

    fn worker_for(&self, handle: &SessionHandle) -> &NotifierWorker {
        &self.workers[self.router.route(handle)]
    }

    fn add_call(&self, call: NotificationCall) {
        if self.cancel.is_cancelled() {
            warn!(method = call.method(), "notifier stopped, dropping notification");
            return;
        }
        let info = match self.registry.session(call.handle()) {
            Ok(info) => info,
            Err(e) => {
                warn!(method = call.method(), error = %e, "dropping notification for unknown session");
                return;
            }
        };
        let worker = self.worker_for(call.handle());
        debug!(worker = worker.index(), method = call.method(), "notification queued");
        worker.add_call(info.address, call);
    }
}

impl Drop for SessionNotifier {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use notifier_core::{HostPort, ResourceType, SessionStatus, StaticSessionRegistry};
    use notifier_telemetry::capture_logs;

    use crate::mock::{MockConnector, MockOutcome, RecordingClusterManager, RecordingMetrics};

    fn handle(s: &str) -> SessionHandle {
        SessionHandle::new(s).unwrap()
    }

    fn grant(id: u32, resource_type: ResourceType) -> ResourceGrant {
        ResourceGrant::new(id, resource_type, "node-1", HostPort::new("10.0.0.1", 50060))
    }

    fn driver_address(session: &str) -> HostPort {
        HostPort::new(format!("{session}.driver"), 9000)
    }

    struct Fixture {
        notifier: SessionNotifier,
        registry: Arc<StaticSessionRegistry>,
        connector: MockConnector,
        cluster_manager: Arc<RecordingClusterManager>,
        metrics: Arc<RecordingMetrics>,
    }

    fn settings(threads: usize, max_retries: u32) -> NotifierSettings {
        let mut settings = NotifierSettings {
            poll_interval_ms: 20,
            thread_count: threads,
            ..NotifierSettings::default()
        };
        settings.retry.initial_interval_ms = 100;
        settings.retry.max_interval_ms = 1_000;
        settings.retry.max_retries = max_retries;
        settings
    }

    fn fixture_with(connector: MockConnector, settings: NotifierSettings, sessions: &[&str]) -> Fixture {
        let registry = Arc::new(StaticSessionRegistry::new());
        for s in sessions {
            registry.register(handle(s), driver_address(s));
        }
        let cluster_manager = Arc::new(RecordingClusterManager::new());
        let metrics = Arc::new(RecordingMetrics::new());
        let notifier = SessionNotifier::start(
            &settings,
            registry.clone(),
            cluster_manager.clone(),
            metrics.clone(),
            Arc::new(connector.clone()),
        )
        .unwrap();
        Fixture {
            notifier,
            registry,
            connector,
            cluster_manager,
            metrics,
        }
    }

    fn fixture(connector: MockConnector, sessions: &[&str]) -> Fixture {
        fixture_with(connector, settings(4, 2), sessions)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn grant_records_metrics_and_delivers_once() {
        let f = fixture(MockConnector::new(), &["s1"]);
        f.notifier.notify_grant_resource(
            &handle("s1"),
            vec![grant(1, ResourceType::Cpu), grant(2, ResourceType::Cpu)],
        );
        assert_eq!(f.metrics.grants(ResourceType::Cpu), 2);

        settle().await;
        let delivered = f.connector.delivered();
        assert_eq!(delivered.len(), 1);
        match &delivered[0] {
            NotificationCall::GrantResource { handle: h, grants } => {
                assert_eq!(h, &handle("s1"));
                assert_eq!(grants.len(), 2);
            }
            other => panic!("unexpected call {other:?}"),
        }
        assert_eq!(f.notifier.num_pending_calls(), 0);
        f.notifier.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dead_node_creates_context_with_resolved_address() {
        let f = fixture(MockConnector::new(), &["s2"]);
        assert!(f.notifier.context(&handle("s2")).is_none());

        f.notifier.notify_dead_node(&handle("s2"), "node-7");
        let ctx = f.notifier.context(&handle("s2")).unwrap();
        assert_eq!(ctx.address(), &driver_address("s2"));
        assert_eq!(ctx.pending_len(), 1);
        assert_eq!(f.notifier.num_pending_calls(), 1);
        assert_eq!(f.metrics.grants(ResourceType::Cpu), 0);

        settle().await;
        assert_eq!(
            f.connector.delivered(),
            vec![NotificationCall::DeadNode {
                handle: handle("s2"),
                node: "node-7".into(),
            }]
        );
        f.notifier.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_driver_times_out_session_once() {
        let f = fixture(MockConnector::failing(), &["s3"]);
        f.notifier
            .notify_revoke_resource(&handle("s3"), vec![grant(5, ResourceType::Map)], false);
        settle().await;

        assert_eq!(f.connector.attempts(), 3);
        assert_eq!(
            f.cluster_manager.ended(),
            vec![(handle("s3"), SessionStatus::TimedOut)]
        );

        f.notifier.notify_dead_node(&handle("s3"), "node-1");
        settle().await;
        assert_eq!(f.connector.attempts(), 3);
        assert_eq!(f.cluster_manager.ended().len(), 1);
        assert_eq!(f.metrics.revokes(ResourceType::Map), 1);
        assert_eq!(f.metrics.timed_out(), 1);
        f.notifier.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_session_warns_and_drops() {
        let (logs, _guard) = capture_logs();
        let f = fixture(MockConnector::new(), &["s1"]);

        f.notifier
            .notify_grant_resource(&handle("bad-handle"), vec![grant(1, ResourceType::Reduce)]);

        assert!(f.notifier.context(&handle("bad-handle")).is_none());
        assert_eq!(f.notifier.num_contexts(), 0);
        let warnings: Vec<_> = logs
            .events()
            .into_iter()
            .filter(|e| e.level == tracing::Level::WARN)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("unknown session"));
        f.notifier.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn delete_then_revoke_lands_in_fresh_context() {
        let f = fixture(MockConnector::new(), &["s4"]);
        f.notifier
            .notify_grant_resource(&handle("s4"), vec![grant(1, ResourceType::Cpu)]);
        settle().await;
        let old = f.notifier.context(&handle("s4")).unwrap();

        f.notifier.delete_session(&handle("s4"));
        f.notifier
            .notify_revoke_resource(&handle("s4"), vec![grant(1, ResourceType::Cpu)], true);
        let fresh = f.notifier.context(&handle("s4")).unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(fresh.pending_len(), 1);

        settle().await;
        assert!(old.is_closed());
        assert_eq!(f.connector.connects(), 2);
        assert_eq!(f.connector.closes(), 1);
        let delivered = f.connector.delivered_for(&handle("s4"));
        assert_eq!(delivered.len(), 2);
        assert!(matches!(
            delivered[1],
            NotificationCall::RevokeResource { force: true, .. }
        ));
        f.notifier.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn delete_during_delivery_stops_the_queue() {
        let connector = MockConnector::with_script(vec![MockOutcome::delayed(
            Duration::from_secs(1),
            MockOutcome::Deliver,
        )]);
        let f = fixture(connector, &["s5"]);
        f.notifier.notify_dead_node(&handle("s5"), "n1");
        f.notifier.notify_dead_node(&handle("s5"), "n2");

        // First call is in flight for one second.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.connector.attempts(), 1);
        f.notifier.delete_session(&handle("s5"));
        assert_eq!(f.notifier.num_pending_calls(), 0);

        settle().await;
        assert_eq!(f.connector.attempts(), 1);
        assert_eq!(f.connector.delivered().len(), 1);
        assert_eq!(f.connector.closes(), 1);
        f.notifier.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_session_failing_in_flight_is_not_ended() {
        let connector = MockConnector::with_script(vec![MockOutcome::delayed(
            Duration::from_secs(1),
            MockOutcome::io_failure(),
        )]);
        let f = fixture_with(connector, settings(1, 0), &["s9"]);
        f.notifier.notify_dead_node(&handle("s9"), "n1");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.connector.attempts(), 1);
        f.notifier.delete_session(&handle("s9"));

        settle().await;
        assert!(f.cluster_manager.ended().is_empty());
        assert_eq!(f.metrics.timed_out(), 0);
        assert_eq!(f.connector.attempts(), 1);
        f.notifier.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn order_preserved_across_retries_without_duplicates() {
        let connector = MockConnector::with_script(vec![
            MockOutcome::Deliver,
            MockOutcome::io_failure(),
            MockOutcome::io_failure(),
        ]);
        let f = fixture(connector, &["s6"]);
        let expected: Vec<NotificationCall> = (1..=5)
            .map(|i| NotificationCall::DeadNode {
                handle: handle("s6"),
                node: format!("node-{i}"),
            })
            .collect();
        for i in 1..=5 {
            f.notifier.notify_dead_node(&handle("s6"), &format!("node-{i}"));
        }

        settle().await;
        assert_eq!(f.connector.delivered(), expected);
        assert_eq!(f.connector.attempts(), 7);
        assert!(f.cluster_manager.ended().is_empty());
        f.notifier.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pending_calls_summed_across_workers() {
        let connector = MockConnector::new();
        let sessions = ["a", "b", "c", "d", "e", "f"];
        for s in sessions {
            connector.refuse(driver_address(s));
        }
        let f = fixture_with(connector, settings(3, 100), &sessions);

        for (i, s) in sessions.iter().enumerate() {
            for n in 0..=i {
                f.notifier.notify_dead_node(&handle(s), &format!("n{n}"));
            }
        }
        assert_eq!(f.notifier.num_pending_calls(), 21);

        // Still retrying; nothing delivered, nothing lost.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(f.notifier.num_pending_calls(), 21);
        assert_eq!(f.notifier.num_contexts(), 6);
        f.notifier.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_contexts_and_rejects_new_calls() {
        let f = fixture(MockConnector::new(), &["s7", "s8"]);
        f.notifier.notify_dead_node(&handle("s7"), "n");
        f.notifier.notify_dead_node(&handle("s8"), "n");
        settle().await;

        f.notifier.shutdown().await;
        assert_eq!(f.connector.closes(), 2);
        assert_eq!(f.notifier.num_contexts(), 0);

        f.notifier.notify_dead_node(&handle("s7"), "late");
        assert_eq!(f.notifier.num_pending_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn session_removed_from_registry_is_unknown() {
        let f = fixture(MockConnector::new(), &["s9"]);
        assert!(f.registry.remove(&handle("s9")));
        f.notifier.notify_dead_node(&handle("s9"), "n");
        assert_eq!(f.notifier.num_contexts(), 0);
        f.notifier.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_notifies_share_one_context() {
        let f = fixture_with(MockConnector::new(), settings(4, 2), &["hot"]);
        let notifier = Arc::new(f.notifier);
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let notifier = Arc::clone(&notifier);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    notifier.notify_dead_node(&handle("hot"), &format!("n{i}"));
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(notifier.num_contexts(), 1);

        for _ in 0..200 {
            if f.connector.delivered().len() == 8 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(f.connector.delivered().len(), 8);
        assert_eq!(f.connector.connects(), 1);
        notifier.shutdown().await;
    }

    #[tokio::test]
    async fn rejects_zero_workers() {
        let result = SessionNotifier::start(
            &NotifierSettings {
                thread_count: 0,
                ..NotifierSettings::default()
            },
            Arc::new(StaticSessionRegistry::new()),
            Arc::new(RecordingClusterManager::new()),
            Arc::new(RecordingMetrics::new()),
            Arc::new(MockConnector::new()),
        );
        assert!(matches!(result, Err(NotifierError::InvalidConfig(_))));
    }

    #[test]
    fn start_needs_a_runtime() {
        let result = SessionNotifier::start(
            &NotifierSettings::default(),
            Arc::new(StaticSessionRegistry::new()),
            Arc::new(RecordingClusterManager::new()),
            Arc::new(RecordingMetrics::new()),
            Arc::new(MockConnector::new()),
        );
        assert!(matches!(result, Err(NotifierError::Runtime(_))));
    }
}
