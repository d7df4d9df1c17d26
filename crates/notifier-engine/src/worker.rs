use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use notifier_core::{
    ClusterManager, DriverConnector, HostPort, NotificationCall, NotifierMetrics, SessionHandle,
    SessionStatus,
};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::context::SessionNotificationContext;
use crate::retry::RetryPolicy;

/// Owns the notification contexts of one shard and delivers them.
///
/// Callers add calls and delete sessions from any thread; the worker's own
/// task closes deleted contexts, flushes the rest and escalates sessions
/// whose delivery retries ran out.
pub struct NotifierWorker {
    index: usize,
    contexts: DashMap<SessionHandle, Arc<SessionNotificationContext>>,
    pending_deletions: Mutex<Vec<Arc<SessionNotificationContext>>>,
    wake: Notify,
    poll_interval: Duration,
    policy: RetryPolicy,
    connector: Arc<dyn DriverConnector>,
    cluster_manager: Arc<dyn ClusterManager>,
    metrics: Arc<dyn NotifierMetrics>,
}

impl NotifierWorker {
    pub fn new(
        index: usize,
        poll_interval: Duration,
        policy: RetryPolicy,
        connector: Arc<dyn DriverConnector>,
        cluster_manager: Arc<dyn ClusterManager>,
        metrics: Arc<dyn NotifierMetrics>,
    ) -> Self {
        Self {
            index,
            contexts: DashMap::new(),
            pending_deletions: Mutex::new(Vec::new()),
            wake: Notify::new(),
            poll_interval,
            policy,
            connector,
            cluster_manager,
            metrics,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Queue `call` on the session's context, creating it on first use.
    pub fn add_call(&self, address: HostPort, call: NotificationCall) {
        let handle = call.handle().clone();
        let ctx = Arc::clone(
            self.contexts
                .entry(handle.clone())
                .or_insert_with(|| {
                    debug!(worker = self.index, session_id = %handle, %address, "creating notification context");
                    Arc::new(SessionNotificationContext::new(
                        handle.clone(),
                        address,
                        Arc::clone(&self.connector),
                        Arc::clone(&self.metrics),
                        self.policy.clone(),
                    ))
                })
                .value(),
        );
        ctx.enqueue(call);
        self.wake.notify_one();
    }

    /// Detach the session's context now and close it on the next pass.
    /// Returns `false` if this worker has no context for the handle.
    pub fn delete_session(&self, handle: &SessionHandle) -> bool {
        let Some((_, ctx)) = self.contexts.remove(handle) else {
            return false;
        };
        ctx.detach();
        self.pending_deletions.lock().push(ctx);
        self.wake.notify_one();
        true
    }

    pub fn context(&self, handle: &SessionHandle) -> Option<Arc<SessionNotificationContext>> {
        self.contexts.get(handle).map(|entry| Arc::clone(entry.value()))
    }

    pub fn num_contexts(&self) -> usize {
        self.contexts.len()
    }

    pub fn num_pending_calls(&self) -> usize {
        self.contexts
            .iter()
            .map(|entry| entry.value().pending_len())
            .sum()
    }

    /// Worker loop. Wakes on new work, on the poll interval, or on
    /// cancellation; closes every context before returning.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let span = info_span!("worker", index = self.index);
        async move {
            debug!("notifier worker started");
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = self.wake.notified() => {}
                    () = tokio::time::sleep(self.poll_interval) => {}
                }
                self.drain_deletions().await;
                self.flush_all().await;
            }
            self.close_all().await;
            debug!("notifier worker stopped");
        }
        .instrument(span)
        .await
    }

    async fn drain_deletions(&self) {
        let deleted = std::mem::take(&mut *self.pending_deletions.lock());
        for ctx in deleted {
            ctx.close().await;
        }
    }

    async fn flush_all(&self) {
        let contexts: Vec<Arc<SessionNotificationContext>> = self
            .contexts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for ctx in contexts {
            if !ctx.flush(Instant::now()).await {
                self.escalate(ctx.handle()).await;
            }
        }
    }

    async fn escalate(&self, handle: &SessionHandle) {
        self.metrics.session_timed_out();
        warn!(session_id = %handle, "session driver unreachable, ending session");
        if let Err(e) = self
            .cluster_manager
            .session_end(handle, SessionStatus::TimedOut)
            .await
        {
            warn!(session_id = %handle, error = %e, "failed to end timed out session");
        }
    }

    async fn close_all(&self) {
        self.drain_deletions().await;
        let handles: Vec<SessionHandle> = self.contexts.iter().map(|e| e.key().clone()).collect();
        for handle in handles {
            if let Some((_, ctx)) = self.contexts.remove(&handle) {
                ctx.close().await;
            }
        }
    }
}
