use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notifier_core::{
    DriverClient, DriverConnector, HostPort, NotificationCall, NotifierMetrics, SessionHandle,
    TransportError,
};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::retry::RetryPolicy;

/// Connection and retry state, touched only by the owning worker.
#[derive(Default)]
struct DeliveryState {
    client: Option<Box<dyn DriverClient>>,
    failures: u32,
    next_attempt_at: Option<Instant>,
}

/// Pending notifications for one session and the logic to deliver them.
///
/// Any thread may [`enqueue`](Self::enqueue); only the owning worker calls
/// [`flush`](Self::flush) and [`close`](Self::close). The front of the queue
/// is removed only after the driver acknowledged it, so a failed call is
/// retried before anything queued behind it.
pub struct SessionNotificationContext {
    handle: SessionHandle,
    address: HostPort,
    queue: Mutex<VecDeque<NotificationCall>>,
    /// Retries ran out; the session has been escalated.
    exhausted: AtomicBool,
    /// Removed from its worker's map; nothing more will be delivered.
    detached: AtomicBool,
    closed: AtomicBool,
    delivery: tokio::sync::Mutex<DeliveryState>,
    connector: Arc<dyn DriverConnector>,
    metrics: Arc<dyn NotifierMetrics>,
    policy: RetryPolicy,
}

impl SessionNotificationContext {
    pub fn new(
        handle: SessionHandle,
        address: HostPort,
        connector: Arc<dyn DriverConnector>,
        metrics: Arc<dyn NotifierMetrics>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            handle,
            address,
            queue: Mutex::new(VecDeque::new()),
            exhausted: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            delivery: tokio::sync::Mutex::new(DeliveryState::default()),
            connector,
            metrics,
            policy,
        }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn address(&self) -> &HostPort {
        &self.address
    }

    /// Append a call. Returns `false` if the context no longer accepts calls.
    pub fn enqueue(&self, call: NotificationCall) -> bool {
        debug_assert_eq!(call.handle(), &self.handle);
        let mut queue = self.queue.lock();
        if self.exhausted.load(Ordering::Acquire) || self.detached.load(Ordering::Acquire) {
            debug!(session_id = %self.handle, method = call.method(), "context not accepting calls, dropping");
            return false;
        }
        queue.push_back(call);
        true
    }

    pub fn pending_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting and delivering calls and drop whatever is queued.
    /// The transport is released later by [`close`](Self::close).
    pub fn detach(&self) {
        let mut queue = self.queue.lock();
        self.detached.store(true, Ordering::Release);
        queue.clear();
    }

    /// Deliver queued calls in order.
    ///
    /// Returns `false` exactly once: on the failure that exhausts the retry
    /// budget. Before the next eligible attempt time this is a no-op.
    pub async fn flush(&self, now: Instant) -> bool {
        if self.is_exhausted() || self.is_closed() {
            return true;
        }
        let mut state = self.delivery.lock().await;
        if let Some(at) = state.next_attempt_at {
            if now < at {
                return true;
            }
        }

        loop {
            if self.detached.load(Ordering::Acquire) {
                return true;
            }
            let Some(call) = self.queue.lock().front().cloned() else {
                return true;
            };

            if state.client.is_none() {
                match self.connector.connect(&self.address).await {
                    Ok(client) => {
                        debug!(session_id = %self.handle, address = %self.address, "driver connection opened");
                        state.client = Some(client);
                    }
                    Err(e) => return self.record_failure(&mut state, now, &call, e).await,
                }
            }
            let Some(client) = state.client.as_mut() else {
                return true;
            };

            let started = Instant::now();
            match client.invoke(&call).await {
                Ok(()) => {
                    self.queue.lock().pop_front();
                    self.metrics.call_delivered(call.method(), started.elapsed());
                    if state.failures > 0 {
                        debug!(session_id = %self.handle, failures = state.failures, "delivery recovered");
                    }
                    state.failures = 0;
                    state.next_attempt_at = None;
                }
                Err(e) => return self.record_failure(&mut state, now, &call, e).await,
            }
        }
    }

    async fn record_failure(
        &self,
        state: &mut DeliveryState,
        now: Instant,
        call: &NotificationCall,
        error: TransportError,
    ) -> bool {
        if let Some(mut client) = state.client.take() {
            client.close().await;
        }
        state.failures += 1;
        self.metrics.delivery_failed(call.method());

        if self.detached.load(Ordering::Acquire) {
            debug!(session_id = %self.handle, method = call.method(), error = %error, "delivery failed after session was deleted");
            return true;
        }

        if self.policy.is_exhausted(state.failures) {
            let dropped = {
                let mut queue = self.queue.lock();
                self.exhausted.store(true, Ordering::Release);
                std::mem::take(&mut *queue).len()
            };
            state.next_attempt_at = None;
            warn!(
                session_id = %self.handle,
                address = %self.address,
                failures = state.failures,
                dropped,
                kind = error.error_kind(),
                error = %error,
                "delivery retries exhausted"
            );
            return false;
        }

        // Back off from when the attempt failed, not from when the pass began.
        let failed_at = now.max(Instant::now());
        let delay = self.policy.delay(state.failures);
        state.next_attempt_at = Some(failed_at + delay);
        debug!(
            session_id = %self.handle,
            method = call.method(),
            failures = state.failures,
            retry_in_ms = delay.as_millis() as u64,
            kind = error.error_kind(),
            error = %error,
            "delivery failed, backing off"
        );
        true
    }

    /// Release the transport. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.detach();
        let mut state = self.delivery.lock().await;
        if let Some(mut client) = state.client.take() {
            client.close().await;
        }
        debug!(session_id = %self.handle, "notification context closed");
    }
}
