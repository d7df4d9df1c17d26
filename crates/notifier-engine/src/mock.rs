//! Test doubles for the notifier's collaborators.
//!
//! [`MockConnector`] plays scripted delivery outcomes and records every
//! delivered call; [`RecordingClusterManager`] and [`RecordingMetrics`]
//! remember what the notifier reported.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notifier_core::{
    ClusterManager, ClusterManagerError, DriverClient, DriverConnector, HostPort,
    NotificationCall, NotifierMetrics, ResourceType, SessionHandle, SessionStatus,
    TransportError,
};
use parking_lot::Mutex;

/// Outcome of one `invoke` on a mock driver client.
#[derive(Clone, Debug)]
pub enum MockOutcome {
    Deliver,
    Fail(TransportError),
    /// Wait (on the tokio clock), then apply the inner outcome.
    Delay(Duration, Box<MockOutcome>),
}

impl MockOutcome {
    pub fn io_failure() -> Self {
        Self::Fail(TransportError::Io("connection reset".into()))
    }

    pub fn delayed(delay: Duration, inner: MockOutcome) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

#[derive(Default)]
struct MockState {
    script: Mutex<VecDeque<MockOutcome>>,
    fail_all: AtomicBool,
    unreachable: Mutex<HashSet<HostPort>>,
    delivered: Mutex<Vec<NotificationCall>>,
    attempts: AtomicUsize,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

impl MockState {
    fn next_outcome(&self) -> MockOutcome {
        if let Some(outcome) = self.script.lock().pop_front() {
            return outcome;
        }
        if self.fail_all.load(Ordering::SeqCst) {
            MockOutcome::io_failure()
        } else {
            MockOutcome::Deliver
        }
    }
}

/// Connector whose clients deliver into memory.
///
/// Outcomes are taken from the script in order across all clients; once the
/// script is empty every call is delivered (or fails, for [`MockConnector::failing`]).
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every invoke fails with an I/O error.
    pub fn failing() -> Self {
        let connector = Self::default();
        connector.state.fail_all.store(true, Ordering::SeqCst);
        connector
    }

    pub fn with_script(outcomes: Vec<MockOutcome>) -> Self {
        let connector = Self::default();
        connector.state.script.lock().extend(outcomes);
        connector
    }

    /// Refuse connections to `address`.
    pub fn refuse(&self, address: HostPort) {
        self.state.unreachable.lock().insert(address);
    }

    /// Calls acknowledged by a mock driver, in delivery order.
    pub fn delivered(&self) -> Vec<NotificationCall> {
        self.state.delivered.lock().clone()
    }

    pub fn delivered_for(&self, handle: &SessionHandle) -> Vec<NotificationCall> {
        self.state
            .delivered
            .lock()
            .iter()
            .filter(|c| c.handle() == handle)
            .cloned()
            .collect()
    }

    /// Number of `invoke` calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Number of successful connects.
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Number of clients closed.
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverConnector for MockConnector {
    async fn connect(&self, address: &HostPort) -> Result<Box<dyn DriverClient>, TransportError> {
        if self.state.unreachable.lock().contains(address) {
            return Err(TransportError::Connect {
                address: address.to_string(),
                reason: "connection refused".into(),
            });
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockClient {
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct MockClient {
    state: Arc<MockState>,
    closed: bool,
}

#[async_trait]
impl DriverClient for MockClient {
    async fn invoke(&mut self, call: &NotificationCall) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        let mut outcome = self.state.next_outcome();
        loop {
            match outcome {
                MockOutcome::Deliver => {
                    self.state.delivered.lock().push(call.clone());
                    return Ok(());
                }
                MockOutcome::Fail(e) => return Err(e),
                MockOutcome::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    outcome = *inner;
                }
            }
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Cluster manager that records `session_end` requests.
#[derive(Default)]
pub struct RecordingClusterManager {
    ended: Mutex<Vec<(SessionHandle, SessionStatus)>>,
    fail: bool,
}

impl RecordingClusterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records requests but answers every one with an error.
    pub fn failing() -> Self {
        Self {
            ended: Mutex::default(),
            fail: true,
        }
    }

    pub fn ended(&self) -> Vec<(SessionHandle, SessionStatus)> {
        self.ended.lock().clone()
    }
}

#[async_trait]
impl ClusterManager for RecordingClusterManager {
    async fn session_end(
        &self,
        handle: &SessionHandle,
        status: SessionStatus,
    ) -> Result<(), ClusterManagerError> {
        self.ended.lock().push((handle.clone(), status));
        if self.fail {
            return Err(ClusterManagerError::Unavailable("cluster manager offline".into()));
        }
        Ok(())
    }
}

/// Metrics sink that counts every observation.
#[derive(Default)]
pub struct RecordingMetrics {
    grants: Mutex<HashMap<ResourceType, usize>>,
    revokes: Mutex<HashMap<ResourceType, usize>>,
    delivered: AtomicUsize,
    failures: AtomicUsize,
    timed_out: AtomicUsize,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grants(&self, resource_type: ResourceType) -> usize {
        self.grants.lock().get(&resource_type).copied().unwrap_or(0)
    }

    pub fn revokes(&self, resource_type: ResourceType) -> usize {
        self.revokes.lock().get(&resource_type).copied().unwrap_or(0)
    }

    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn timed_out(&self) -> usize {
        self.timed_out.load(Ordering::SeqCst)
    }
}

impl NotifierMetrics for RecordingMetrics {
    fn grant_resource(&self, resource_type: ResourceType) {
        *self.grants.lock().entry(resource_type).or_default() += 1;
    }

    fn revoke_resource(&self, resource_type: ResourceType) {
        *self.revokes.lock().entry(resource_type).or_default() += 1;
    }

    fn call_delivered(&self, _method: &'static str, _latency: Duration) {
        self.delivered.fetch_add(1, Ordering::SeqCst);
    }

    fn delivery_failed(&self, _method: &'static str) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn session_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::SeqCst);
    }
}
