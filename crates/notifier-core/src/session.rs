//! Collaborators the notifier consumes from the surrounding cluster manager.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::calls::ResourceType;
use crate::errors::{ClusterManagerError, SessionLookupError};
use crate::ids::{HostPort, SessionHandle};

/// What the notifier needs to know about a live session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub handle: SessionHandle,
    /// Where the session driver listens for notifications.
    pub address: HostPort,
}

/// Terminal status reported when a session ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Running,
    Successful,
    Failed,
    Killed,
    TimedOut,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Successful => "SUCCESSFUL",
            Self::Failed => "FAILED",
            Self::Killed => "KILLED",
            Self::TimedOut => "TIMED_OUT",
        }
    }
}

/// Resolves session handles to live sessions.
pub trait SessionRegistry: Send + Sync {
    fn session(&self, handle: &SessionHandle) -> Result<SessionInfo, SessionLookupError>;
}

/// Receives session-termination requests.
#[async_trait]
pub trait ClusterManager: Send + Sync {
    async fn session_end(
        &self,
        handle: &SessionHandle,
        status: SessionStatus,
    ) -> Result<(), ClusterManagerError>;
}

/// Fire-and-forget counters reported by the notifier.
///
/// Only the grant/revoke counters are required; the delivery observations
/// default to no-ops.
pub trait NotifierMetrics: Send + Sync {
    fn grant_resource(&self, resource_type: ResourceType);

    fn revoke_resource(&self, resource_type: ResourceType);

    fn call_delivered(&self, _method: &'static str, _latency: Duration) {}

    fn delivery_failed(&self, _method: &'static str) {}

    fn session_timed_out(&self) {}
}

/// Metrics sink that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl NotifierMetrics for NoopMetrics {
    fn grant_resource(&self, _resource_type: ResourceType) {}

    fn revoke_resource(&self, _resource_type: ResourceType) {}
}

/// In-memory session table.
#[derive(Debug, Default)]
pub struct StaticSessionRegistry {
    sessions: DashMap<SessionHandle, HostPort>,
}

impl StaticSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: SessionHandle, address: HostPort) {
        self.sessions.insert(handle, address);
    }

    /// Returns true if the session was known.
    pub fn remove(&self, handle: &SessionHandle) -> bool {
        self.sessions.remove(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionRegistry for StaticSessionRegistry {
    fn session(&self, handle: &SessionHandle) -> Result<SessionInfo, SessionLookupError> {
        self.sessions
            .get(handle)
            .map(|address| SessionInfo {
                handle: handle.clone(),
                address: address.clone(),
            })
            .ok_or_else(|| SessionLookupError::InvalidHandle(handle.to_string()))
    }
}
