use std::collections::HashSet;

use async_trait::async_trait;
use notifier_core::{ClusterManager, ClusterManagerError, NotificationCall, SessionHandle, SessionStatus};
use notifier_transport::{Rejection, SessionDriverHandler};
use tracing::info;

/// Cluster manager stand-in that only logs termination requests.
#[derive(Debug, Default)]
pub struct LoggingClusterManager;

#[async_trait]
impl ClusterManager for LoggingClusterManager {
    async fn session_end(
        &self,
        handle: &SessionHandle,
        status: SessionStatus,
    ) -> Result<(), ClusterManagerError> {
        info!(session_id = %handle, status = status.as_str(), "session end requested");
        Ok(())
    }
}

/// Session driver that logs every notification it receives.
#[derive(Debug, Default)]
pub struct LoggingDriverHandler {
    rejected: HashSet<SessionHandle>,
}

impl LoggingDriverHandler {
    /// Answer calls for these sessions with `UNKNOWN_SESSION`.
    pub fn rejecting(sessions: impl IntoIterator<Item = SessionHandle>) -> Self {
        Self {
            rejected: sessions.into_iter().collect(),
        }
    }
}

#[async_trait]
impl SessionDriverHandler for LoggingDriverHandler {
    async fn handle(&self, call: NotificationCall) -> Result<(), Rejection> {
        if self.rejected.contains(call.handle()) {
            info!(session_id = %call.handle(), method = call.method(), "rejecting call");
            return Err(Rejection::new("UNKNOWN_SESSION", format!("no session {}", call.handle())));
        }
        match &call {
            NotificationCall::GrantResource { handle, grants } => {
                for grant in grants {
                    info!(
                        session_id = %handle,
                        grant_id = grant.id,
                        resource = grant.resource_type.as_str(),
                        node = %grant.node_name,
                        "resource granted"
                    );
                }
            }
            NotificationCall::RevokeResource { handle, grants, force } => {
                let ids: Vec<u32> = grants.iter().map(|g| g.id).collect();
                info!(session_id = %handle, ?ids, force, "resources revoked");
            }
            NotificationCall::DeadNode { handle, node } => {
                info!(session_id = %handle, %node, "node reported dead");
            }
        }
        Ok(())
    }
}
