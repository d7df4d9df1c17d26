//! Notification calls delivered to session drivers.
//!
//! A [`NotificationCall`] is one remote procedure invocation on the driver.
//! The serde representation is the wire shape used by the TCP transport:
//! `{"method": "grantResource", "params": {...}}`.

use serde::{Deserialize, Serialize};

use crate::ids::{HostPort, SessionHandle};

/// Kind of cluster resource carried by a grant.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Map,
    Reduce,
    JobTracker,
    Cpu,
}

impl ResourceType {
    /// Stable label used in metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Map => "map",
            Self::Reduce => "reduce",
            Self::JobTracker => "job_tracker",
            Self::Cpu => "cpu",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "map" => Ok(Self::Map),
            "reduce" => Ok(Self::Reduce),
            "job_tracker" | "jobtracker" => Ok(Self::JobTracker),
            "cpu" => Ok(Self::Cpu),
            other => Err(format!("unknown resource type: {other}")),
        }
    }
}

/// One typed resource allocated to (or taken back from) a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGrant {
    pub id: u32,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub node_name: String,
    pub node_address: HostPort,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_info: Option<String>,
}

impl ResourceGrant {
    pub fn new(id: u32, resource_type: ResourceType, node_name: impl Into<String>, node_address: HostPort) -> Self {
        Self {
            id,
            resource_type,
            node_name: node_name.into(),
            node_address,
            app_info: None,
        }
    }
}

/// A single notification for a session driver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum NotificationCall {
    #[serde(rename = "grantResource")]
    GrantResource {
        handle: SessionHandle,
        grants: Vec<ResourceGrant>,
    },
    /// `force` tells the driver to drop the resources without a graceful
    /// shutdown of whatever runs on them.
    #[serde(rename = "revokeResource")]
    RevokeResource {
        handle: SessionHandle,
        grants: Vec<ResourceGrant>,
        force: bool,
    },
    #[serde(rename = "processDeadNode")]
    DeadNode { handle: SessionHandle, node: String },
}

impl NotificationCall {
    pub fn handle(&self) -> &SessionHandle {
        match self {
            Self::GrantResource { handle, .. }
            | Self::RevokeResource { handle, .. }
            | Self::DeadNode { handle, .. } => handle,
        }
    }

    /// Remote method name; also the `method` label in metrics.
    pub fn method(&self) -> &'static str {
        match self {
            Self::GrantResource { .. } => "grantResource",
            Self::RevokeResource { .. } => "revokeResource",
            Self::DeadNode { .. } => "processDeadNode",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handle(s: &str) -> SessionHandle {
        SessionHandle::new(s).unwrap()
    }

    fn cpu_grant(id: u32) -> ResourceGrant {
        ResourceGrant::new(id, ResourceType::Cpu, "node-1", HostPort::new("10.0.0.1", 50060))
    }

    #[test]
    fn handle_accessor_covers_every_variant() {
        let calls = [
            NotificationCall::GrantResource {
                handle: handle("a"),
                grants: vec![cpu_grant(1)],
            },
            NotificationCall::RevokeResource {
                handle: handle("b"),
                grants: vec![],
                force: true,
            },
            NotificationCall::DeadNode {
                handle: handle("c"),
                node: "node-7".into(),
            },
        ];
        let handles: Vec<&str> = calls.iter().map(|c| c.handle().as_str()).collect();
        assert_eq!(handles, ["a", "b", "c"]);
    }

    #[test]
    fn resource_type_parses_labels() {
        for t in [ResourceType::Map, ResourceType::Reduce, ResourceType::JobTracker, ResourceType::Cpu] {
            assert_eq!(t.as_str().parse::<ResourceType>().unwrap(), t);
        }
        assert_eq!("CPU".parse::<ResourceType>().unwrap(), ResourceType::Cpu);
        assert!("gpu".parse::<ResourceType>().is_err());
    }

    #[test]
    fn method_names() {
        let dead = NotificationCall::DeadNode {
            handle: handle("s"),
            node: "n".into(),
        };
        assert_eq!(dead.method(), "processDeadNode");
    }

    #[test]
    fn wire_shape_of_grant() {
        let call = NotificationCall::GrantResource {
            handle: handle("s1"),
            grants: vec![cpu_grant(7)],
        };
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(
            value,
            json!({
                "method": "grantResource",
                "params": {
                    "handle": "s1",
                    "grants": [{
                        "id": 7,
                        "type": "cpu",
                        "nodeName": "node-1",
                        "nodeAddress": {"host": "10.0.0.1", "port": 50060}
                    }]
                }
            })
        );
    }

    #[test]
    fn revoke_parses_from_wire() {
        let value = json!({
            "method": "revokeResource",
            "params": {"handle": "s4", "grants": [], "force": true}
        });
        let call: NotificationCall = serde_json::from_value(value).unwrap();
        assert_eq!(
            call,
            NotificationCall::RevokeResource {
                handle: handle("s4"),
                grants: vec![],
                force: true,
            }
        );
    }

    #[test]
    fn unknown_method_rejected() {
        let value = json!({"method": "reboot", "params": {"handle": "s"}});
        assert!(serde_json::from_value::<NotificationCall>(value).is_err());
    }

    #[test]
    fn resource_type_labels() {
        assert_eq!(ResourceType::JobTracker.as_str(), "job_tracker");
        assert_eq!(
            serde_json::to_string(&ResourceType::JobTracker).unwrap(),
            r#""job_tracker""#
        );
    }
}
