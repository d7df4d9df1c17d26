use notifier_core::{NotificationCall, TransportError};
use serde::{Deserialize, Serialize};

/// One request line: `{"id": N, "method": "...", "params": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// One response line. `id` is absent when the request could not be parsed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: Option<u64>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

pub const PARSE_ERROR: &str = "PARSE_ERROR";
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

impl RpcRequest {
    /// Frame a call under the given request id.
    pub fn new(id: u64, call: &NotificationCall) -> Result<Self, serde_json::Error> {
        let mut value = serde_json::to_value(call)?;
        let params = value
            .get_mut("params")
            .map(serde_json::Value::take)
            .unwrap_or_default();
        Ok(Self {
            id,
            method: call.method().to_string(),
            params,
        })
    }

    /// Decode the method and params back into a typed call.
    pub fn into_call(self) -> Result<NotificationCall, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "method": self.method,
            "params": self.params,
        }))
    }
}

impl RpcResponse {
    pub fn success(id: u64) -> Self {
        Self {
            id: Some(id),
            success: true,
            error: None,
        }
    }

    pub fn error(id: Option<u64>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            error: Some(RpcError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Interpret the response to request `expected_id`.
    pub fn into_result(self, expected_id: u64) -> Result<(), TransportError> {
        if self.id != Some(expected_id) {
            return Err(TransportError::Protocol(format!(
                "response id {:?} does not match request id {expected_id}",
                self.id
            )));
        }
        if self.success {
            return Ok(());
        }
        let (code, message) = match self.error {
            Some(e) => (e.code, e.message),
            None => (UNKNOWN_ERROR.to_string(), String::new()),
        };
        Err(TransportError::Rejected { code, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notifier_core::SessionHandle;
    use serde_json::json;

    fn dead_node() -> NotificationCall {
        NotificationCall::DeadNode {
            handle: SessionHandle::new("s-9").unwrap(),
            node: "node-3".into(),
        }
    }

    #[test]
    fn request_line_shape() {
        let req = RpcRequest::new(12, &dead_node()).unwrap();
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 12,
                "method": "processDeadNode",
                "params": {"handle": "s-9", "node": "node-3"}
            })
        );
        assert_eq!(req.into_call().unwrap(), dead_node());
    }

    #[test]
    fn unknown_method_does_not_decode() {
        let req = RpcRequest {
            id: 1,
            method: "killSession".into(),
            params: json!({"handle": "s"}),
        };
        assert!(req.into_call().is_err());
    }

    #[test]
    fn success_response_omits_error() {
        let line = serde_json::to_string(&RpcResponse::success(3)).unwrap();
        assert_eq!(line, r#"{"id":3,"success":true}"#);
    }

    #[test]
    fn mismatched_id_is_protocol_error() {
        let err = RpcResponse::success(4).into_result(5).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[test]
    fn failure_is_rejection() {
        let resp = RpcResponse::error(Some(8), "UNKNOWN_SESSION", "no such session");
        let err = resp.into_result(8).unwrap_err();
        match err {
            TransportError::Rejected { code, message } => {
                assert_eq!(code, "UNKNOWN_SESSION");
                assert_eq!(message, "no such session");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn failure_without_error_body() {
        let resp: RpcResponse = serde_json::from_str(r#"{"id":2,"success":false}"#).unwrap();
        let err = resp.into_result(2).unwrap_err();
        assert!(matches!(err, TransportError::Rejected { ref code, .. } if code == UNKNOWN_ERROR));
    }
}
