//! Control protocol between local clients and the supervisor daemon
//!
//! Uses JSON-encoded messages, one per line, over TCP on localhost
//! (127.0.0.1).

use serde::{Deserialize, Serialize};

use crate::types::Status;

/// Request from a control client to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Get the tunnel status
    GetStatus,

    /// Ask for the tunnel to be running or stopped
    SetStatus { status: Status },

    /// Ping (for keepalive)
    Ping,
}

/// Response from the daemon to a control client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Current tunnel status
    Status { status: Status },

    /// Outcome of a status change request
    Outcome { message: String },

    /// Error response
    Error { message: String },

    /// Pong response
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request: IpcRequest =
            serde_json::from_str(r#"{"type":"set_status","status":"stopped"}"#).unwrap();
        assert_eq!(
            request,
            IpcRequest::SetStatus {
                status: Status::Stopped
            }
        );

        let json = serde_json::to_string(&IpcRequest::GetStatus).unwrap();
        assert_eq!(json, r#"{"type":"get_status"}"#);
    }

    #[test]
    fn test_response_wire_format() {
        let json = serde_json::to_string(&IpcResponse::Status {
            status: Status::Crashed,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"status","status":"crashed"}"#);

        let json = serde_json::to_string(&IpcResponse::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_unknown_request_is_rejected() {
        assert!(serde_json::from_str::<IpcRequest>(r#"{"type":"shutdown"}"#).is_err());
    }
}
