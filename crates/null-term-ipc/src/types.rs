use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;

use crate::error_codes;
use crate::methods;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }

    /// Decodes the params object into a typed struct, answering with an
    /// invalid-params error when it does not fit.
    #[allow(clippy::result_large_err)]
    pub fn parse_params<T: DeserializeOwned>(&self) -> Result<T, RpcResponse> {
        let params = self.params.clone().unwrap_or_else(|| json!({}));
        serde_json::from_value(params).map_err(|e| {
            RpcResponse::error(
                self.id,
                error_codes::INVALID_PARAMS,
                &format!("Invalid params for '{}': {}", self.method, e),
            )
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    jsonrpc: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcServerError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcServerError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcServerError {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }

    /// Serializes a typed result. Serialization of these plain structs
    /// cannot fail in practice; if it does the caller gets an internal error.
    pub fn typed<T: Serialize>(id: u64, result: &T) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self::success(id, value),
            Err(e) => Self::error(
                id,
                error_codes::GENERIC_ERROR,
                &format!("Failed to serialize result: {}", e),
            ),
        }
    }
}

/// Host-to-UI push message. Carries no id and expects no reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNotification {
    jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcNotification {
    pub fn new(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalEvent {
    Data { id: String, data: String },
    Exit { id: String, exit_code: i32 },
}

impl TerminalEvent {
    pub fn session_id(&self) -> &str {
        match self {
            TerminalEvent::Data { id, .. } | TerminalEvent::Exit { id, .. } => id,
        }
    }

    pub fn to_notification(&self) -> RpcNotification {
        match self {
            TerminalEvent::Data { id, data } => {
                RpcNotification::new(methods::DATA, json!({ "id": id, "data": data }))
            }
            TerminalEvent::Exit { id, exit_code } => RpcNotification::new(
                methods::EXIT,
                json!({ "id": id, "exit_code": exit_code }),
            ),
        }
    }

    pub fn from_notification(notification: &RpcNotification) -> Option<Self> {
        let params = &notification.params;
        let id = params.get("id")?.as_str()?.to_string();
        match notification.method.as_str() {
            methods::DATA => Some(TerminalEvent::Data {
                id,
                data: params.get("data")?.as_str()?.to_string(),
            }),
            methods::EXIT => Some(TerminalEvent::Exit {
                id,
                exit_code: params
                    .get("exit_code")
                    .and_then(Value::as_i64)
                    .and_then(|c| i32::try_from(c).ok())
                    .unwrap_or(-1),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnParams {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteParams {
    pub id: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeParams {
    pub id: String,
    pub cols: u16,
    pub rows: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillParams {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// False when the shell runs on plain pipes and cannot be resized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pty: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

impl SpawnResult {
    pub fn spawned(pid: Option<u32>, pty: bool) -> Self {
        Self {
            success: true,
            pid,
            pty: Some(pty),
            error: None,
            code: None,
        }
    }

    pub fn failed(code: i32, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            code: Some(code),
            ..Self::default()
        }
    }
}

/// Outcome of `write` and `kill`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            code: None,
        }
    }

    pub fn failed(code: i32, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            code: Some(code),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code == Some(error_codes::SESSION_NOT_FOUND)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeResult {
    pub success: bool,
    /// Whether the size reached the process. False in pipe mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

impl ResizeResult {
    pub fn resized(applied: bool) -> Self {
        Self {
            success: true,
            applied: Some(applied),
            error: None,
            code: None,
        }
    }

    pub fn failed(code: i32, error: impl Into<String>) -> Self {
        Self {
            success: false,
            applied: None,
            error: Some(error.into()),
            code: Some(code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub pid: Option<u32>,
    pub shell: String,
    pub cwd: Option<String>,
    pub pty: bool,
    pub cols: u16,
    pub rows: u16,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResult {
    pub sessions: Vec<SessionSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(method: &str, params: Option<Value>) -> RpcRequest {
        RpcRequest::new(7, method, params)
    }

    #[test]
    fn test_parse_params_spawn_optional_fields() {
        let req = make_request(methods::SPAWN, Some(json!({"id": "t", "cols": 100})));
        let params: SpawnParams = req.parse_params().unwrap();
        assert_eq!(params.id, "t");
        assert_eq!(params.cols, Some(100));
        assert_eq!(params.rows, None);
        assert_eq!(params.shell, None);
    }

    #[test]
    fn test_parse_params_rejects_wrong_types() {
        let req = make_request(
            methods::RESIZE,
            Some(json!({"id": "t", "cols": -1, "rows": 10})),
        );
        let err = req.parse_params::<ResizeParams>().unwrap_err();
        assert_eq!(err.id, 7);
        assert_eq!(err.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[test]
    fn test_request_serialization_omits_empty_params() {
        let json = serde_json::to_string(&make_request(methods::PING, None)).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"ping\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_failed_results_carry_code() {
        let result = ActionResult::failed(error_codes::SESSION_NOT_FOUND, "Terminal not found");
        assert!(result.is_not_found());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value, json!({"success": false, "error": "Terminal not found", "code": -32001}));

        let value = serde_json::to_value(ActionResult::ok()).unwrap();
        assert_eq!(value, json!({"success": true}));
    }

    #[test]
    fn test_spawn_and_resize_results_report_degraded_mode() {
        let value = serde_json::to_value(SpawnResult::spawned(Some(42), false)).unwrap();
        assert_eq!(value, json!({"success": true, "pid": 42, "pty": false}));

        let value = serde_json::to_value(ResizeResult::resized(false)).unwrap();
        assert_eq!(value, json!({"success": true, "applied": false}));
    }

    #[test]
    fn test_terminal_event_notification_shape() {
        let event = TerminalEvent::Data {
            id: "term-1".into(),
            data: "hi\r\n".into(),
        };
        let note = event.to_notification();
        assert_eq!(note.method, methods::DATA);
        assert_eq!(note.params, json!({"id": "term-1", "data": "hi\r\n"}));
        assert_eq!(TerminalEvent::from_notification(&note), Some(event));

        let exit = TerminalEvent::Exit {
            id: "term-1".into(),
            exit_code: 130,
        };
        let parsed = TerminalEvent::from_notification(&exit.to_notification()).unwrap();
        assert_eq!(parsed, exit);
        assert_eq!(parsed.session_id(), "term-1");
    }

    #[test]
    fn test_terminal_event_unknown_method_is_ignored() {
        let note = RpcNotification::new("terminal.bell", json!({"id": "x"}));
        assert_eq!(TerminalEvent::from_notification(&note), None);
    }
}
