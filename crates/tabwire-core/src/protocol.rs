//! Control messages, the command table and response shapes.

use serde::Serialize;
use serde_json::{Map, Value};

/// Commands the worker understands. Matching is case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    PutInstances,
    GetInstances,
    ShareInstances,
    CloseSharedInstances,
    IpcInstances,
    ExecuteScript,
    GetVariableList,
    GetVariableType,
    GetVariableValue,
    GetImage,
    VariableIsSet,
    SetVariableValue,
    GetDebugBuffer,
    Shutdown,
}

impl Command {
    pub const ALL: [Command; 14] = [
        Command::PutInstances,
        Command::GetInstances,
        Command::ShareInstances,
        Command::CloseSharedInstances,
        Command::IpcInstances,
        Command::ExecuteScript,
        Command::GetVariableList,
        Command::GetVariableType,
        Command::GetVariableValue,
        Command::GetImage,
        Command::VariableIsSet,
        Command::SetVariableValue,
        Command::GetDebugBuffer,
        Command::Shutdown,
    ];

    /// Look up a command by its wire name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::PutInstances => "put_instances",
            Command::GetInstances => "get_instances",
            Command::ShareInstances => "share_instances",
            Command::CloseSharedInstances => "close_shared_instances",
            Command::IpcInstances => "ipc_instances",
            Command::ExecuteScript => "execute_script",
            Command::GetVariableList => "get_variable_list",
            Command::GetVariableType => "get_variable_type",
            Command::GetVariableValue => "get_variable_value",
            Command::GetImage => "get_image",
            Command::VariableIsSet => "variable_is_set",
            Command::SetVariableValue => "set_variable_value",
            Command::GetDebugBuffer => "get_debug_buffer",
            Command::Shutdown => "shutdown",
        }
    }
}

/// One control message received from the host.
#[derive(Debug, Clone, Default)]
pub struct ControlMessage {
    fields: Map<String, Value>,
}

impl ControlMessage {
    /// Wrap a parsed JSON frame. Anything other than an object carries no
    /// fields, and therefore no command.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    /// The raw `command` field, if present and a string.
    pub fn command(&self) -> Option<&str> {
        self.fields.get("command").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// The per-message `debug` flag.
    pub fn debug(&self) -> bool {
        self.fields
            .get("debug")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// A JSON response frame.
///
/// Always carries a `response` field: `ok`, `error`, `pid_response` or
/// `instances_header`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(transparent)]
pub struct Response {
    fields: Map<String, Value>,
}

impl Response {
    fn with_kind(kind: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("response".to_string(), Value::String(kind.to_string()));
        Self { fields }
    }

    pub fn ok() -> Self {
        Self::with_kind("ok")
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_kind("error").with("error_message", message.into())
    }

    /// Startup handshake carrying the worker's process id.
    pub fn pid(pid: u32) -> Self {
        Self::with_kind("pid_response").with("pid", pid)
    }

    /// Structural metadata sent ahead of a CSV body.
    pub fn instances_header(num_instances: usize, header: Value) -> Self {
        Self::with_kind("instances_header")
            .with("num_instances", num_instances)
            .with("header", header)
    }

    /// Attach a result field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn kind(&self) -> &str {
        self.fields
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_table_roundtrip() {
        for command in Command::ALL {
            assert_eq!(Command::parse(command.as_str()), Some(command));
        }
        assert_eq!(Command::parse("SHUTDOWN"), None);
        assert_eq!(Command::parse("reboot"), None);
    }

    #[test]
    fn test_control_message_without_command() {
        let msg = ControlMessage::from_value(json!({"variable_name": "x"}));
        assert_eq!(msg.command(), None);

        let msg = ControlMessage::from_value(json!(["command"]));
        assert_eq!(msg.command(), None);
    }

    #[test]
    fn test_debug_flag_defaults_false() {
        let msg = ControlMessage::from_value(json!({"command": "shutdown"}));
        assert!(!msg.debug());
        let msg = ControlMessage::from_value(json!({"command": "shutdown", "debug": true}));
        assert!(msg.debug());
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::error("No handle exists");
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"response": "error", "error_message": "No handle exists"})
        );

        let resp = Response::pid(42);
        assert_eq!(resp.kind(), "pid_response");
        assert_eq!(serde_json::to_value(&resp).unwrap()["pid"], 42);
    }
}
