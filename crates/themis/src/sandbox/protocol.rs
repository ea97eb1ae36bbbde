//! Line-delimited JSON protocol spoken with the worker process.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{NamespaceId, ObjectId};
use crate::value::Value;

/// One request; serialized with an `op` tag and a request `id` added.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum WorkerRequest<'a> {
    Exec {
        ns: NamespaceId,
        base: Option<NamespaceId>,
        code: &'a str,
    },
    New {
        ns: NamespaceId,
        class: &'a str,
        init: Option<NamespaceId>,
        obj: ObjectId,
    },
    Call {
        obj: ObjectId,
        method: &'a str,
        args: NamespaceId,
    },
}

impl WorkerRequest<'_> {
    pub(crate) fn op(&self) -> &'static str {
        match self {
            WorkerRequest::Exec { .. } => "exec",
            WorkerRequest::New { .. } => "new",
            WorkerRequest::Call { .. } => "call",
        }
    }

    /// Render the request as one protocol line, newline included.
    pub(crate) fn to_line(&self, id: u64) -> Result<String, serde_json::Error> {
        let mut payload = serde_json::to_value(self)?;
        payload["id"] = serde_json::Value::from(id);
        let mut line = payload.to_string();
        line.push('\n');
        Ok(line)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkerReply {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub bindings: BTreeMap<String, Value>,
    #[serde(default)]
    pub value: Option<Value>,
    /// Whatever the snippet printed, truncated by the worker
    #[serde(default)]
    pub stdout: String,
}

impl WorkerReply {
    pub(crate) fn error_text(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "snippet failed without a message".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_lines() {
        let exec = WorkerRequest::Exec {
            ns: NamespaceId(3),
            base: Some(NamespaceId(1)),
            code: "x = 1",
        };
        let line = exec.to_line(7).unwrap();
        assert!(line.ends_with('\n'));

        let json: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(json["op"], "exec");
        assert_eq!(json["id"], 7);
        assert_eq!(json["ns"], 3);
        assert_eq!(json["base"], 1);
        assert_eq!(json["code"], "x = 1");

        let new = WorkerRequest::New {
            ns: NamespaceId(4),
            class: "Solution",
            init: None,
            obj: ObjectId(5),
        };
        let json: serde_json::Value =
            serde_json::from_str(new.to_line(8).unwrap().trim_end()).unwrap();
        assert_eq!(json["op"], "new");
        assert!(json["init"].is_null());
        assert_eq!(new.op(), "new");
    }

    #[test]
    fn test_reply_parsing() {
        let reply: WorkerReply = serde_json::from_str(
            r#"{"id": 2, "ok": true, "stdout": "",
                "bindings": {"x": {"t": "int", "v": "0"}}}"#,
        )
        .unwrap();
        assert!(reply.ok);
        assert_eq!(reply.bindings.get("x"), Some(&Value::Int(0)));
        assert!(reply.value.is_none());

        let failed: WorkerReply = serde_json::from_str(
            r#"{"id": 3, "ok": false, "error": "ZeroDivisionError: division by zero"}"#,
        )
        .unwrap();
        assert_eq!(failed.error_text(), "ZeroDivisionError: division by zero");
    }
}
