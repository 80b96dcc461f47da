//! The structured payload an assistant turn may carry.
//!
//! After its prose, the model may emit one trailing JSON object describing
//! file operations. The model is not reliable about shapes: the operation
//! lists arrive as an array, a single bare object, `null`, or not at all.
//! All four are accepted; anything else fails with a specific error kind
//! instead of a generic parse failure.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A full-content file creation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileToCreate {
    pub path: String,
    pub content: String,
}

/// A first-occurrence, exact-substring replacement requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileToEdit {
    pub path: String,
    pub original_snippet: String,
    pub new_snippet: String,
}

/// One complete assistant turn: reply text plus ordered file operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistantResponse {
    pub assistant_reply: String,
    pub files_to_create: Vec<FileToCreate>,
    pub files_to_edit: Vec<FileToEdit>,
}

/// Why a complete JSON payload was rejected.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("response JSON is not an object")]
    NotAnObject,
    #[error("missing or non-string `assistant_reply`")]
    MissingReply,
    #[error("invalid `{field}`: {detail}")]
    InvalidField {
        field: &'static str,
        detail: String,
    },
}

/// Validate a complete JSON payload into an [`AssistantResponse`].
pub fn parse_response(text: &str) -> Result<AssistantResponse, ResponseError> {
    let value: Value = serde_json::from_str(text)?;
    let obj = value.as_object().ok_or(ResponseError::NotAnObject)?;

    let assistant_reply = obj
        .get("assistant_reply")
        .and_then(|v| v.as_str())
        .ok_or(ResponseError::MissingReply)?
        .to_string();

    Ok(AssistantResponse {
        assistant_reply,
        files_to_create: parse_ops(obj.get("files_to_create"), "files_to_create")?,
        files_to_edit: parse_ops(obj.get("files_to_edit"), "files_to_edit")?,
    })
}

/// Accept `null`/missing (empty), a single object, or an array of objects.
fn parse_ops<T: DeserializeOwned>(
    value: Option<&Value>,
    field: &'static str,
) -> Result<Vec<T>, ResponseError> {
    let invalid = |detail: String| ResponseError::InvalidField { field, detail };

    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v @ Value::Object(_)) => {
            let op = serde_json::from_value(v.clone()).map_err(|e| invalid(e.to_string()))?;
            Ok(vec![op])
        }
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| serde_json::from_value(v.clone()).map_err(|e| invalid(e.to_string())))
            .collect(),
        Some(other) => Err(invalid(format!(
            "expected an array of operations, got {}",
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_only() {
        let resp = parse_response(r#"{"assistant_reply":"done"}"#).unwrap();
        assert_eq!(resp.assistant_reply, "done");
        assert!(resp.files_to_create.is_empty());
        assert!(resp.files_to_edit.is_empty());
    }

    #[test]
    fn test_full_payload() {
        let resp = parse_response(
            r#"{"assistant_reply":"done",
                "files_to_create":[{"path":"x.py","content":"print(1)"}],
                "files_to_edit":[]}"#,
        )
        .unwrap();
        assert_eq!(resp.files_to_create.len(), 1);
        assert_eq!(resp.files_to_create[0].path, "x.py");
        assert!(resp.files_to_edit.is_empty());
    }

    #[test]
    fn test_single_object_coerced_to_list() {
        let resp = parse_response(
            r#"{"assistant_reply":"ok",
                "files_to_create":{"path":"a.txt","content":"hi"}}"#,
        )
        .unwrap();
        assert_eq!(resp.files_to_create.len(), 1);
    }

    #[test]
    fn test_null_lists_are_empty() {
        let resp = parse_response(
            r#"{"assistant_reply":"ok","files_to_create":null,"files_to_edit":null}"#,
        )
        .unwrap();
        assert!(resp.files_to_create.is_empty());
        assert!(resp.files_to_edit.is_empty());
    }

    #[test]
    fn test_missing_reply() {
        let err = parse_response(r#"{"files_to_create":[]}"#).unwrap_err();
        assert!(matches!(err, ResponseError::MissingReply));
    }

    #[test]
    fn test_not_an_object() {
        let err = parse_response(r#"[1,2,3]"#).unwrap_err();
        assert!(matches!(err, ResponseError::NotAnObject));
    }

    #[test]
    fn test_wrong_field_type() {
        let err = parse_response(r#"{"assistant_reply":"ok","files_to_edit":"nope"}"#).unwrap_err();
        match err {
            ResponseError::InvalidField { field, .. } => assert_eq!(field, "files_to_edit"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_edit_op_missing_snippet_field() {
        let err = parse_response(
            r#"{"assistant_reply":"ok","files_to_edit":[{"path":"a.txt"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ResponseError::InvalidField {
                field: "files_to_edit",
                ..
            }
        ));
    }
}
