//! JSON-lines framing between the host and the dispatcher.

use std::path::PathBuf;

use pdfbridge_core::{BatchReport, BridgeError, Command, Reply, TaskHandle, TaskId, ViewTag};
use serde_json::{json, Map, Value};

pub const MALFORMED_REQUEST: &str = "malformedRequest";

#[derive(Debug)]
pub enum Operation {
    Open { path: PathBuf },
    Close,
    Events,
    Command(Command),
}

#[derive(Debug)]
pub struct Request {
    pub id: Option<Value>,
    pub tag: ViewTag,
    pub operation: Operation,
}

/// A request line that could not be turned into a [`Request`].
#[derive(Debug)]
pub struct Malformed {
    pub id: Option<Value>,
    pub message: String,
}

impl Malformed {
    fn new(id: Option<Value>, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
        }
    }
}

/// Completion the host receives later for an asynchronous command.
#[derive(Debug)]
pub enum PendingCompletion {
    Thumbnail(TaskHandle<String>),
    Saved(TaskHandle<PathBuf>),
}

impl PendingCompletion {
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Thumbnail(handle) => handle.id(),
            Self::Saved(handle) => handle.id(),
        }
    }
}

pub fn parse_request(line: &str) -> Result<Request, Malformed> {
    let value: Value = serde_json::from_str(line)
        .map_err(|err| Malformed::new(None, format!("invalid JSON: {err}")))?;
    let Value::Object(mut fields) = value else {
        return Err(Malformed::new(None, "request must be a JSON object"));
    };

    let id = fields.remove("id");
    let tag = match fields.remove("tag") {
        Some(tag) => tag
            .as_i64()
            .ok_or_else(|| Malformed::new(id.clone(), "`tag` must be an integer"))?,
        None => return Err(Malformed::new(id, "missing `tag`")),
    };
    let op = match fields.get("op").and_then(Value::as_str) {
        Some(op) => op.to_owned(),
        None => return Err(Malformed::new(id, "missing `op`")),
    };

    let operation = match op.as_str() {
        "open" => {
            let path = fields
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| Malformed::new(id.clone(), "`open` requires a `path`"))?;
            Operation::Open {
                path: PathBuf::from(path),
            }
        }
        "close" => Operation::Close,
        "events" => Operation::Events,
        _ => {
            let command = serde_json::from_value(Value::Object(fields))
                .map_err(|err| Malformed::new(id.clone(), format!("`{op}`: {err}")))?;
            Operation::Command(command)
        }
    };

    Ok(Request { id, tag, operation })
}

pub fn ok_line(id: Option<Value>, result: Value) -> String {
    let mut line = Map::new();
    line.insert("id".into(), id.unwrap_or(Value::Null));
    line.insert("ok".into(), Value::Bool(true));
    line.insert("result".into(), result);
    Value::Object(line).to_string()
}

pub fn error_line(id: Option<Value>, kind: &str, message: &str) -> String {
    json!({
        "id": id.unwrap_or(Value::Null),
        "ok": false,
        "error": { "kind": kind, "message": message },
    })
    .to_string()
}

pub fn bridge_error_line(id: Option<Value>, err: &BridgeError) -> String {
    error_line(id, err.kind(), &format!("{err:#}"))
}

pub fn malformed_line(malformed: Malformed) -> String {
    error_line(malformed.id, MALFORMED_REQUEST, &malformed.message)
}

pub fn completion_line(task: TaskId, tag: ViewTag, kind: &str, result: Option<String>) -> String {
    json!({
        "task": task,
        "tag": tag,
        "kind": kind,
        "result": result,
    })
    .to_string()
}

/// Converts a dispatcher reply into its JSON result. Asynchronous replies
/// carry only their task id; the handle is returned for the caller to await.
pub fn encode_reply(reply: Reply) -> serde_json::Result<(Value, Option<PendingCompletion>)> {
    let value = match reply {
        Reply::Done => Value::Null,
        Reply::Bool(value) => Value::Bool(value),
        Reply::Count(count) | Reply::Page(count) => Value::from(count),
        Reply::Zoom(zoom) => Value::from(zoom),
        Reply::Dimensions(size) => serde_json::to_value(size)?,
        Reply::CropBox(crop) => serde_json::to_value(crop)?,
        Reply::Outline(outline) => serde_json::to_value(outline)?,
        Reply::Text(text) => Value::String(text),
        Reply::Path(path) => Value::String(path.display().to_string()),
        Reply::Matches(matches) => serde_json::to_value(matches)?,
        Reply::Match(found) => serde_json::to_value(found)?,
        Reply::Batch(report) => encode_batch(&report),
        Reply::Thumbnail(handle) => {
            let pending = PendingCompletion::Thumbnail(handle);
            return Ok((json!({ "task": pending.task_id() }), Some(pending)));
        }
        Reply::Saved(handle) => {
            let pending = PendingCompletion::Saved(handle);
            return Ok((json!({ "task": pending.task_id() }), Some(pending)));
        }
    };
    Ok((value, None))
}

fn encode_batch(report: &BatchReport) -> Value {
    let rejected: Vec<Value> = report
        .rejected
        .iter()
        .map(|err| json!({ "kind": err.kind(), "message": format!("{err:#}") }))
        .collect();
    json!({ "applied": report.applied, "rejected": rejected })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfbridge_core::PageSize;

    #[test]
    fn lifecycle_ops_are_parsed_before_commands() {
        let request = parse_request(r#"{"id": 7, "tag": 3, "op": "open", "path": "a.pdf"}"#)
            .unwrap();
        assert_eq!(request.id, Some(json!(7)));
        assert_eq!(request.tag, 3);
        assert!(matches!(
            request.operation,
            Operation::Open { ref path } if path == &PathBuf::from("a.pdf")
        ));

        let request = parse_request(r#"{"tag": 3, "op": "events"}"#).unwrap();
        assert!(request.id.is_none());
        assert!(matches!(request.operation, Operation::Events));
    }

    #[test]
    fn other_ops_decode_as_commands() {
        let request =
            parse_request(r#"{"id": "a", "tag": -1, "op": "setCurrentPage", "pageNumber": 4}"#)
                .unwrap();
        assert_eq!(request.tag, -1);
        match request.operation {
            Operation::Command(Command::SetCurrentPage { page_number }) => {
                assert_eq!(page_number, 4)
            }
            other => panic!("unexpected operation {other:?}"),
        }
    }

    #[test]
    fn malformed_requests_keep_the_id_when_present() {
        let err = parse_request("not json").unwrap_err();
        assert!(err.id.is_none());

        let err = parse_request(r#"{"id": 9, "op": "getZoom"}"#).unwrap_err();
        assert_eq!(err.id, Some(json!(9)));
        assert!(err.message.contains("tag"));

        let err = parse_request(r#"{"id": 9, "tag": 1, "op": "warpDrive"}"#).unwrap_err();
        assert!(err.message.contains("warpDrive"));

        let err = parse_request(r#"{"tag": 1, "op": "setZoom"}"#).unwrap_err();
        assert!(err.message.contains("zoom"));

        let line = malformed_line(err);
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["ok"], json!(false));
        assert_eq!(value["error"]["kind"], json!(MALFORMED_REQUEST));
    }

    #[test]
    fn replies_encode_to_plain_json() {
        let (value, pending) = encode_reply(Reply::Done).unwrap();
        assert_eq!(value, Value::Null);
        assert!(pending.is_none());

        let (value, _) = encode_reply(Reply::Dimensions(PageSize {
            width: 612.0,
            height: 792.0,
        }))
        .unwrap();
        assert_eq!(value, json!({ "width": 612.0, "height": 792.0 }));

        let (value, _) = encode_reply(Reply::Path(PathBuf::from("/tmp/a.pdf"))).unwrap();
        assert_eq!(value, json!("/tmp/a.pdf"));

        let report = BatchReport {
            applied: vec!["a".into()],
            rejected: vec![BridgeError::InvalidPage {
                page: 9,
                page_count: 2,
            }],
        };
        let (value, _) = encode_reply(Reply::Batch(report)).unwrap();
        assert_eq!(value["applied"], json!(["a"]));
        assert_eq!(value["rejected"][0]["kind"], json!("invalidPage"));
    }

    #[test]
    fn error_lines_carry_kind_and_message() {
        let line = bridge_error_line(Some(json!(1)), &BridgeError::UnknownTag(5));
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["id"], json!(1));
        assert_eq!(value["error"]["kind"], json!("unknownTag"));
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .contains("tag 5"));
    }

    #[test]
    fn completions_report_null_without_an_artifact() {
        let value: Value =
            serde_json::from_str(&completion_line(4, 2, "thumbnail", None)).unwrap();
        assert_eq!(value, json!({ "task": 4, "tag": 2, "kind": "thumbnail", "result": null }));
    }
}
