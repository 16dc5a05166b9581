use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

use crate::assets::{Asset, AssetRegistry};
use crate::client::{ApiClient, Body, MultipartEntry, RawResponse};
use crate::error::{ExplorerError, Result};
use crate::form::{BodyState, FieldEncoding, FormState, is_upload_operation};
use crate::history::{RequestHistory, RequestHistoryEntry};
use crate::schema::{Operation, ParamLocation};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    /// HTTP status, or 0 when no response arrived.
    pub status: u16,
    pub latency_ms: u64,
    pub body_text: String,
    pub url: String,
    pub method: String,
}

#[derive(Debug)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub body: Option<Body>,
}

pub fn build_url(base_url: &str, op: &Operation, state: &FormState) -> String {
    let mut url = format!("{}{}", base_url.trim_end_matches('/'), op.path);

    for (name, value) in state.param_values(ParamLocation::Path) {
        let encoded = urlencoding::encode(value);
        url = url.replace(&format!("{{{}}}", name), encoded.as_ref());
    }

    for (name, value) in state.param_values(ParamLocation::Query) {
        let separator = if url.contains('?') { '&' } else { '?' };
        url.push(separator);
        url.push_str(&urlencoding::encode(name));
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }

    url
}

/// Encodes the body. Blocking failures (`FileRequired`,
/// `MalformedRequestBody`) are returned before anything is sent.
pub fn prepare_body(op: &Operation, state: &FormState) -> Result<Option<Body>> {
    if is_upload_operation(op) {
        let (field, file) = match state.body() {
            BodyState::Upload { field, selection } => (field.as_str(), selection.file()),
            _ => (crate::form::UPLOAD_FIELD, None),
        };
        let file = file.ok_or(ExplorerError::FileRequired)?;
        return Ok(Some(Body::Multipart(vec![MultipartEntry::File {
            name: field.to_string(),
            path: file.path.clone(),
            file_name: file.file_name.clone(),
        }])));
    }

    match state.body() {
        BodyState::None | BodyState::Upload { .. } => Ok(None),
        BodyState::Json { buffer } => {
            if buffer.trim().is_empty() {
                return Ok(None);
            }
            let value: Value = serde_json::from_str(buffer)
                .map_err(|err| ExplorerError::MalformedRequestBody(err.to_string()))?;
            Ok(Some(Body::Json(value)))
        }
        BodyState::Fields {
            encoding: FieldEncoding::UrlEncoded,
            text,
            ..
        } => {
            let pairs: Vec<(String, String)> = text
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Ok((!pairs.is_empty()).then_some(Body::Form(pairs)))
        }
        BodyState::Fields {
            encoding: FieldEncoding::Multipart,
            text,
            files,
            ..
        } => {
            let mut entries: Vec<MultipartEntry> = text
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(name, value)| MultipartEntry::Text {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect();
            for (name, selection) in files {
                let Some(file) = selection.file() else {
                    continue;
                };
                entries.push(MultipartEntry::File {
                    name: name.clone(),
                    path: file.path.clone(),
                    file_name: file.file_name.clone(),
                });
            }
            Ok((!entries.is_empty()).then_some(Body::Multipart(entries)))
        }
    }
}

pub fn prepare(base_url: &str, op: &Operation, state: &FormState) -> Result<PreparedRequest> {
    let body = prepare_body(op, state)?;
    Ok(PreparedRequest {
        method: op.method.clone(),
        url: build_url(base_url, op, state),
        body,
    })
}

/// Issues the request. Only blocking input errors are returned as `Err`;
/// network failures come back as a result with status 0.
pub fn execute(api: &ApiClient, op: &Operation, state: &FormState) -> Result<ExecutionResult> {
    let request = prepare(api.base_url(), op, state)?;
    let PreparedRequest { method, url, body } = request;

    let started = Instant::now();
    let outcome = api.send(&method, &url, body);
    let latency_ms = started.elapsed().as_millis() as u64;

    let result = match outcome {
        Ok(resp) => ExecutionResult {
            success: resp.is_success(),
            status: resp.status,
            latency_ms,
            body_text: response_text(&resp),
            url,
            method,
        },
        Err(ExplorerError::Transport(message)) => {
            log::warn!("{} {} failed: {}", method, url, message);
            ExecutionResult {
                success: false,
                status: 0,
                latency_ms,
                body_text: message,
                url,
                method,
            }
        }
        Err(err) => return Err(err),
    };
    Ok(result)
}

pub fn execute_and_record(
    api: &ApiClient,
    op: &Operation,
    state: &FormState,
    registry: &mut AssetRegistry,
    history: &mut RequestHistory,
) -> Result<ExecutionResult> {
    let result = execute(api, op, state)?;

    history.record(RequestHistoryEntry {
        operation: op.id.clone(),
        method: result.method.clone(),
        url: result.url.clone(),
        status: result.status,
        success: result.success,
        latency_ms: result.latency_ms,
        timestamp: Utc::now(),
    });

    if result.success && is_upload_operation(op) {
        register_upload(&result, registry);
    }
    Ok(result)
}

fn register_upload(result: &ExecutionResult, registry: &mut AssetRegistry) {
    let asset = serde_json::from_str::<Value>(&result.body_text)
        .ok()
        .as_ref()
        .and_then(Asset::from_upload_response);
    match asset {
        Some(asset) => {
            registry.add(asset);
        }
        None => log::warn!("upload succeeded but the response did not describe an asset"),
    }
}

fn response_text(resp: &RawResponse) -> String {
    if resp.is_json() {
        if let Ok(value) = serde_json::from_str::<Value>(&resp.text) {
            if let Ok(pretty) = serde_json::to_string_pretty(&value) {
                return pretty;
            }
        }
    }
    resp.text.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{self, UPLOAD_FIELD};
    use crate::schema::extract_operations;
    use serde_json::json;

    fn catalog() -> Vec<Operation> {
        extract_operations(&json!({"paths": {
            "/api/v1/media/{id}": {"get": {"parameters": [
                {"name": "id", "in": "path", "required": true, "schema": {"type": "string"}},
                {"name": "fmt", "in": "query", "schema": {"type": "string"}},
                {"name": "size", "in": "query", "schema": {"type": "integer"}},
                {"name": "empty", "in": "query", "schema": {"type": "string"}}
            ]}},
            "/api/v1/search?mode=fast": {"get": {"parameters": [
                {"name": "q", "in": "query", "schema": {"type": "string"}}
            ]}},
            "/api/v1/similarity": {"post": {"requestBody": {"content": {
                "application/json": {"schema": {"properties": {"a": {"type": "string"}}}}
            }}}},
            "/api/v1/batch": {"post": {"requestBody": {"content": {
                "multipart/form-data": {"schema": {"properties": {
                    "image": {"type": "string", "format": "binary"},
                    "note": {"type": "string"}
                }}}
            }}}},
            "/api/v1/login": {"post": {"requestBody": {"content": {
                "application/x-www-form-urlencoded": {"schema": {"properties": {
                    "user": {"type": "string"},
                    "token": {"type": "string"}
                }}}
            }}}},
            "/api/v1/upload-media": {"post": {}}
        }}))
        .unwrap()
    }

    fn find<'a>(ops: &'a [Operation], id: &str) -> &'a Operation {
        ops.iter().find(|o| o.id == id).unwrap()
    }

    fn state_for(op: &Operation) -> FormState {
        FormState::new(&form::build(op, &AssetRegistry::in_memory()))
    }

    #[test]
    fn encodes_path_values() {
        let ops = catalog();
        let op = find(&ops, "GET /api/v1/media/{id}");
        let mut state = state_for(op);
        state.set_param("id", "a b").unwrap();
        let url = build_url("http://h/", op, &state);
        assert_eq!(url, "http://h/api/v1/media/a%20b");
    }

    #[test]
    fn appends_query_with_single_question_mark() {
        let ops = catalog();
        let op = find(&ops, "GET /api/v1/media/{id}");
        let mut state = state_for(op);
        state.set_param("id", "a b").unwrap();
        state.set_param("fmt", "png").unwrap();
        let url = build_url("http://h", op, &state);
        assert!(url.ends_with("/api/v1/media/a%20b?fmt=png"), "{url}");

        state.set_param("size", "64").unwrap();
        state.set_param("empty", "").unwrap();
        let url = build_url("http://h", op, &state);
        assert!(url.ends_with("?fmt=png&size=64"), "{url}");
        assert_eq!(url.matches('?').count(), 1);
    }

    #[test]
    fn existing_query_string_gets_ampersand() {
        let ops = catalog();
        let op = find(&ops, "GET /api/v1/search?mode=fast");
        let mut state = state_for(op);
        state.set_param("q", "red & blue").unwrap();
        let url = build_url("http://h", op, &state);
        assert_eq!(url, "http://h/api/v1/search?mode=fast&q=red%20%26%20blue");
    }

    #[test]
    fn unfilled_path_placeholder_is_left_alone() {
        let ops = catalog();
        let op = find(&ops, "GET /api/v1/media/{id}");
        let url = build_url("http://h", op, &state_for(op));
        assert_eq!(url, "http://h/api/v1/media/{id}");
    }

    #[test]
    fn invalid_json_blocks_the_request() {
        let ops = catalog();
        let op = find(&ops, "POST /api/v1/similarity");
        let mut state = state_for(op);
        state.set_body_text("{\"a\": ").unwrap();
        assert!(matches!(
            prepare_body(op, &state),
            Err(ExplorerError::MalformedRequestBody(_))
        ));
        state.set_body_text("  ").unwrap();
        assert!(prepare_body(op, &state).unwrap().is_none());
        state.set_body_text("{\"a\": \"x\"}").unwrap();
        assert!(matches!(
            prepare_body(op, &state).unwrap(),
            Some(Body::Json(v)) if v == json!({"a": "x"})
        ));
    }

    #[test]
    fn upload_without_file_is_blocked() {
        let ops = catalog();
        let op = find(&ops, "POST /api/v1/upload-media");
        let state = state_for(op);
        assert!(matches!(
            prepare_body(op, &state),
            Err(ExplorerError::FileRequired)
        ));
        // Nothing is listening here; a blocked request never gets that far.
        let api = ApiClient::new("http://127.0.0.1:9".to_string(), Some(1), None).unwrap();
        assert!(matches!(
            execute(&api, op, &state),
            Err(ExplorerError::FileRequired)
        ));
    }

    #[test]
    fn upload_sends_single_file_part() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        std::fs::write(&path, b"\x89PNG").unwrap();
        let ops = catalog();
        let op = find(&ops, "POST /api/v1/upload-media");
        let mut state = state_for(op);
        state
            .attach_file(UPLOAD_FIELD, crate::sources::SourceFile::local(&path).unwrap())
            .unwrap();
        let Some(Body::Multipart(entries)) = prepare_body(op, &state).unwrap() else {
            panic!("expected multipart");
        };
        assert_eq!(
            entries,
            vec![MultipartEntry::File {
                name: "file".to_string(),
                path,
                file_name: "pic.png".to_string(),
            }]
        );
    }

    #[test]
    fn multipart_skips_empty_text_and_missing_files() {
        let ops = catalog();
        let op = find(&ops, "POST /api/v1/batch");
        let mut state = state_for(op);
        assert!(prepare_body(op, &state).unwrap().is_none());
        state.set_field("note", "").unwrap();
        assert!(prepare_body(op, &state).unwrap().is_none());
        state.set_field("note", "hello").unwrap();
        let Some(Body::Multipart(entries)) = prepare_body(op, &state).unwrap() else {
            panic!("expected multipart");
        };
        assert_eq!(
            entries,
            vec![MultipartEntry::Text {
                name: "note".to_string(),
                value: "hello".to_string()
            }]
        );
        assert!(state.set_field("image", "text").is_err());
    }

    #[test]
    fn multipart_file_field_travels_with_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        std::fs::write(&path, b"\xff\xd8").unwrap();
        let ops = catalog();
        let op = find(&ops, "POST /api/v1/batch");
        let mut state = state_for(op);
        state.set_field("note", "first pass").unwrap();
        state
            .attach_file("image", crate::sources::SourceFile::local(&path).unwrap())
            .unwrap();

        let Some(Body::Multipart(entries)) = prepare_body(op, &state).unwrap() else {
            panic!("expected multipart");
        };
        assert_eq!(
            entries,
            vec![
                MultipartEntry::Text {
                    name: "note".to_string(),
                    value: "first pass".to_string()
                },
                MultipartEntry::File {
                    name: "image".to_string(),
                    path,
                    file_name: "frame.jpg".to_string(),
                },
            ]
        );

        state.remove_file("image").unwrap();
        let Some(Body::Multipart(entries)) = prepare_body(op, &state).unwrap() else {
            panic!("expected multipart");
        };
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn files_only_attach_to_binary_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        std::fs::write(&path, b"\xff\xd8").unwrap();
        let ops = catalog();

        let batch = find(&ops, "POST /api/v1/batch");
        let mut state = state_for(batch);
        let file = crate::sources::SourceFile::local(&path).unwrap();
        assert!(matches!(
            state.attach_file("note", file),
            Err(ExplorerError::InvalidInput { .. })
        ));
        let file = crate::sources::SourceFile::local(&path).unwrap();
        assert!(state.attach_file("missing", file).is_err());

        let login = find(&ops, "POST /api/v1/login");
        let mut state = state_for(login);
        let file = crate::sources::SourceFile::local(&path).unwrap();
        assert!(state.attach_file("user", file).is_err());
    }

    #[test]
    fn url_encoded_form_skips_empty_fields() {
        let ops = catalog();
        let op = find(&ops, "POST /api/v1/login");
        let mut state = state_for(op);
        assert!(prepare_body(op, &state).unwrap().is_none());

        state.set_field("user", "ada").unwrap();
        state.set_field("token", "").unwrap();
        assert_eq!(
            prepare_body(op, &state).unwrap(),
            Some(Body::Form(vec![("user".to_string(), "ada".to_string())]))
        );
        assert!(state.set_field("password", "x").is_err());
    }

    #[test]
    fn unreachable_host_yields_status_zero() {
        let ops = catalog();
        let op = find(&ops, "POST /api/v1/similarity");
        let api = ApiClient::new("http://127.0.0.1:9".to_string(), Some(2), None).unwrap();
        let result = execute(&api, op, &state_for(op)).unwrap();
        assert!(!result.success);
        assert_eq!(result.status, 0);
        assert!(!result.body_text.is_empty());
    }
}
