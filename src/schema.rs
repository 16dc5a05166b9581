use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::ApiClient;
use crate::error::{ExplorerError, Result};

pub const SCHEMA_PATH: &str = "/openapi.json";
pub const DEFAULT_TAG: &str = "General";

const METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
}

impl ParamLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
        }
    }
}

/// The parts of a JSON schema that drive widget choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaHint {
    pub schema_type: Option<String>,
    pub format: Option<String>,
    pub enum_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub description: Option<String>,
    pub schema: SchemaHint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    pub required: bool,
    pub schema: SchemaHint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBodySpec {
    pub required: bool,
    /// Declared media types in document order; only the first is honored.
    pub content_types: Vec<String>,
    pub schema: Option<Value>,
    pub example: Option<Value>,
}

impl RequestBodySpec {
    pub fn content_type(&self) -> Option<&str> {
        self.content_types.first().map(|v| v.as_str())
    }

    pub fn properties(&self) -> Vec<PropertySpec> {
        self.schema.as_ref().map(object_properties).unwrap_or_default()
    }
}

/// Named top-level properties of an object schema. Malformed entries are
/// skipped.
pub fn object_properties(schema: &Value) -> Vec<PropertySpec> {
    let Some(schema) = schema.as_object() else {
        return Vec::new();
    };
    let Some(props) = schema.get("properties").and_then(|v| v.as_object()) else {
        return Vec::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    props
        .iter()
        .filter(|(_, v)| v.is_object())
        .map(|(name, v)| PropertySpec {
            name: name.clone(),
            required: required.contains(&name.as_str()),
            schema: schema_hint(v),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub method: String,
    pub path: String,
    pub tags: Vec<String>,
    pub summary: String,
    pub description: Option<String>,
    pub operation_id: Option<String>,
    pub params: Vec<Parameter>,
    pub request_body: Option<RequestBodySpec>,
    pub responses: Vec<String>,
}

impl Operation {
    pub fn first_tag(&self) -> &str {
        self.tags.first().map(|v| v.as_str()).unwrap_or(DEFAULT_TAG)
    }

    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn matches_reference(&self, reference: &str) -> bool {
        let reference = reference.trim();
        if self.operation_id.as_deref() == Some(reference) {
            return true;
        }
        match reference.split_once(char::is_whitespace) {
            Some((method, path)) => {
                method.eq_ignore_ascii_case(&self.method) && path.trim() == self.path
            }
            None => false,
        }
    }
}

pub fn identifier(method: &str, path: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), path)
}

/// Fetches the schema document and flattens it into operations.
pub fn load(api: &ApiClient) -> Result<Vec<Operation>> {
    let resp = api
        .get(SCHEMA_PATH)
        .map_err(|err| ExplorerError::SchemaUnavailable(err.to_string()))?;
    if !resp.is_success() {
        return Err(ExplorerError::SchemaUnavailable(format!(
            "http {} from {}",
            resp.status, SCHEMA_PATH
        )));
    }
    let doc: Value = serde_json::from_str(&resp.text)
        .map_err(|err| ExplorerError::SchemaMalformed(format!("invalid JSON: {err}")))?;
    let ops = extract_operations(&doc)?;
    log::debug!("loaded {} operations from {}", ops.len(), api.base_url());
    Ok(ops)
}

pub fn extract_operations(doc: &Value) -> Result<Vec<Operation>> {
    let paths = doc
        .as_object()
        .ok_or_else(|| ExplorerError::SchemaMalformed("document is not an object".to_string()))?
        .get("paths")
        .and_then(|v| v.as_object())
        .ok_or_else(|| ExplorerError::SchemaMalformed("missing paths object".to_string()))?;

    let mut ops = Vec::new();
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            log::debug!("skipping non-object path item {path}");
            continue;
        };
        for (method, raw) in item {
            if !METHODS.contains(&method.as_str()) {
                continue;
            }
            let Some(raw) = raw.as_object() else {
                continue;
            };
            ops.push(build_operation(doc, path, method, raw));
        }
    }

    sort_operations(&mut ops);
    Ok(ops)
}

/// First tag, then path, then method.
pub fn sort_operations(ops: &mut [Operation]) {
    ops.sort_by(|a, b| {
        a.first_tag()
            .cmp(b.first_tag())
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.method.cmp(&b.method))
    });
}

fn build_operation(doc: &Value, path: &str, method: &str, raw: &Map<String, Value>) -> Operation {
    let mut tags: Vec<String> = raw
        .get("tags")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|v| v.to_string())
                .collect()
        })
        .unwrap_or_default();
    if tags.is_empty() {
        tags.push(DEFAULT_TAG.to_string());
    }

    let operation_id = string_field(raw, "operationId");
    let summary = string_field(raw, "summary")
        .or_else(|| operation_id.clone())
        .unwrap_or_default();

    let params = raw
        .get("parameters")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|p| build_parameter(doc, p)).collect())
        .unwrap_or_default();

    let request_body = raw
        .get("requestBody")
        .map(|v| resolve_ref(doc, v))
        .and_then(|v| v.as_object())
        .map(|body| build_request_body(doc, body));

    let responses = raw
        .get("responses")
        .and_then(|v| v.as_object())
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();

    Operation {
        id: identifier(method, path),
        method: method.to_ascii_uppercase(),
        path: path.to_string(),
        tags,
        summary,
        description: string_field(raw, "description"),
        operation_id,
        params,
        request_body,
        responses,
    }
}

fn build_parameter(doc: &Value, raw: &Value) -> Option<Parameter> {
    let raw = resolve_ref(doc, raw).as_object()?;
    let name = raw.get("name").and_then(|v| v.as_str())?.to_string();
    let location = match raw.get("in").and_then(|v| v.as_str()) {
        Some("path") => ParamLocation::Path,
        Some("query") => ParamLocation::Query,
        other => {
            log::debug!("skipping parameter {name} in {:?}", other);
            return None;
        }
    };
    let schema = raw
        .get("schema")
        .map(|v| schema_hint(resolve_ref(doc, v)))
        .unwrap_or_default();
    Some(Parameter {
        name,
        required: location == ParamLocation::Path
            || raw.get("required").and_then(|v| v.as_bool()).unwrap_or(false),
        location,
        description: string_field(raw, "description"),
        schema,
    })
}

fn build_request_body(doc: &Value, raw: &Map<String, Value>) -> RequestBodySpec {
    let required = raw.get("required").and_then(|v| v.as_bool()).unwrap_or(false);
    let content = raw.get("content").and_then(|v| v.as_object());
    let content_types: Vec<String> = content
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();

    let media = content
        .and_then(|map| map.values().next())
        .and_then(|v| v.as_object());
    let schema = media
        .and_then(|m| m.get("schema"))
        .map(|v| resolve_ref(doc, v).clone());
    let example = media.and_then(|m| {
        m.get("example").cloned().or_else(|| {
            m.get("examples")
                .and_then(|v| v.as_object())
                .and_then(|examples| examples.values().next())
                .and_then(|first| first.get("value"))
                .cloned()
        })
    });

    RequestBodySpec {
        required,
        content_types,
        schema,
        example,
    }
}

/// Derives type, format and enum hints. Nullable unions (`anyOf` with a
/// `null` branch) collapse to their first non-null branch.
pub fn schema_hint(schema: &Value) -> SchemaHint {
    let Some(obj) = schema.as_object() else {
        return SchemaHint::default();
    };

    let mut hint = SchemaHint {
        schema_type: obj.get("type").and_then(type_name),
        format: string_field(obj, "format"),
        enum_values: obj
            .get("enum")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().map(scalar_to_string).collect())
            .unwrap_or_default(),
    };

    if hint.schema_type.is_none() {
        let branch = ["anyOf", "oneOf"]
            .iter()
            .filter_map(|key| obj.get(*key).and_then(|v| v.as_array()))
            .flatten()
            .find(|b| b.get("type").and_then(|v| v.as_str()) != Some("null"));
        if let Some(branch) = branch {
            let inner = schema_hint(branch);
            hint.schema_type = inner.schema_type;
            hint.format = hint.format.or(inner.format);
            if hint.enum_values.is_empty() {
                hint.enum_values = inner.enum_values;
            }
        }
    }
    hint
}

fn type_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        // `type: ["string", "null"]`
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .find(|v| *v != "null")
            .map(|v| v.to_string()),
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// Follows one local `#/...` reference; anything else is returned as is.
fn resolve_ref<'a>(doc: &'a Value, value: &'a Value) -> &'a Value {
    let Some(reference) = value.get("$ref").and_then(|v| v.as_str()) else {
        return value;
    };
    let Some(pointer) = reference.strip_prefix('#') else {
        return value;
    };
    doc.pointer(pointer).unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_doc() -> Value {
        json!({
            "openapi": "3.1.0",
            "paths": {
                "/api/v1/media/{asset_id}": {
                    "parameters": [{"name": "shared", "in": "query"}],
                    "get": {
                        "tags": ["Media"],
                        "operationId": "get_media",
                        "parameters": [
                            {"name": "asset_id", "in": "path", "required": true, "schema": {"type": "string"}},
                            {"name": "X-Trace", "in": "header", "schema": {"type": "string"}}
                        ],
                        "responses": {"200": {}}
                    },
                    "delete": {
                        "tags": ["Media"],
                        "summary": "Delete media",
                        "responses": {"200": {}}
                    }
                },
                "/api/v1/health": {
                    "get": {"summary": "Health"}
                },
                "/api/v1/upload-media": {
                    "post": {
                        "tags": ["Media"],
                        "requestBody": {"$ref": "#/components/requestBodies/Upload"}
                    }
                }
            },
            "components": {
                "requestBodies": {
                    "Upload": {
                        "required": true,
                        "content": {
                            "multipart/form-data": {
                                "schema": {"$ref": "#/components/schemas/Body_upload"}
                            },
                            "application/json": {}
                        }
                    }
                },
                "schemas": {
                    "Body_upload": {
                        "type": "object",
                        "required": ["file"],
                        "properties": {"file": {"type": "string", "format": "binary"}}
                    }
                }
            }
        })
    }

    #[test]
    fn extracts_one_operation_per_method_entry() {
        let ops = extract_operations(&sample_doc()).unwrap();
        assert_eq!(ops.len(), 4);
        let mut ids: Vec<&str> = ops.iter().map(|o| o.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn defaults_tags_and_summary() {
        let ops = extract_operations(&sample_doc()).unwrap();
        let health = ops.iter().find(|o| o.path == "/api/v1/health").unwrap();
        assert_eq!(health.tags, vec![DEFAULT_TAG.to_string()]);
        assert_eq!(health.summary, "Health");

        let get = ops.iter().find(|o| o.id == "GET /api/v1/media/{asset_id}").unwrap();
        assert_eq!(get.summary, "get_media");
        let upload = ops.iter().find(|o| o.method == "POST").unwrap();
        assert_eq!(upload.summary, "");
    }

    #[test]
    fn sorts_by_first_tag_then_path() {
        let ops = extract_operations(&sample_doc()).unwrap();
        let order: Vec<&str> = ops.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "GET /api/v1/health",
                "DELETE /api/v1/media/{asset_id}",
                "GET /api/v1/media/{asset_id}",
                "POST /api/v1/upload-media",
            ]
        );
    }

    #[test]
    fn keeps_only_path_and_query_parameters() {
        let ops = extract_operations(&sample_doc()).unwrap();
        let get = ops.iter().find(|o| o.id == "GET /api/v1/media/{asset_id}").unwrap();
        assert_eq!(get.params.len(), 1);
        assert_eq!(get.params[0].location, ParamLocation::Path);
        assert!(get.params[0].required);
    }

    #[test]
    fn resolves_body_references_and_keeps_first_content_type() {
        let ops = extract_operations(&sample_doc()).unwrap();
        let upload = ops.iter().find(|o| o.method == "POST").unwrap();
        let body = upload.request_body.as_ref().unwrap();
        assert!(body.required);
        assert_eq!(body.content_type(), Some("multipart/form-data"));
        let props = body.properties();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].name, "file");
        assert!(props[0].required);
        assert_eq!(props[0].schema.format.as_deref(), Some("binary"));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(
            extract_operations(&json!([1, 2])),
            Err(ExplorerError::SchemaMalformed(_))
        ));
        assert!(matches!(
            extract_operations(&json!({"openapi": "3.1.0"})),
            Err(ExplorerError::SchemaMalformed(_))
        ));
    }

    #[test]
    fn nullable_union_collapses_to_inner_type() {
        let hint = schema_hint(&json!({
            "anyOf": [{"type": "integer", "format": "int32"}, {"type": "null"}]
        }));
        assert_eq!(hint.schema_type.as_deref(), Some("integer"));
        assert_eq!(hint.format.as_deref(), Some("int32"));

        let hint = schema_hint(&json!({"type": ["null", "boolean"]}));
        assert_eq!(hint.schema_type.as_deref(), Some("boolean"));
    }

    #[test]
    fn matches_identifier_or_operation_id() {
        let ops = extract_operations(&sample_doc()).unwrap();
        let get = ops.iter().find(|o| o.id == "GET /api/v1/media/{asset_id}").unwrap();
        assert!(get.matches_reference("get_media"));
        assert!(get.matches_reference("get /api/v1/media/{asset_id}"));
        assert!(!get.matches_reference("DELETE /api/v1/media/{asset_id}"));
    }
}
