#![allow(dead_code)]

use std::io::Read;
use std::thread;
use std::time::Duration;

use api_explorer::Explorer;
use api_explorer::assets::AssetRegistry;
use api_explorer::client::ApiClient;
use api_explorer::history::RequestHistory;
use serde_json::{Value, json};
use tiny_http::{Header, Response, Server, StatusCode};

/// What the stub saw for one request.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub url: String,
    pub content_type: Option<String>,
    pub body: String,
}

pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    pub fn json(status: u16, value: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.to_string(),
        }
    }
}

/// Serves up to `count` requests, then stops and hands back what it saw.
pub fn serve<F>(count: usize, handler: F) -> (String, thread::JoinHandle<Vec<Recorded>>)
where
    F: Fn(&Recorded) -> Reply + Send + 'static,
{
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let base = format!("http://{addr}");

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        while seen.len() < count {
            let Ok(Some(mut request)) = server.recv_timeout(Duration::from_secs(5)) else {
                break;
            };
            let mut raw = Vec::new();
            let _ = request.as_reader().read_to_end(&mut raw);
            let content_type = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Content-Type"))
                .map(|h| h.value.as_str().to_string());
            let recorded = Recorded {
                method: request.method().to_string(),
                url: request.url().to_string(),
                content_type,
                body: String::from_utf8_lossy(&raw).into_owned(),
            };
            let reply = handler(&recorded);
            let header =
                Header::from_bytes(&b"Content-Type"[..], reply.content_type.as_bytes()).unwrap();
            let response = Response::from_string(reply.body)
                .with_status_code(StatusCode(reply.status))
                .with_header(header);
            let _ = request.respond(response);
            seen.push(recorded);
        }
        seen
    });
    (base, handle)
}

pub fn explorer_for(base: &str) -> Explorer {
    let api = ApiClient::new(base.to_string(), Some(5), None).unwrap();
    Explorer::new(api, AssetRegistry::in_memory(), RequestHistory::in_memory())
}

pub fn media_schema() -> Value {
    json!({
        "openapi": "3.1.0",
        "info": {"title": "media utilities", "version": "1.0.0"},
        "paths": {
            "/api/v1/status": {
                "get": {"tags": ["General"], "summary": "Service status", "responses": {"200": {}}}
            },
            "/api/v1/upload-media": {
                "post": {
                    "tags": ["Media"],
                    "summary": "Upload media",
                    "requestBody": {"content": {"multipart/form-data": {
                        "schema": {"$ref": "#/components/schemas/Body_upload_media"}
                    }}}
                }
            },
            "/api/v1/media/{asset_id}": {
                "get": {
                    "tags": ["Media"],
                    "summary": "Get media",
                    "parameters": [
                        {"name": "asset_id", "in": "path", "required": true, "schema": {"type": "string"}},
                        {"name": "fmt", "in": "query", "schema": {"type": "string"}}
                    ]
                }
            },
            "/api/v1/batch/analyze": {
                "post": {
                    "tags": ["Batch"],
                    "summary": "Analyze a frame with a note",
                    "requestBody": {"content": {"multipart/form-data": {"schema": {
                        "type": "object",
                        "properties": {
                            "image": {"type": "string", "format": "binary"},
                            "note": {"type": "string"}
                        }
                    }}}}
                }
            },
            "/api/v1/similarity": {
                "post": {
                    "tags": ["Similarity"],
                    "summary": "Compare two assets",
                    "requestBody": {"content": {"application/json": {"schema": {
                        "type": "object",
                        "properties": {
                            "asset_id_1": {"type": "string"},
                            "asset_id_2": {"type": "string"}
                        }
                    }}}}
                }
            }
        },
        "components": {"schemas": {"Body_upload_media": {
            "type": "object",
            "required": ["file"],
            "properties": {"file": {"type": "string", "format": "binary"}}
        }}}
    })
}

pub fn upload_reply(asset_id: &str, filename: &str) -> Value {
    json!({
        "asset_id": asset_id,
        "filename": filename,
        "content_type": "image/png",
        "file_size": 4,
        "public_url": format!("https://media.example.com/{filename}"),
        "width": 1,
        "height": 1,
        "format": "PNG",
        "upload_timestamp": "2026-10-01T09:30:00",
        "processing_status": "uploaded",
        "processing_time": 0.01
    })
}
