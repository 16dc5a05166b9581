use reqwest::blocking::{Client, RequestBuilder, multipart};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ExplorerError, Result};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone)]
pub enum Auth {
    ApiKey(String),
    Bearer(String),
}

#[derive(Debug, PartialEq)]
pub enum Body {
    Json(Value),
    Form(Vec<(String, String)>),
    Multipart(Vec<MultipartEntry>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MultipartEntry {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        path: PathBuf,
        file_name: String,
    },
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub text: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
    }
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    auth: Option<Auth>,
}

impl ApiClient {
    pub fn new(base_url: String, timeout: Option<u64>, auth: Option<Auth>) -> Result<Self> {
        let seconds = timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = Client::builder()
            .user_agent(concat!("api-explorer/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(seconds))
            .build()
            .map_err(|err| ExplorerError::Transport(format!("build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: normalize_base(&base_url),
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_base_url(&mut self, base_url: &str) {
        self.base_url = normalize_base(base_url);
    }

    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return self.base_url.clone();
        }
        format!("{}/{}", self.base_url, path)
    }

    pub fn send(&self, method: &str, url: &str, body: Option<Body>) -> Result<RawResponse> {
        let verb = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ExplorerError::UnsupportedMethod(method.to_string()))?;
        let mut request = self.client.request(verb, url);

        request = apply_auth(request, self.auth.as_ref())?;
        request = match body {
            None => request,
            Some(Body::Json(value)) => request.json(&value),
            Some(Body::Form(fields)) => request.form(&fields),
            // Boundary headers come from reqwest.
            Some(Body::Multipart(entries)) => request.multipart(build_multipart(entries)?),
        };

        log::debug!("request {} {}", method, url);
        let resp = request
            .send()
            .map_err(|err| ExplorerError::Transport(describe_transport_error(&err)))?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let text = resp
            .text()
            .map_err(|err| ExplorerError::Transport(format!("read response body: {err}")))?;
        log::debug!("response {} from {} ({} bytes)", status, url, text.len());
        Ok(RawResponse {
            status,
            content_type,
            text,
        })
    }

    pub fn get(&self, path: &str) -> Result<RawResponse> {
        let url = self.build_url(path);
        self.send("GET", &url, None)
    }

    /// GET a JSON document, failing on transport errors, non-2xx status or
    /// undecodable payloads.
    pub fn get_json(&self, path: &str) -> Result<Value> {
        let resp = self.get(path)?;
        if !resp.is_success() {
            return Err(ExplorerError::Transport(format!(
                "http {} from {}",
                resp.status, path
            )));
        }
        serde_json::from_str(&resp.text)
            .map_err(|err| ExplorerError::Transport(format!("decode json from {path}: {err}")))
    }
}

fn normalize_base(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

fn apply_auth(req: RequestBuilder, auth: Option<&Auth>) -> Result<RequestBuilder> {
    match auth {
        None => Ok(req),
        Some(Auth::ApiKey(key)) => {
            let value = HeaderValue::from_str(key)
                .map_err(|_| ExplorerError::invalid_input("api key", "not a valid header value"))?;
            Ok(req.header(API_KEY_HEADER, value))
        }
        Some(Auth::Bearer(token)) => {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ExplorerError::invalid_input("bearer token", "not a valid header value"))?;
            Ok(req.header(AUTHORIZATION, value))
        }
    }
}

fn build_multipart(entries: Vec<MultipartEntry>) -> Result<multipart::Form> {
    let mut form = multipart::Form::new();
    for entry in entries {
        form = match entry {
            MultipartEntry::Text { name, value } => form.text(name, value),
            MultipartEntry::File {
                name,
                path,
                file_name,
            } => {
                let part = multipart::Part::file(&path)
                    .map_err(|err| {
                        ExplorerError::invalid_input(
                            &name,
                            format!("cannot open {}: {err}", path.display()),
                        )
                    })?
                    .file_name(file_name);
                form.part(name, part)
            }
        };
    }
    Ok(form)
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        return format!("request timed out: {err}");
    }
    if err.is_connect() {
        return format!("connection failed: {err}");
    }
    format!("request failed: {err}")
}
