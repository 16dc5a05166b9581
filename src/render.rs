use std::fmt::Write;
use crate::assets::Asset;
use crate::executor::ExecutionResult;
use crate::form::{AssetInputMode, BodySection, FieldEncoding, FormDescriptor, Widget};
use crate::history::RequestHistoryEntry;
use crate::schema::Operation;

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Status line, elapsed time, then the body.
pub fn render_response(result: &ExecutionResult) -> String {
    let status = if result.status == 0 {
        "network error".to_string()
    } else {
        let reason = reqwest::StatusCode::from_u16(result.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("");
        format!("HTTP {} {}", result.status, reason).trim_end().to_string()
    };
    format!(
        "{} {}\n{} ({} ms)\n\n{}",
        result.method, result.url, status, result.latency_ms, result.body_text
    )
}

pub fn render_operation_line(op: &Operation) -> String {
    if op.summary.is_empty() {
        format!("{:<7} {}", op.method, op.path)
    } else {
        format!("{:<7} {}  {}", op.method, op.path, op.summary)
    }
}

pub fn render_form(form: &FormDescriptor, asset_mode: AssetInputMode) -> String {
    let mut out = String::new();
    push_line(&mut out, format!("{} {}", form.method, form.path));

    if !form.params.is_empty() {
        push_line(&mut out, "  params:");
        for param in &form.params {
            let required = if param.required { ", required" } else { "" };
            let widget = describe_widget(&param.widget, asset_mode);
            push_line(
                &mut out,
                format!(
                    "    {} ({}{required}): {widget}",
                    param.name,
                    param.location.as_str()
                ),
            );
            if let Some(description) = &param.description {
                push_line(&mut out, format!("      {description}"));
            }
        }
    }

    match &form.body {
        None => {}
        Some(BodySection::FileUpload { field }) => {
            push_line(
                &mut out,
                format!("  body: single file upload (multipart field '{field}')"),
            );
        }
        Some(BodySection::Fields { encoding, fields }) => {
            push_line(&mut out, format!("  body: {}", encoding_name(*encoding)));
            for field in fields {
                let required = if field.required { " (required)" } else { "" };
                let widget = describe_widget(&field.widget, asset_mode);
                push_line(&mut out, format!("    {}{required}: {widget}", field.name));
            }
        }
        Some(BodySection::FreeFields { encoding }) => {
            push_line(
                &mut out,
                format!(
                    "  body: {} with caller-chosen fields (--field NAME=VALUE, --file NAME=SOURCE)",
                    encoding_name(*encoding)
                ),
            );
        }
        Some(BodySection::Json {
            content_type,
            prefill,
        }) => {
            push_line(&mut out, format!("  body: {content_type}"));
            for line in prefill.iter().flat_map(|p| p.lines()) {
                push_line(&mut out, format!("    {line}"));
            }
        }
    }
    out
}

fn push_line(out: &mut String, line: impl AsRef<str>) {
    out.push_str(line.as_ref());
    out.push('\n');
}

fn encoding_name(encoding: FieldEncoding) -> &'static str {
    match encoding {
        FieldEncoding::Multipart => "multipart/form-data",
        FieldEncoding::UrlEncoded => "application/x-www-form-urlencoded",
    }
}

fn describe_widget(widget: &Widget, asset_mode: AssetInputMode) -> String {
    match widget {
        Widget::AssetPicker { options } => {
            let mode = match asset_mode {
                AssetInputMode::Select => "pick",
                AssetInputMode::Text => "text",
            };
            if options.is_empty() {
                return format!("asset ({mode}; no recent uploads, type an id)");
            }
            let choices: Vec<String> = options
                .iter()
                .enumerate()
                .map(|(i, o)| format!("[{i}] {}", o.label))
                .collect();
            format!("asset ({mode}) {}", choices.join(", "))
        }
        Widget::TriState => "unset | true | false".to_string(),
        Widget::Choice { options } => format!("unset | {}", options.join(" | ")),
        Widget::Text { placeholder } => format!("<{placeholder}>"),
        Widget::File => "file".to_string(),
    }
}

pub fn render_asset(asset: &Asset) -> String {
    let mut line = format!(
        "{}  {}  {}  {}",
        asset.asset_id,
        asset.filename,
        asset.content_type,
        format_bytes(asset.file_size)
    );
    if let Some(dimensions) = asset.dimensions() {
        let _ = write!(line, "  {dimensions}");
    }
    let _ = write!(
        line,
        "  {}  {}\n    {}",
        asset.processing_status, asset.upload_timestamp, asset.public_url
    );
    line
}

pub fn render_history_entry(entry: &RequestHistoryEntry) -> String {
    let outcome = if entry.success { "ok" } else { "failed" };
    format!(
        "{}  {:>3} {:<6}  {} {}  {} ms",
        entry.timestamp.to_rfc3339(),
        entry.status,
        outcome,
        entry.method,
        entry.url,
        entry.latency_ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetRegistry;
    use crate::form;
    use crate::schema::extract_operations;
    use serde_json::json;

    fn result(status: u16, body: &str) -> ExecutionResult {
        ExecutionResult {
            success: (200..300).contains(&status),
            status,
            latency_ms: 12,
            body_text: body.to_string(),
            url: "http://h/api/v1/health".to_string(),
            method: "GET".to_string(),
        }
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn renders_status_latency_and_body() {
        let text = render_response(&result(200, "{\n  \"status\": \"ok\"\n}"));
        assert!(text.starts_with("GET http://h/api/v1/health\nHTTP 200 OK (12 ms)\n\n"));
        assert!(text.ends_with("\"ok\"\n}"));

        let text = render_response(&result(0, "connection failed"));
        assert!(text.contains("network error (12 ms)"));
    }

    #[test]
    fn form_text_lists_params_and_body() {
        let ops = extract_operations(&json!({"paths": {
            "/api/v1/media/{asset_id}": {"post": {
                "parameters": [
                    {"name": "asset_id", "in": "path", "required": true, "schema": {"type": "string"}},
                    {"name": "thumb", "in": "query", "description": "Return a thumbnail",
                     "schema": {"type": "boolean"}}
                ],
                "requestBody": {"content": {"application/json": {"schema": {
                    "properties": {"q": {"type": "string"}}
                }}}}
            }}
        }}))
        .unwrap();
        let descriptor = form::build(&ops[0], &AssetRegistry::in_memory());

        let text = render_form(&descriptor, AssetInputMode::Select);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "POST /api/v1/media/{asset_id}",
                "  params:",
                "    asset_id (path, required): asset (pick; no recent uploads, type an id)",
                "    thumb (query): unset | true | false",
                "      Return a thumbnail",
                "  body: application/json",
                "    {",
                "      \"q\": \"\"",
                "    }",
            ]
        );
        assert!(text.ends_with("}\n"));
    }
}
