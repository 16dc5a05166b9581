use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;
use tempfile::NamedTempFile;

use crate::render::format_bytes;
use crate::s3;

/// A file chosen for a file widget. Remote sources are staged into a
/// temporary file that lives as long as this value.
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    _temp: Option<tempfile::TempPath>,
}

impl SourceFile {
    pub fn local(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let meta = fs::metadata(&path).with_context(|| format!("stat {}", path.display()))?;
        if !meta.is_file() {
            return Err(anyhow!("not a file: {}", path.display()));
        }
        let file_name = path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("input")
            .to_string();
        Ok(Self {
            path,
            file_name,
            size: meta.len(),
            _temp: None,
        })
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Confirmation shown once a file is selected, e.g. `cat.png (1.5 KB)`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.file_name, format_bytes(self.size))
    }
}

pub fn looks_like_source(value: &str) -> bool {
    value.starts_with('@')
        || value.starts_with("file://")
        || value.starts_with("http://")
        || value.starts_with("https://")
        || value.starts_with("s3://")
}

pub fn resolve_source(value: &str) -> Result<SourceFile> {
    if value.starts_with("s3://") {
        return download_s3(value);
    }
    if value.starts_with("http://") || value.starts_with("https://") {
        return download_http(value);
    }

    let local = local_path(value);
    if local.exists() {
        return SourceFile::local(local);
    }

    Err(anyhow!("file not found: {value}"))
}

pub fn read_source_to_string(value: &str) -> Result<String> {
    let file = resolve_source(value)?;
    let mut f = File::open(&file.path).with_context(|| format!("open {}", file.path.display()))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf).context("read source")?;
    Ok(buf)
}

fn download_http(url: &str) -> Result<SourceFile> {
    let client = Client::new();
    let mut resp = client.get(url).send().context("download url")?;
    if !resp.status().is_success() {
        return Err(anyhow!("download failed (http {}): {url}", resp.status()));
    }
    let mut file = NamedTempFile::new().context("create temp file")?;
    let size = resp.copy_to(&mut file).context("write temp file")?;
    let file_name = url
        .split(['?', '#'])
        .next()
        .and_then(|v| v.rsplit('/').next())
        .filter(|v| !v.is_empty())
        .unwrap_or("download")
        .to_string();
    Ok(staged(file, file_name, size))
}

fn download_s3(url: &str) -> Result<SourceFile> {
    let object = s3::S3Object::parse(url)?;
    let mut file = NamedTempFile::new().context("create temp file")?;
    let size = object.download_to(&mut file)?;
    Ok(staged(file, object.file_name().to_string(), size))
}

fn staged(file: NamedTempFile, file_name: String, size: u64) -> SourceFile {
    let temp_path = file.into_temp_path();
    SourceFile {
        path: temp_path.to_path_buf(),
        file_name,
        size,
        _temp: Some(temp_path),
    }
}

fn local_path(value: &str) -> PathBuf {
    if let Some(path) = value.strip_prefix('@') {
        return PathBuf::from(path);
    }
    if let Some(path) = value.strip_prefix("file://") {
        return PathBuf::from(path);
    }
    PathBuf::from(value)
}
