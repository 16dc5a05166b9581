use anyhow::{Context, Result, anyhow};
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use std::fmt;
use std::io::Write;

/// An object addressed as `s3://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Object {
    pub bucket: String,
    pub key: String,
}

impl S3Object {
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("s3://")
            .ok_or_else(|| anyhow!("not an s3 url: {url}"))?;
        match rest.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(Self {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            _ => Err(anyhow!("s3 url needs a bucket and a key: {url}")),
        }
    }

    /// Last key segment, used as the upload file name.
    pub fn file_name(&self) -> &str {
        self.key
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("s3-object")
    }

    /// Fetches the whole object into `out` on a short-lived runtime.
    pub fn download_to(&self, out: &mut impl Write) -> Result<u64> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("create tokio runtime")?;
        let bytes = runtime.block_on(async {
            let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
            let resp = Client::new(&config)
                .get_object()
                .bucket(&self.bucket)
                .key(&self.key)
                .send()
                .await
                .with_context(|| format!("get {self}"))?;
            let data = resp.body.collect().await.context("read s3 body")?;
            Ok::<_, anyhow::Error>(data.into_bytes())
        })?;
        out.write_all(&bytes).context("stage s3 object")?;
        log::debug!("staged {} bytes from {self}", bytes.len());
        Ok(bytes.len() as u64)
    }
}

impl fmt::Display for S3Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
