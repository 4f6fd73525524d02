use std::sync::Arc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Body, Client, StatusCode};
use tracing::debug;
use url::Url;
use super::errors::{Result, TusError};
use super::metadata::Metadata;

pub const TUS_RESUMABLE: &str = "1.0.0";

pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Lets the caller decorate every request, e.g. with an `Authorization`
/// header.
pub trait RequestHook: Send + Sync {
    fn before_request(&self, headers: &mut HeaderMap) -> Result<()>;
}

/// tus 1.0.0 client: create, probe, append, terminate.
#[derive(Clone)]
pub struct TusClient {
    pub client: Client,
    pub endpoint: String,
    /// Read buffer used when streaming the body
    pub buffer_size: usize,
    hook: Option<Arc<dyn RequestHook>>,
}

impl TusClient {
    pub fn new(endpoint: &str, buffer_size: usize) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            buffer_size: buffer_size.max(1),
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: impl RequestHook + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    fn create_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("Tus-Resumable", HeaderValue::from_static(TUS_RESUMABLE));

        if let Some(hook) = &self.hook {
            hook.before_request(&mut headers)?;
        }

        Ok(headers)
    }

    pub fn parse_offset_header(status: u16, headers: &HeaderMap) -> Result<u64> {
        match headers.get("Upload-Offset") {
            Some(value) => {
                let offset = value
                    .to_str()
                    .map_err(|err| TusError::header_error("Upload-Offset", err))?
                    .parse::<u64>()
                    .map_err(|err| TusError::header_error("Upload-Offset", err))?;

                Ok(offset)
            },
            None => Err(TusError::server_error(status, "No 'upload-offset' header in response"))
        }
    }

    /// Absolute `Location` values are kept; relative ones are joined onto
    /// the creation endpoint.
    pub fn resolve_location(endpoint: &str, location: &str) -> Result<String> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return Ok(location.to_string());
        }

        let base = Url::parse(endpoint)?;
        Ok(base.join(location)?.to_string())
    }

    /// POST to the endpoint; returns the upload URL.
    pub async fn create_upload(&self, length: u64, metadata: &Metadata) -> Result<String> {
        let mut headers = self.create_headers()?;
        headers.insert("Upload-Length", HeaderValue::from_str(&length.to_string())?);

        let encoded = metadata.to_header();
        if !encoded.is_empty() {
            headers.insert("Upload-Metadata", HeaderValue::from_str(&encoded)?);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            return Err(TusError::server_error(status.as_u16(), "Failed to create upload"));
        }

        let location = response
            .headers()
            .get("Location")
            .ok_or_else(|| TusError::server_error(status.as_u16(), "No 'location' header in response"))?
            .to_str()
            .map_err(|err| TusError::header_error("Location", err))?;

        Self::resolve_location(&self.endpoint, location)
    }

    /// HEAD the upload: how many bytes the server has acknowledged.
    pub async fn get_upload_offset(&self, upload_url: &str) -> Result<u64> {
        let headers = self.create_headers()?;
        let response = self.client.head(upload_url).headers(headers).send().await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            return Err(TusError::server_error(status.as_u16(), "Failed to get upload offset"));
        }

        Self::parse_offset_header(status.as_u16(), response.headers())
    }

    /// PATCH `length` bytes starting at `offset`; returns the new offset.
    pub async fn append(&self, upload_url: &str, offset: u64, length: u64, body: Body) -> Result<u64> {
        let mut headers = self.create_headers()?;
        headers.insert("Content-Type", HeaderValue::from_static("application/offset+octet-stream"));
        headers.insert("Upload-Offset", HeaderValue::from_str(&offset.to_string())?);
        headers.insert("Content-Length", HeaderValue::from_str(&length.to_string())?);

        debug!(upload_url, offset, length, "PATCH");
        let response = self.client
            .patch(upload_url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            return Err(TusError::server_error(
                status.as_u16(),
                format!("Upload failed with status {}", status),
            ));
        }

        Self::parse_offset_header(status.as_u16(), response.headers())
    }

    /// DELETE the upload. A missing upload counts as terminated.
    pub async fn terminate(&self, upload_url: &str) -> Result<()> {
        let headers = self.create_headers()?;

        let response = self
            .client
            .delete(upload_url)
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(TusError::server_error(status.as_u16(), "Failed to cancel upload"));
        }

        Ok(())
    }
}
