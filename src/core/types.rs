use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;
use super::errors::{Result, UploadError};
use super::validation::{guess_content_type, AcceptFilter};

/// Identity of one upload attempt.
///
/// Every backend event carries the id of the session that opened the
/// transfer, so callbacks of a cancelled or replaced session can be told
/// apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Nothing in flight (fresh, or after cancel)
    #[default]
    Idle,
    /// Bytes are flowing to the backend
    Uploading,
    /// Backend transfer suspended, progress kept
    Paused,
    /// Backend returned a durable address
    Done,
    /// Validation or backend failure
    Error,
}

impl UploadState {
    pub fn label(&self) -> &'static str {
        match self {
            UploadState::Idle => "idle",
            UploadState::Uploading => "uploading",
            UploadState::Paused => "paused",
            UploadState::Done => "done",
            UploadState::Error => "error",
        }
    }

    /// Uploading or paused: a backend transfer is still owned.
    pub fn is_active(&self) -> bool {
        matches!(self, UploadState::Uploading | UploadState::Paused)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Done | UploadState::Error)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// File metadata handed to the destination builder and the validator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub content_type: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub enum FileBody {
    /// Blob already in memory
    Memory(Bytes),
    /// Streamed from disk on demand
    Disk(PathBuf),
}

/// Immutable file handle selected by the caller.
#[derive(Debug, Clone)]
pub struct SourceFile {
    info: FileInfo,
    body: FileBody,
}

impl SourceFile {
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            info: FileInfo {
                name: name.into(),
                content_type: content_type.into(),
                size: data.len() as u64,
            },
            body: FileBody::Memory(data),
        }
    }

    /// Open a file on disk; the content type is inferred from its extension.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Not a file: {}", path.display()),
            ));
        }

        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Unreadable file name: {}", path.display()),
            ))?
            .to_string();

        Ok(Self {
            info: FileInfo {
                content_type: guess_content_type(&name).to_string(),
                name,
                size: metadata.len(),
            },
            body: FileBody::Disk(path.to_path_buf()),
        })
    }

    /// Override the inferred content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.info.content_type = content_type.into();
        self
    }

    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn size(&self) -> u64 {
        self.info.size
    }

    pub fn body(&self) -> &FileBody {
        &self.body
    }
}

/// One observation from a backend progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProgressSample {
    /// Milliseconds since the session opened its transfer
    pub timestamp_ms: u64,
    pub bytes_transferred: u64,
}

impl ProgressSample {
    pub fn new(timestamp_ms: u64, bytes_transferred: u64) -> Self {
        Self { timestamp_ms, bytes_transferred }
    }
}

/// Telemetry derived from the latest two samples. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct DerivedMetrics {
    /// 0..=100
    pub percent_complete: u8,
    /// Bytes per second, never negative
    pub throughput: f64,
    /// `None` while unknown
    pub eta_seconds: Option<u64>,
}

/// Point-in-time copy of a session's observable fields.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub state: UploadState,
    pub file_name: Option<String>,
    pub destination: Option<String>,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub metrics: DerivedMetrics,
    pub download_address: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// How a `start` call ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase", tag = "outcome", content = "address")]
pub enum UploadOutcome {
    Uploaded(String),
    /// Reset by the caller; not an error
    Cancelled,
}

/// Maps the selected file to a backend key, e.g. `movies/{id}/{name}`
pub type DestinationBuilder = Arc<dyn Fn(&FileInfo) -> String + Send + Sync>;

pub type UploadedCallback = Arc<dyn Fn(&str) + Send + Sync>;

pub type ErrorCallback = Arc<dyn Fn(&UploadError) + Send + Sync>;

/// Construction-time configuration of an uploader.
#[derive(Clone)]
pub struct UploaderOptions {
    /// Builds the destination key from the file
    pub destination: DestinationBuilder,
    /// Address already stored on the record, shown until a new upload lands
    pub initial_address: Option<String>,
    /// Receives the durable address of every successful upload
    pub on_uploaded: UploadedCallback,
    /// Receives validation and transfer errors
    pub on_error: Option<ErrorCallback>,
    /// Accepted types, in `accept` attribute syntax
    pub accept: Option<AcceptFilter>,
    /// Size limit in MB (1 MB = 1024 * 1024 bytes)
    pub max_size_mb: Option<u64>,
}

impl UploaderOptions {
    pub fn new<D, U>(destination: D, on_uploaded: U) -> Self
    where
        D: Fn(&FileInfo) -> String + Send + Sync + 'static,
        U: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            destination: Arc::new(destination),
            initial_address: None,
            on_uploaded: Arc::new(on_uploaded),
            on_error: None,
            accept: None,
            max_size_mb: None,
        }
    }

    pub fn with_initial_address(mut self, address: impl Into<String>) -> Self {
        self.initial_address = Some(address.into());
        self
    }

    pub fn with_on_error<E>(mut self, on_error: E) -> Self
    where
        E: Fn(&UploadError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    pub fn with_accept(mut self, filter: &str) -> Self {
        self.accept = Some(AcceptFilter::parse(filter));
        self
    }

    pub fn with_max_size_mb(mut self, max_size_mb: u64) -> Self {
        self.max_size_mb = Some(max_size_mb);
        self
    }
}

impl fmt::Debug for UploaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploaderOptions")
            .field("initial_address", &self.initial_address)
            .field("accept", &self.accept)
            .field("max_size_mb", &self.max_size_mb)
            .finish_non_exhaustive()
    }
}

/// Commands served by the uploader worker
pub(crate) enum ManagerCommand {
    Start {
        file: SourceFile,
        reply: oneshot::Sender<Result<UploadOutcome>>,
    },
    Pause {
        reply: oneshot::Sender<Result<()>>,
    },
    Resume {
        reply: oneshot::Sender<Result<()>>,
    },
    Cancel {
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}
