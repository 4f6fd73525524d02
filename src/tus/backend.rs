use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncSeekExt;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use crate::core::{
    FileBody,
    SourceFile,
    StorageBackend,
    TransferEvents,
    TransferHandle,
    TransferRequest,
};
use super::client::TusClient;
use super::errors::{Result, TusError};
use super::metadata::Metadata;
use super::progress_stream::ProgressStream;

/// Object storage reached through a tus server. The durable address of a
/// finished upload is its upload URL.
#[derive(Clone)]
pub struct TusBackend {
    client: TusClient,
}

impl TusBackend {
    pub fn new(client: TusClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StorageBackend for TusBackend {
    async fn open_transfer(
        &self,
        request: TransferRequest,
        events: TransferEvents,
    ) -> crate::core::Result<Box<dyn TransferHandle>> {
        let metadata = Metadata::for_request(&request);
        let upload_url = self.client.create_upload(request.file.size(), &metadata).await?;
        info!(session = %request.session, upload_url = %upload_url, "Created upload");

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(self.client.clone(), upload_url, request.file, events, control_rx));

        Ok(Box::new(TusTransferHandle { control_tx }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Pause,
    Resume,
    Cancel,
}

struct TusTransferHandle {
    control_tx: mpsc::UnboundedSender<Control>,
}

impl TransferHandle for TusTransferHandle {
    fn pause(&self) {
        let _ = self.control_tx.send(Control::Pause);
    }

    fn resume(&self) {
        let _ = self.control_tx.send(Control::Resume);
    }

    fn cancel(&self) {
        let _ = self.control_tx.send(Control::Cancel);
    }
}

/// Dropping the handle is treated like cancel.
async fn drive(
    client: TusClient,
    upload_url: String,
    file: SourceFile,
    events: TransferEvents,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
) {
    let total = file.size();
    let mut offset = 0;

    loop {
        if offset >= total {
            events.progress(total, total);
            events.completed(upload_url);
            return;
        }

        let cancelled = {
            let upload = append_from(&client, &upload_url, &file, offset, &events);
            tokio::pin!(upload);

            loop {
                tokio::select! {
                    result = &mut upload => {
                        match result {
                            Ok(_) => events.completed(upload_url.as_str()),
                            Err(err) => {
                                warn!(upload_url = %upload_url, error = %err, "Upload failed");
                                events.failed(err.to_string());
                            }
                        }
                        return;
                    }
                    control = control_rx.recv() => match control {
                        Some(Control::Pause) => break false,
                        Some(Control::Resume) => continue,
                        Some(Control::Cancel) | None => break true,
                    }
                }
            }
        };

        // The in-flight PATCH is dropped here; the server keeps what it got.
        if !cancelled {
            debug!(upload_url = %upload_url, "Paused");
            let resumed = loop {
                match control_rx.recv().await {
                    Some(Control::Resume) => break true,
                    Some(Control::Pause) => continue,
                    Some(Control::Cancel) | None => break false,
                }
            };

            if resumed {
                match client.get_upload_offset(&upload_url).await {
                    Ok(acknowledged) => {
                        debug!(upload_url = %upload_url, offset = acknowledged, "Resuming");
                        offset = acknowledged;
                        continue;
                    }
                    Err(err) => {
                        events.failed(err.to_string());
                        return;
                    }
                }
            }
        }

        if let Err(err) = client.terminate(&upload_url).await {
            warn!(upload_url = %upload_url, error = %err, "Failed to terminate cancelled upload");
        }
        return;
    }
}

async fn append_from(
    client: &TusClient,
    upload_url: &str,
    file: &SourceFile,
    offset: u64,
    events: &TransferEvents,
) -> Result<u64> {
    let total = file.size();
    let body = open_body(file, offset, client.buffer_size).await?;
    let stream = ProgressStream::new(body, events.clone(), offset, total);

    let acknowledged = client
        .append(upload_url, offset, total - offset, reqwest::Body::wrap_stream(stream))
        .await?;

    if acknowledged != total {
        return Err(TusError::UploadIncomplete {
            expected: total,
            actual: acknowledged,
        });
    }

    Ok(acknowledged)
}

async fn open_body(
    file: &SourceFile,
    offset: u64,
    buffer_size: usize,
) -> Result<BoxStream<'static, std::io::Result<Bytes>>> {
    match file.body() {
        FileBody::Memory(data) => {
            let chunks = memory_chunks(data, offset, buffer_size);
            Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed())
        }
        FileBody::Disk(path) => {
            let mut handle = File::open(path).await?;
            handle.seek(std::io::SeekFrom::Start(offset)).await?;
            Ok(ReaderStream::with_capacity(handle, buffer_size).boxed())
        }
    }
}

/// Slices of `data` from `offset`, `chunk_size` bytes each, sharing the
/// original buffer.
fn memory_chunks(data: &Bytes, offset: u64, chunk_size: usize) -> Vec<Bytes> {
    let start = (offset as usize).min(data.len());
    let chunk_size = chunk_size.max(1);

    (start..data.len())
        .step_by(chunk_size)
        .map(|from| data.slice(from..(from + chunk_size).min(data.len())))
        .collect()
}
