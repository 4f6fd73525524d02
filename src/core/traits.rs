use async_trait::async_trait;
use tokio::sync::mpsc;
use super::errors::Result;
use super::types::{SessionId, SourceFile};

/// What the session asks the backend to upload.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub session: SessionId,
    /// Backend-specific key built by the caller's destination builder
    pub destination: String,
    pub file: SourceFile,
}

/// Object-storage backend offering resumable transfers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Open a resumable transfer and start feeding it the file.
    ///
    /// Progress and the terminal outcome are reported through `events`;
    /// the terminal event must be the last one sent.
    async fn open_transfer(
        &self,
        request: TransferRequest,
        events: TransferEvents,
    ) -> Result<Box<dyn TransferHandle>>;
}

/// Control side of one open backend transfer. All calls are fire-and-forget.
pub trait TransferHandle: Send + Sync {
    /// Suspend without discarding acknowledged bytes.
    fn pause(&self);

    /// Continue from the last acknowledged offset.
    fn resume(&self);

    /// Abort and discard the transfer.
    fn cancel(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    Progress {
        bytes_transferred: u64,
        total_bytes: u64,
    },
    Completed {
        address: String,
    },
    Failed {
        message: String,
    },
}

/// Event tagged with the session that opened the transfer.
#[derive(Debug, Clone)]
pub struct BackendNotice {
    pub session: SessionId,
    pub event: TransferEvent,
}

/// Sender handed to the backend, bound to one session.
#[derive(Debug, Clone)]
pub struct TransferEvents {
    session: SessionId,
    tx: mpsc::UnboundedSender<BackendNotice>,
}

impl TransferEvents {
    pub(crate) fn new(session: SessionId, tx: mpsc::UnboundedSender<BackendNotice>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn progress(&self, bytes_transferred: u64, total_bytes: u64) {
        self.send(TransferEvent::Progress { bytes_transferred, total_bytes });
    }

    pub fn completed(&self, address: impl Into<String>) {
        self.send(TransferEvent::Completed { address: address.into() });
    }

    pub fn failed(&self, message: impl Into<String>) {
        self.send(TransferEvent::Failed { message: message.into() });
    }

    /// The uploader may already be gone; nothing to do then.
    fn send(&self, event: TransferEvent) {
        let _ = self.tx.send(BackendNotice {
            session: self.session,
            event,
        });
    }
}
