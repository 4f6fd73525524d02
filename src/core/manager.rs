use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use super::errors::{Result, UploadError};
use super::session::TransferSession;
use super::traits::StorageBackend;
use super::types::{ManagerCommand, SessionSnapshot, SourceFile, UploadOutcome, UploaderOptions};
use super::view::UploadView;
use super::worker::UploaderWorker;

/// Caller-side controls of one uploader. Cheap to clone: every clone talks
/// to the same worker, so `pause`/`cancel` can be issued while another
/// clone awaits `start`.
#[derive(Clone)]
pub struct Uploader {
    command_tx: mpsc::Sender<ManagerCommand>,
    view_rx: watch::Receiver<UploadView>,
}

/// Uploader plus the worker task driving it
pub struct UploaderHandle {
    pub uploader: Uploader,
    pub worker_handle: JoinHandle<()>,
}

impl UploaderHandle {
    /// Stops the worker once every other `Uploader` clone is dropped.
    /// A transfer still in flight is cancelled.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.uploader);
        self.worker_handle.await
            .map_err(|err| UploadError::transfer(format!("Worker panic: {}", err)))
    }
}

impl Uploader {
    pub fn new(backend: Arc<dyn StorageBackend>, options: UploaderOptions) -> UploaderHandle {
        let (command_tx, command_rx) = mpsc::channel(32);
        let initial = UploadView::render(
            &TransferSession::new().snapshot(),
            options.initial_address.as_deref(),
        );
        let (view_tx, view_rx) = watch::channel(initial);

        let worker_handle = tokio::spawn(UploaderWorker::run(
            backend,
            options,
            command_rx,
            view_tx,
        ));

        UploaderHandle {
            uploader: Self { command_tx, view_rx },
            worker_handle,
        }
    }

    /// Validate and upload `file`. Resolves once the transfer is done,
    /// failed or cancelled.
    pub async fn start(&self, file: SourceFile) -> Result<UploadOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.send(ManagerCommand::Start { file, reply: reply_tx }).await?;

        reply_rx
            .await
            .map_err(|_| UploadError::ManagerShutdown)?
    }

    pub async fn pause(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.send(ManagerCommand::Pause { reply: reply_tx }).await?;

        reply_rx
            .await
            .map_err(|_| UploadError::ManagerShutdown)?
    }

    pub async fn resume(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.send(ManagerCommand::Resume { reply: reply_tx }).await?;

        reply_rx
            .await
            .map_err(|_| UploadError::ManagerShutdown)?
    }

    /// Local state is reset before this returns; the backend abort is not
    /// awaited.
    pub async fn cancel(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.send(ManagerCommand::Cancel { reply: reply_tx }).await?;

        reply_rx
            .await
            .map_err(|_| UploadError::ManagerShutdown)?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.send(ManagerCommand::Snapshot { reply: reply_tx }).await?;

        reply_rx
            .await
            .map_err(|_| UploadError::ManagerShutdown)
    }

    /// Latest published view
    pub fn view(&self) -> UploadView {
        self.view_rx.borrow().clone()
    }

    /// Watch the view; a new value is published after every command or
    /// backend event.
    pub fn subscribe(&self) -> watch::Receiver<UploadView> {
        self.view_rx.clone()
    }

    async fn send(&self, command: ManagerCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| UploadError::ManagerShutdown)
    }
}
