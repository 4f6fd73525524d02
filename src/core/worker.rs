use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::debug;
use super::errors::{Result, UploadError};
use super::session::TransferSession;
use super::traits::{
    BackendNotice,
    StorageBackend,
    TransferEvent,
    TransferEvents,
    TransferHandle,
    TransferRequest,
};
use super::types::{ManagerCommand, SessionId, SourceFile, UploadOutcome, UploadState, UploaderOptions};
use super::view::UploadView;

/// Result of a backend `open_transfer` running outside the worker loop.
struct OpenedTransfer {
    session: SessionId,
    destination: String,
    result: Result<Box<dyn TransferHandle>>,
}

/// Owns the live session. Commands and backend callbacks are applied one at
/// a time, so the session is never touched concurrently.
pub(crate) struct UploaderWorker {
    backend: Arc<dyn StorageBackend>,
    options: UploaderOptions,
    session: TransferSession,
    /// Reply of the `start` call waiting for Done/Error/cancel
    pending: Option<oneshot::Sender<Result<UploadOutcome>>>,
    /// When the live transfer was opened; sample timestamps count from here
    origin: Instant,
    /// Session whose backend transfer is still being opened
    opening: Option<SessionId>,
    /// Events the backend sent before its open call returned
    backlog: Vec<BackendNotice>,
    event_tx: mpsc::UnboundedSender<BackendNotice>,
    opened_tx: mpsc::UnboundedSender<OpenedTransfer>,
    view_tx: watch::Sender<UploadView>,
}

impl UploaderWorker {
    pub(crate) async fn run(
        backend: Arc<dyn StorageBackend>,
        options: UploaderOptions,
        mut command_rx: mpsc::Receiver<ManagerCommand>,
        view_tx: watch::Sender<UploadView>,
    ) {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (opened_tx, mut opened_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            backend,
            options,
            session: TransferSession::new(),
            pending: None,
            origin: Instant::now(),
            opening: None,
            backlog: Vec::new(),
            event_tx,
            opened_tx,
            view_tx,
        };

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => worker.handle_command(command),
                    None => break,
                },
                Some(notice) = event_rx.recv() => {
                    worker.handle_notice(notice);
                }
                Some(opened) = opened_rx.recv() => {
                    worker.handle_opened(opened);
                }
            }

            worker.publish();
        }

        debug!(session = %worker.session.id(), "Uploader worker stopped");
    }

    fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Start { file, reply } => {
                self.start(file, reply);
            }
            ManagerCommand::Pause { reply } => {
                let result = self.session.pause();
                self.log_transition("pause", &result);
                let _ = reply.send(result);
            }
            ManagerCommand::Resume { reply } => {
                let result = self.session.resume();
                self.log_transition("resume", &result);
                let _ = reply.send(result);
            }
            ManagerCommand::Cancel { reply } => {
                let _ = reply.send(self.cancel());
            }
            ManagerCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
        }
    }

    /// Validate and hand the file to the backend. The open call runs on its
    /// own task so `cancel` and `snapshot` are served while it is pending.
    fn start(&mut self, file: SourceFile, reply: oneshot::Sender<Result<UploadOutcome>>) {
        if self.session.state().is_active() || self.opening.is_some() {
            let _ = reply.send(Err(UploadError::invalid("start", self.session.state())));
            return;
        }

        // Every attempt gets a fresh session and id
        self.session = TransferSession::new();
        let id = self.session.id();

        if let Err(err) = self.session.begin(
            file.info(),
            self.options.max_size_mb,
            self.options.accept.as_ref(),
        ) {
            debug!(session = %id, error = %err, "Rejected file before upload");
            self.notify_error(&err);
            let _ = reply.send(Err(err));
            return;
        }

        let destination = (self.options.destination)(file.info());
        debug!(session = %id, file = %file.info().name, destination = %destination, "Opening transfer");

        let request = TransferRequest {
            session: id,
            destination: destination.clone(),
            file,
        };
        let events = TransferEvents::new(id, self.event_tx.clone());

        self.pending = Some(reply);
        self.opening = Some(id);

        let backend = self.backend.clone();
        let opened_tx = self.opened_tx.clone();
        tokio::spawn(async move {
            let result = backend.open_transfer(request, events).await;
            if let Err(unsent) = opened_tx.send(OpenedTransfer { session: id, destination, result }) {
                // Uploader is gone
                if let Ok(handle) = unsent.0.result {
                    handle.cancel();
                }
            }
        });
    }

    fn handle_opened(&mut self, opened: OpenedTransfer) {
        let id = opened.session;

        if self.opening != Some(id) {
            debug!(session = %id, live = %self.session.id(), "Cancelling transfer opened for a stale session");
            if let Ok(handle) = opened.result {
                handle.cancel();
            }
            return;
        }

        self.opening = None;
        let backlog = std::mem::take(&mut self.backlog);

        match opened.result {
            Ok(handle) => match self.session.attach(opened.destination, handle) {
                Ok(()) => {
                    self.origin = Instant::now();
                    debug!(session = %id, "Idle -> Uploading");
                    for notice in backlog {
                        self.handle_notice(notice);
                    }
                }
                Err(err) => {
                    if let Some(reply) = self.pending.take() {
                        let _ = reply.send(Err(err));
                    }
                }
            },
            Err(err) => {
                debug!(session = %id, error = %err, "Backend refused to open transfer");
                self.session.open_failed(err.clone());
                self.notify_error(&err);
                if let Some(reply) = self.pending.take() {
                    let _ = reply.send(Err(err));
                }
            }
        }
    }

    fn cancel(&mut self) -> Result<()> {
        let old_state = self.session.state();
        self.session.cancel()?;
        self.opening = None;
        self.backlog.clear();

        if let Some(reply) = self.pending.take() {
            let _ = reply.send(Ok(UploadOutcome::Cancelled));
        }

        // Callbacks still in flight for the old id are now stale
        self.session = TransferSession::new();
        debug!(session = %self.session.id(), "{:?} -> Idle (cancelled)", old_state);
        Ok(())
    }

    fn handle_notice(&mut self, notice: BackendNotice) {
        let id = notice.session;

        if self.opening == Some(id) {
            self.backlog.push(notice);
            return;
        }

        let applied = match notice.event {
            TransferEvent::Progress { bytes_transferred, .. } => {
                let timestamp_ms = self.origin.elapsed().as_millis() as u64;
                self.session.on_progress(id, bytes_transferred, timestamp_ms).is_some()
            }
            TransferEvent::Completed { address } => {
                let applied = self.session.on_completed(id, address);
                if applied {
                    self.finish();
                }
                applied
            }
            TransferEvent::Failed { message } => {
                let applied = self.session.on_failed(id, message);
                if applied {
                    self.finish();
                }
                applied
            }
        };

        if !applied {
            debug!(session = %id, live = %self.session.id(), "Dropped stale or regressing backend event");
        }
    }

    /// Resolve the waiting `start` and fire the caller's callbacks.
    fn finish(&mut self) {
        let outcome = match self.session.state() {
            UploadState::Done => {
                let address = self.session.download_address().unwrap_or_default().to_string();
                debug!(session = %self.session.id(), address = %address, "Upload done");
                (self.options.on_uploaded)(&address);
                Ok(UploadOutcome::Uploaded(address))
            }
            UploadState::Error => {
                let err = self
                    .session
                    .error()
                    .cloned()
                    .unwrap_or_else(|| UploadError::transfer("Upload failed"));
                debug!(session = %self.session.id(), error = %err, "Upload failed");
                self.notify_error(&err);
                Err(err)
            }
            _ => return,
        };

        if let Some(reply) = self.pending.take() {
            let _ = reply.send(outcome);
        }
    }

    fn notify_error(&self, err: &UploadError) {
        if let Some(on_error) = &self.options.on_error {
            on_error(err);
        }
    }

    fn publish(&self) {
        let view = UploadView::render(&self.session.snapshot(), self.options.initial_address.as_deref());
        self.view_tx.send_replace(view);
    }

    fn log_transition(&self, action: &str, result: &Result<()>) {
        match result {
            Ok(()) => debug!(session = %self.session.id(), "{} -> {:?}", action, self.session.state()),
            Err(err) => debug!(session = %self.session.id(), error = %err, "Rejected {}", action),
        }
    }
}
