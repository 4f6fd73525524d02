use chrono::{DateTime, Utc};
use super::errors::{Result, UploadError};
use super::progress::ProgressEstimator;
use super::traits::TransferHandle;
use super::types::{DerivedMetrics, FileInfo, ProgressSample, SessionId, SessionSnapshot, UploadState};
use super::validation::{validate, AcceptFilter};

/// One upload attempt and its state machine.
///
/// ```text
/// Idle -> Uploading <-> Paused -> Done
///         Uploading | Paused   -> Error
///         any state but Done   -> Idle (cancel)
/// ```
///
/// Backend callbacks are applied only when they carry this session's id and
/// arrive in a state that can take them; everything else is stale.
pub struct TransferSession {
    id: SessionId,
    state: UploadState,
    file: Option<FileInfo>,
    destination: Option<String>,
    bytes_transferred: u64,
    total_bytes: u64,
    estimator: ProgressEstimator,
    handle: Option<Box<dyn TransferHandle>>,
    download_address: Option<String>,
    error: Option<UploadError>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TransferSession {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            state: UploadState::Idle,
            file: None,
            destination: None,
            bytes_transferred: 0,
            total_bytes: 0,
            estimator: ProgressEstimator::default(),
            handle: None,
            download_address: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn metrics(&self) -> DerivedMetrics {
        self.estimator.metrics()
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn download_address(&self) -> Option<&str> {
        self.download_address.as_deref()
    }

    pub fn error(&self) -> Option<&UploadError> {
        self.error.as_ref()
    }

    /// Local half of `start`: check the file against the limits.
    ///
    /// A violation moves the session straight to `Error`. On success the
    /// session stays `Idle` until [`attach`](Self::attach) hands it the
    /// opened backend transfer.
    pub fn begin(
        &mut self,
        file: &FileInfo,
        max_size_mb: Option<u64>,
        accept: Option<&AcceptFilter>,
    ) -> Result<()> {
        if self.state != UploadState::Idle || self.file.is_some() {
            return Err(UploadError::invalid("start", self.state));
        }

        self.file = Some(file.clone());
        self.total_bytes = file.size;
        self.started_at = Some(Utc::now());

        if let Err(err) = validate(file, max_size_mb, accept) {
            let err = UploadError::from(err);
            self.enter_error(err.clone());
            return Err(err);
        }

        self.estimator = ProgressEstimator::new(file.size);
        Ok(())
    }

    /// The backend opened the transfer: start uploading.
    pub fn attach(&mut self, destination: String, handle: Box<dyn TransferHandle>) -> Result<()> {
        if self.state != UploadState::Idle || self.file.is_none() {
            handle.cancel();
            return Err(UploadError::invalid("attach a transfer", self.state));
        }

        self.destination = Some(destination);
        self.handle = Some(handle);
        self.state = UploadState::Uploading;
        Ok(())
    }

    /// Opening the transfer failed before any handle existed.
    pub fn open_failed(&mut self, err: UploadError) {
        if self.state == UploadState::Idle && self.file.is_some() {
            self.enter_error(err);
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state != UploadState::Uploading {
            return Err(UploadError::invalid("pause", self.state));
        }

        if let Some(handle) = &self.handle {
            handle.pause();
        }
        self.state = UploadState::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state != UploadState::Paused {
            return Err(UploadError::invalid("resume", self.state));
        }

        if let Some(handle) = &self.handle {
            handle.resume();
        }
        self.estimator.rebaseline();
        self.state = UploadState::Uploading;
        Ok(())
    }

    /// Reset to `Idle` right away; the backend abort is not awaited.
    pub fn cancel(&mut self) -> Result<()> {
        match self.state {
            UploadState::Done => Err(UploadError::invalid("cancel", self.state)),
            UploadState::Idle if self.file.is_none() => Ok(()),
            _ => {
                if let Some(handle) = self.handle.take() {
                    handle.cancel();
                }

                self.state = UploadState::Idle;
                self.file = None;
                self.destination = None;
                self.bytes_transferred = 0;
                self.total_bytes = 0;
                self.estimator.reset();
                self.error = None;
                self.started_at = None;
                self.finished_at = None;
                Ok(())
            }
        }
    }

    /// Apply a progress callback. Returns the new metrics, or `None` if
    /// the callback was stale or went backwards.
    ///
    /// A resumed transfer restarts from the server's acknowledged offset,
    /// which may lie below what was already reported; those samples are
    /// dropped until the transfer catches up.
    pub fn on_progress(&mut self, id: SessionId, bytes_transferred: u64, timestamp_ms: u64) -> Option<DerivedMetrics> {
        if id != self.id || self.state != UploadState::Uploading {
            return None;
        }
        if bytes_transferred < self.bytes_transferred {
            return None;
        }

        self.bytes_transferred = bytes_transferred;
        Some(self.estimator.observe(ProgressSample::new(timestamp_ms, bytes_transferred)))
    }

    /// Apply the success callback. A pause may still be in flight when the
    /// last bytes land, so `Paused` accepts it too.
    pub fn on_completed(&mut self, id: SessionId, address: String) -> bool {
        if id != self.id || !self.state.is_active() {
            return false;
        }

        if address.trim().is_empty() {
            self.enter_error(UploadError::transfer("Backend returned an empty download address"));
            return true;
        }

        self.handle = None;
        self.bytes_transferred = self.total_bytes;
        self.estimator.complete();
        self.download_address = Some(address);
        self.state = UploadState::Done;
        self.finished_at = Some(Utc::now());
        true
    }

    pub fn on_failed(&mut self, id: SessionId, message: String) -> bool {
        if id != self.id || !self.state.is_active() {
            return false;
        }

        self.enter_error(UploadError::Transfer(message));
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            state: self.state,
            file_name: self.file.as_ref().map(|file| file.name.clone()),
            destination: self.destination.clone(),
            bytes_transferred: self.bytes_transferred,
            total_bytes: self.total_bytes,
            metrics: self.estimator.metrics(),
            download_address: self.download_address.clone(),
            error: self.error.as_ref().map(|err| err.to_string()),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    /// The backend handle is invalid once it reported failure.
    fn enter_error(&mut self, err: UploadError) {
        self.handle = None;
        self.error = Some(err);
        self.state = UploadState::Error;
        self.finished_at = Some(Utc::now());
    }
}

impl Default for TransferSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TransferSession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use crate::core::errors::ValidationError;
    use super::*;

    #[derive(Clone, Default)]
    struct FakeHandle {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl FakeHandle {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TransferHandle for FakeHandle {
        fn pause(&self) {
            self.calls.lock().unwrap().push("pause");
        }

        fn resume(&self) {
            self.calls.lock().unwrap().push("resume");
        }

        fn cancel(&self) {
            self.calls.lock().unwrap().push("cancel");
        }
    }

    fn file(size: u64) -> FileInfo {
        FileInfo {
            name: "pilot.mp4".to_string(),
            content_type: "video/mp4".to_string(),
            size,
        }
    }

    fn uploading(size: u64) -> (TransferSession, FakeHandle) {
        let handle = FakeHandle::default();
        let mut session = TransferSession::new();
        session.begin(&file(size), None, None).unwrap();
        session.attach("movies/pilot.mp4".to_string(), Box::new(handle.clone())).unwrap();
        (session, handle)
    }

    #[test]
    fn test_start_moves_to_uploading() {
        let (session, handle) = uploading(1000);

        assert_eq!(session.state(), UploadState::Uploading);
        assert_eq!(session.total_bytes(), 1000);
        assert_eq!(session.snapshot().destination.as_deref(), Some("movies/pilot.mp4"));
        assert!(handle.calls().is_empty());
    }

    #[test]
    fn test_oversized_file_fails_validation() {
        let mut session = TransferSession::new();
        let err = session.begin(&file(3000 * 1024 * 1024), Some(2048), None).unwrap_err();

        assert!(matches!(err, UploadError::Validation(ValidationError::TooLarge { .. })));
        assert_eq!(session.state(), UploadState::Error);
        assert_eq!(session.error(), Some(&err));
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let (mut session, _) = uploading(1000);
        let err = session.begin(&file(10), None, None).unwrap_err();

        assert_eq!(err, UploadError::InvalidTransition { action: "start", state: UploadState::Uploading });
        assert_eq!(session.state(), UploadState::Uploading);
        assert_eq!(session.total_bytes(), 1000);
    }

    #[test]
    fn test_pause_resume_cycle() {
        let (mut session, handle) = uploading(1000);

        session.pause().unwrap();
        assert_eq!(session.state(), UploadState::Paused);
        assert!(session.pause().is_err());

        session.resume().unwrap();
        assert_eq!(session.state(), UploadState::Uploading);
        assert!(session.resume().is_err());

        assert_eq!(handle.calls(), vec!["pause", "resume"]);
    }

    #[test]
    fn test_controls_rejected_in_idle() {
        let mut session = TransferSession::new();

        assert!(session.pause().is_err());
        assert!(session.resume().is_err());
        assert!(session.cancel().is_ok());
        assert_eq!(session.state(), UploadState::Idle);
    }

    #[test]
    fn test_progress_updates_metrics() {
        let (mut session, _) = uploading(10_000_000);
        let id = session.id();

        session.on_progress(id, 0, 0).unwrap();
        let metrics = session.on_progress(id, 1_000_000, 1000).unwrap();

        assert_eq!(metrics.percent_complete, 10);
        assert_eq!(metrics.eta_seconds, Some(9));
        assert_eq!(session.bytes_transferred(), 1_000_000);
    }

    #[test]
    fn test_progress_ignored_while_paused() {
        let (mut session, _) = uploading(1000);
        let id = session.id();
        session.on_progress(id, 400, 100).unwrap();
        session.pause().unwrap();

        assert!(session.on_progress(id, 500, 200).is_none());
        assert_eq!(session.bytes_transferred(), 400);
        assert_eq!(session.metrics().percent_complete, 40);
    }

    #[test]
    fn test_progress_never_goes_backwards() {
        let (mut session, _) = uploading(10_000);
        let id = session.id();
        session.on_progress(id, 0, 0).unwrap();
        session.on_progress(id, 8_000, 1000).unwrap();

        session.pause().unwrap();
        session.resume().unwrap();

        // Restarted from a lower acknowledged offset
        assert!(session.on_progress(id, 6_000, 2000).is_none());
        assert_eq!(session.bytes_transferred(), 8_000);
        assert_eq!(session.metrics().percent_complete, 80);

        let metrics = session.on_progress(id, 9_000, 3000).unwrap();
        assert_eq!(session.bytes_transferred(), 9_000);
        assert_eq!(metrics.percent_complete, 90);
    }

    #[test]
    fn test_foreign_session_events_ignored() {
        let (mut session, _) = uploading(1000);
        let other = SessionId::new();

        assert!(session.on_progress(other, 500, 100).is_none());
        assert!(!session.on_completed(other, "https://cdn/x".to_string()));
        assert!(!session.on_failed(other, "boom".to_string()));
        assert_eq!(session.state(), UploadState::Uploading);
    }

    #[test]
    fn test_cancel_resets_and_ignores_late_callbacks() {
        let (mut session, handle) = uploading(1000);
        let id = session.id();
        session.on_progress(id, 0, 0).unwrap();
        session.on_progress(id, 400, 1000).unwrap();
        session.pause().unwrap();

        session.cancel().unwrap();
        assert_eq!(session.state(), UploadState::Idle);
        assert_eq!(session.metrics(), DerivedMetrics::default());
        assert_eq!(handle.calls(), vec!["pause", "cancel"]);

        assert!(session.on_progress(id, 600, 2000).is_none());
        assert!(!session.on_completed(id, "https://cdn/x".to_string()));
        assert_eq!(session.snapshot().bytes_transferred, 0);
    }

    #[test]
    fn test_completion() {
        let (mut session, _) = uploading(1000);
        let id = session.id();
        session.on_progress(id, 1000, 100).unwrap();

        assert!(session.on_completed(id, "https://cdn.example/v/1".to_string()));
        assert_eq!(session.state(), UploadState::Done);
        assert_eq!(session.download_address(), Some("https://cdn.example/v/1"));
        assert_eq!(session.metrics().percent_complete, 100);
        assert!(session.snapshot().finished_at.is_some());

        assert!(session.cancel().is_err());
        assert!(session.pause().is_err());
        assert_eq!(session.state(), UploadState::Done);
    }

    #[test]
    fn test_completion_while_pause_in_flight() {
        let (mut session, _) = uploading(1000);
        session.pause().unwrap();

        assert!(session.on_completed(session.id(), "https://cdn/x".to_string()));
        assert_eq!(session.state(), UploadState::Done);
    }

    #[test]
    fn test_empty_address_is_an_error() {
        let (mut session, _) = uploading(1000);
        session.on_completed(session.id(), " ".to_string());

        assert_eq!(session.state(), UploadState::Error);
    }

    #[test]
    fn test_failure_is_terminal() {
        let (mut session, handle) = uploading(1000);
        assert!(session.on_failed(session.id(), "quota exceeded".to_string()));

        assert_eq!(session.state(), UploadState::Error);
        assert_eq!(session.error(), Some(&UploadError::Transfer("quota exceeded".to_string())));
        assert!(session.resume().is_err());
        assert!(session.pause().is_err());

        // cancel clears the error without touching the dead handle
        session.cancel().unwrap();
        assert_eq!(session.state(), UploadState::Idle);
        assert!(handle.calls().is_empty());
    }

    #[test]
    fn test_drop_cancels_live_transfer() {
        let (session, handle) = uploading(1000);
        drop(session);

        assert_eq!(handle.calls(), vec!["cancel"]);
    }
}
