use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::utils::{format_bytes, format_duration, format_speed};
use super::types::{SessionSnapshot, UploadState};

/// UI-facing signals of the uploader.
///
/// Holds nothing of its own: [`UploadView::render`] rebuilds it from any
/// session snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UploadView {
    pub status: UploadState,
    /// Progress bar fill, 0.0..=1.0
    pub progress: f64,
    pub percent: u8,
    /// Throughput / ETA line, empty when there is nothing to say
    pub transfer: String,
    pub can_start: bool,
    pub can_pause: bool,
    pub can_resume: bool,
    pub can_cancel: bool,
    /// Latest durable address, or the initial one until a new upload lands
    pub address: Option<String>,
    pub error: Option<String>,
}

impl UploadView {
    pub fn render(snapshot: &SessionSnapshot, initial_address: Option<&str>) -> Self {
        let state = snapshot.state;
        let percent = snapshot.metrics.percent_complete;

        Self {
            status: state,
            progress: f64::from(percent) / 100.0,
            percent,
            transfer: describe_transfer(snapshot),
            can_start: !state.is_active(),
            can_pause: state == UploadState::Uploading,
            can_resume: state == UploadState::Paused,
            can_cancel: state.is_active(),
            address: snapshot
                .download_address
                .clone()
                .or_else(|| initial_address.map(str::to_string)),
            error: match state {
                UploadState::Error => snapshot.error.clone(),
                _ => None,
            },
        }
    }

    pub fn status_label(&self) -> &'static str {
        self.status.label()
    }
}

fn describe_transfer(snapshot: &SessionSnapshot) -> String {
    let metrics = &snapshot.metrics;

    match snapshot.state {
        UploadState::Uploading | UploadState::Paused => {
            let mut parts = vec![format!(
                "{} of {}",
                format_bytes(snapshot.bytes_transferred),
                format_bytes(snapshot.total_bytes)
            )];

            if snapshot.state == UploadState::Paused {
                parts.push("paused".to_string());
            } else if metrics.throughput > 0.0 {
                parts.push(format_speed(metrics.throughput));
            }

            parts.push(match metrics.eta_seconds {
                Some(secs) => format!("{} left", format_duration(Duration::from_secs(secs))),
                None => "time left unknown".to_string(),
            });

            parts.join(", ")
        }
        UploadState::Done => format!("Uploaded {}", format_bytes(snapshot.total_bytes)),
        UploadState::Idle | UploadState::Error => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use crate::core::types::DerivedMetrics;
    use super::*;

    fn snapshot(state: UploadState) -> SessionSnapshot {
        SessionSnapshot {
            state,
            bytes_transferred: 4 * 1024 * 1024,
            total_bytes: 10 * 1024 * 1024,
            metrics: DerivedMetrics {
                percent_complete: 40,
                throughput: 1024.0 * 1024.0,
                eta_seconds: Some(6),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_controls_follow_state() {
        let idle = UploadView::render(&SessionSnapshot::default(), None);
        assert!(idle.can_start && !idle.can_pause && !idle.can_resume && !idle.can_cancel);

        let uploading = UploadView::render(&snapshot(UploadState::Uploading), None);
        assert!(!uploading.can_start && uploading.can_pause && !uploading.can_resume && uploading.can_cancel);

        let paused = UploadView::render(&snapshot(UploadState::Paused), None);
        assert!(!paused.can_start && !paused.can_pause && paused.can_resume && paused.can_cancel);

        for state in [UploadState::Done, UploadState::Error] {
            let view = UploadView::render(&snapshot(state), None);
            assert!(view.can_start && !view.can_pause && !view.can_resume && !view.can_cancel);
        }
    }

    #[test]
    fn test_uploading_text() {
        let view = UploadView::render(&snapshot(UploadState::Uploading), None);

        assert_eq!(view.status_label(), "uploading");
        assert_eq!(view.percent, 40);
        assert_eq!(view.progress, 0.4);
        assert_eq!(view.transfer, "4.00 MB of 10.00 MB, 1.00 MB/s, 6s left");
    }

    #[test]
    fn test_paused_text_keeps_eta() {
        let view = UploadView::render(&snapshot(UploadState::Paused), None);
        assert_eq!(view.transfer, "4.00 MB of 10.00 MB, paused, 6s left");
    }

    #[test]
    fn test_unknown_eta() {
        let mut snap = snapshot(UploadState::Uploading);
        snap.metrics = DerivedMetrics { percent_complete: 0, throughput: 0.0, eta_seconds: None };

        let view = UploadView::render(&snap, None);
        assert_eq!(view.transfer, "4.00 MB of 10.00 MB, time left unknown");
    }

    #[test]
    fn test_terminal_results() {
        let mut done = snapshot(UploadState::Done);
        done.download_address = Some("https://cdn.example/v/1".to_string());
        let view = UploadView::render(&done, Some("https://cdn.example/old"));
        assert_eq!(view.address.as_deref(), Some("https://cdn.example/v/1"));
        assert_eq!(view.error, None);

        let mut failed = snapshot(UploadState::Error);
        failed.error = Some("Transfer error: quota exceeded".to_string());
        let view = UploadView::render(&failed, Some("https://cdn.example/old"));
        assert_eq!(view.error.as_deref(), Some("Transfer error: quota exceeded"));
        assert_eq!(view.address.as_deref(), Some("https://cdn.example/old"));
        assert!(view.transfer.is_empty());
    }

    #[test]
    fn test_render_is_repeatable() {
        let snap = snapshot(UploadState::Paused);
        assert_eq!(UploadView::render(&snap, None), UploadView::render(&snap, None));
    }
}
