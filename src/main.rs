use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode, ClearType};
use crossterm::{cursor, execute};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use media_uplink::config::Config;
use media_uplink::tus::{self, RequestHook, TusBackend, TusClient};
use media_uplink::{SourceFile, UploadOutcome, UploadView, Uploader, UploaderOptions};

const USAGE: &str = "Usage: media-uplink <file> [config.toml]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let file_path = args.next().context(USAGE)?;
    let config_path = args.next().unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    let file = SourceFile::open(&file_path)
        .await
        .with_context(|| format!("Failed to open file: {}", file_path))?;

    let handle = Uploader::new(Arc::new(create_backend(&config)), create_options(&config));
    let uploader = handle.uploader.clone();

    let stop = CancellationToken::new();
    let render_task = tokio::spawn(render_view(uploader.subscribe(), stop.clone()));
    let keyboard_task = tokio::spawn(handle_keyboard(uploader.clone(), stop.clone()));

    let result = uploader.start(file).await;

    stop.cancel();
    let _ = render_task.await;
    keyboard_task.await??;
    println!();

    let output = match &result {
        Ok(outcome) => serde_json::to_string(outcome)?,
        Err(err) => serde_json::json!({ "outcome": "error", "message": err.to_string() }).to_string(),
    };
    println!("{}", output);

    drop(uploader);
    handle.shutdown().await?;

    match result {
        Ok(UploadOutcome::Uploaded(_)) | Ok(UploadOutcome::Cancelled) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

struct TokenHook {
    token: HeaderValue,
}

impl RequestHook for TokenHook {
    fn before_request(&self, headers: &mut HeaderMap) -> tus::Result<()> {
        headers.insert(AUTHORIZATION, self.token.clone());
        Ok(())
    }
}

fn create_backend(config: &Config) -> TusBackend {
    let mut client = TusClient::new(&config.endpoint, config.chunk_size);

    if let Some(token) = &config.token {
        match HeaderValue::from_str(token) {
            Ok(token) => client = client.with_hook(TokenHook { token }),
            Err(err) => tracing::warn!(error = %err, "Ignoring invalid token"),
        }
    }

    TusBackend::new(client)
}

fn create_options(config: &Config) -> UploaderOptions {
    let prefix = config.path_prefix.clone();

    let mut options = UploaderOptions::new(
        move |info| format!("{}{}", prefix, info.name),
        |address| tracing::info!(address, "Upload stored"),
    )
    .with_on_error(|err| tracing::warn!(error = %err, "Upload failed"));

    if let Some(max_size_mb) = config.max_size_mb {
        options = options.with_max_size_mb(max_size_mb);
    }
    if let Some(accept) = &config.accept {
        options = options.with_accept(accept);
    }

    options
}

async fn render_view(mut view_rx: watch::Receiver<UploadView>, stop: CancellationToken) {
    loop {
        let view = view_rx.borrow_and_update().clone();
        let mut line = format!("[{:<9}] {:>3}% {}", view.status_label(), view.percent, view.transfer);
        if let Some(error) = &view.error {
            line = format!("{} {}", line, error);
        }

        let mut stdout = std::io::stdout();
        let _ = execute!(stdout, cursor::MoveToColumn(0), terminal::Clear(ClearType::CurrentLine));
        let _ = write!(stdout, "{}  (p)ause (r)esume (c)ancel (q)uit", line);
        let _ = stdout.flush();

        tokio::select! {
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = stop.cancelled() => break,
        }
    }
}

/// Leaves raw mode when dropped, whichever way the key loop exits.
struct RawModeGuard {
    restore: fn() -> std::io::Result<()>,
}

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self { restore: disable_raw_mode })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = (self.restore)() {
            tracing::warn!(error = %err, "Failed to restore terminal");
        }
    }
}

async fn handle_keyboard(uploader: Uploader, stop: CancellationToken) -> anyhow::Result<()> {
    let _raw_mode = match RawModeGuard::enable() {
        Ok(guard) => guard,
        Err(err) => {
            tracing::warn!(error = %err, "No terminal, keyboard controls disabled");
            return Ok(());
        }
    };

    while !stop.is_cancelled() {
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }

        if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
            if kind != KeyEventKind::Press {
                continue;
            }

            let result = match code {
                KeyCode::Char('p') => uploader.pause().await,
                KeyCode::Char('r') => uploader.resume().await,
                KeyCode::Char('c') | KeyCode::Char('q') => uploader.cancel().await,
                _ => Ok(()),
            };

            if let Err(err) = result {
                tracing::debug!(error = %err, "Ignored key");
            }
            if code == KeyCode::Char('q') {
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use super::*;

    static RESTORED: AtomicUsize = AtomicUsize::new(0);

    fn count_restore() -> std::io::Result<()> {
        RESTORED.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn failing_loop(_guard: RawModeGuard) -> std::io::Result<()> {
        Err(std::io::Error::other("terminal gone"))
    }

    #[test]
    fn test_raw_mode_restored_on_error_exit() {
        let result = failing_loop(RawModeGuard { restore: count_restore });

        assert!(result.is_err());
        assert_eq!(RESTORED.load(Ordering::SeqCst), 1);
    }
}
