use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use crate::core::TransferEvents;

pin_project! {
    /// Request body that reports the running offset for every chunk handed
    /// to the HTTP client.
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        events: TransferEvents,
        bytes_transferred: u64,
        total_bytes: u64,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, events: TransferEvents, initial_offset: u64, total_bytes: u64) -> Self {
        Self {
            inner,
            events,
            bytes_transferred: initial_offset,
            total_bytes,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    *this.bytes_transferred += chunk.len() as u64;
                    this.events.progress(*this.bytes_transferred, *this.total_bytes);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tokio::sync::mpsc;
    use crate::core::{SessionId, TransferEvent};
    use super::*;

    #[tokio::test]
    async fn test_reports_running_offset() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = SessionId::new();
        let events = TransferEvents::new(session, tx);

        let chunks: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"abcd")),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"ef")),
        ];
        let stream = ProgressStream::new(futures::stream::iter(chunks), events, 10, 16);
        let collected: Vec<_> = stream.collect().await;
        assert_eq!(collected.len(), 3);

        let mut offsets = Vec::new();
        while let Ok(notice) = rx.try_recv() {
            assert_eq!(notice.session, session);
            match notice.event {
                TransferEvent::Progress { bytes_transferred, total_bytes } => {
                    assert_eq!(total_bytes, 16);
                    offsets.push(bytes_transferred);
                }
                other => panic!("Unexpected event {:?}", other),
            }
        }
        assert_eq!(offsets, vec![14, 16]);
    }
}
