use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, TailError};
use crate::pipeline::HandoffBuffer;
use crate::types::Chunk;
use crate::utils::source_header;

/// Writes chunks to the output as they arrive.
pub struct Sink<W> {
    out: W,
    headers: bool,
    color: bool,
}

impl<W: AsyncWrite + Unpin> Sink<W> {
    pub fn new(out: W, headers: bool, color: bool) -> Self {
        Self {
            out,
            headers,
            color,
        }
    }

    pub async fn write_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        if self.headers {
            let header = format!("{}\n", source_header(&chunk.source, self.color));
            self.out
                .write_all(header.as_bytes())
                .await
                .map_err(TailError::Output)?;
        }
        self.out
            .write_all(&chunk.data)
            .await
            .map_err(TailError::Output)?;
        self.out.flush().await.map_err(TailError::Output)
    }

    /// Drain `input` until cancelled or until it is closed and empty. A write
    /// stuck on a stalled output is abandoned once `cancel` fires.
    pub async fn run(mut self, input: HandoffBuffer, cancel: CancellationToken) -> Result<()> {
        while let Some(chunk) = input.take(&cancel).await {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Sink cancelled during write");
                    break;
                }
                written = self.write_chunk(&chunk) => written?,
            }
        }
        if !input.is_empty() {
            debug!("Sink stopped with {} chunk(s) pending", input.len());
        } else {
            debug!("Sink stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;

    fn chunk(source: &str, data: &str) -> Chunk {
        Chunk::new(Arc::from(source), data.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_write_without_header() {
        let mut sink = Sink::new(Vec::new(), false, false);
        sink.write_chunk(&chunk("web-1", "a\nb\n")).await.unwrap();
        assert_eq!(sink.out, b"a\nb\n");
    }

    #[tokio::test]
    async fn test_write_with_plain_header() {
        let mut sink = Sink::new(Vec::new(), true, false);
        sink.write_chunk(&chunk("web-1", "a\n")).await.unwrap();
        sink.write_chunk(&chunk("web-2", "b\n")).await.unwrap();
        assert_eq!(
            String::from_utf8(sink.out).unwrap(),
            "[web-1]\na\n[web-2]\nb\n"
        );
    }

    #[tokio::test]
    async fn test_colored_header_wraps_name() {
        let mut sink = Sink::new(Vec::new(), true, true);
        sink.write_chunk(&chunk("web-1", "a\n")).await.unwrap();
        let out = String::from_utf8(sink.out).unwrap();
        assert!(out.contains("[web-1]"));
        assert!(out.ends_with("a\n"));
    }

    /// Fails every write.
    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
            _: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Never accepts a byte, like a pipe whose reader stopped reading.
    struct Stalled;

    impl AsyncWrite for Stalled {
        fn poll_write(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
            _: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Pending
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn test_run_reports_write_failure() {
        let input = HandoffBuffer::default();
        input.insert(chunk("web-1", "a\n"));
        let result = Sink::new(BrokenPipe, false, false)
            .run(input, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(TailError::Output(_))));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel_while_output_stalled() {
        let input = HandoffBuffer::default();
        input.insert(chunk("web-1", "a\n"));
        let cancel = CancellationToken::new();
        let sink = tokio::spawn(Sink::new(Stalled, false, false).run(input, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), sink)
            .await
            .expect("sink did not stop after cancellation")
            .unwrap();
        assert!(result.is_ok());
    }
}
