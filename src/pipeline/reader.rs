use futures::io::{AsyncRead, AsyncReadExt};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, TailError};
use crate::pipeline::HandoffBuffer;
use crate::types::Chunk;

/// Largest block read from a log stream in one call.
pub const READ_CHUNK_SIZE: usize = 16 * 1024;

/// How a reader finished when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// The remote side closed the stream or it reached its end.
    Closed,
    /// The done-signal fired.
    Cancelled,
}

/// Pulls raw blocks from one source's log stream into the hand-off buffer.
pub struct SourceReader<R> {
    source: Arc<str>,
    stream: R,
    buffer: HandoffBuffer,
    cancel: CancellationToken,
}

impl<R> SourceReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(
        source: impl Into<Arc<str>>,
        stream: R,
        buffer: HandoffBuffer,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source: source.into(),
            stream,
            buffer,
            cancel,
        }
    }

    pub async fn run(mut self) -> Result<ReaderExit> {
        info!("{} Starting Stream", self.source);
        let mut block = vec![0u8; READ_CHUNK_SIZE];

        let exit = loop {
            if self.cancel.is_cancelled() {
                break ReaderExit::Cancelled;
            }
            let read = tokio::select! {
                _ = self.cancel.cancelled() => break ReaderExit::Cancelled,
                read = self.stream.read(&mut block) => read,
            };
            match read {
                Ok(0) => {
                    info!("{} stream ended", self.source);
                    break ReaderExit::Closed;
                }
                Ok(n) => {
                    debug!("{} read {} bytes", self.source, n);
                    self.buffer
                        .insert(Chunk::new(self.source.clone(), block[..n].to_vec()));
                }
                Err(e) if is_remote_close(e.kind()) => {
                    info!("{} stream closed: {}", self.source, e);
                    break ReaderExit::Closed;
                }
                Err(e) => {
                    return Err(TailError::StreamRead {
                        name: self.source.to_string(),
                        source: e,
                    });
                }
            }
        };

        info!("{} Stopped", self.source);
        Ok(exit)
    }
}

fn is_remote_close(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}
