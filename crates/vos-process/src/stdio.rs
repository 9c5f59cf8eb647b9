//! Process stdio streams.
//!
//! Output streams are single-consumer: [`crate::Process::take_stdout`] hands
//! the port out once. Dropping or cancelling a [`ProcessOutput`] releases
//! its port, after which the program's writes to it are discarded.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};

use futures::{Stream, StreamExt};
use vos_ipc::{PortReceiver, PortSender, StreamMessage};

use crate::error::{ProcessError, ProcessResult};

// =============================================================================
// Output
// =============================================================================

/// Inbound byte stream (stdout or stderr).
#[derive(Debug)]
pub struct ProcessOutput {
    port: Option<PortReceiver>,
}

impl ProcessOutput {
    pub(crate) fn new(port: PortReceiver) -> Self {
        Self { port: Some(port) }
    }

    /// Next chunk, or `None` once the stream is closed.
    pub async fn read_chunk(&mut self) -> Option<Vec<u8>> {
        self.next().await
    }

    /// Collect every remaining chunk.
    pub async fn read_to_end(mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next().await {
            out.extend(chunk);
        }
        out
    }

    /// Collect every remaining chunk as (lossy) UTF-8.
    pub async fn read_to_string(self) -> String {
        let bytes = self.read_to_end().await;
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Stop reading and release the port.
    pub fn cancel(&mut self) {
        if let Some(mut port) = self.port.take() {
            port.close();
        }
    }

    /// True once the stream ended or was cancelled.
    pub fn is_closed(&self) -> bool {
        self.port.is_none()
    }
}

impl Stream for ProcessOutput {
    type Item = Vec<u8>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(port) = self.port.as_mut() else {
            return Poll::Ready(None);
        };
        match ready!(port.poll_recv(cx)) {
            Some(StreamMessage::Data(bytes)) => Poll::Ready(Some(bytes)),
            Some(StreamMessage::Close) | None => {
                self.cancel();
                Poll::Ready(None)
            }
        }
    }
}

// =============================================================================
// Input
// =============================================================================

/// Outbound byte stream (stdin). Clones share the same stream.
#[derive(Clone, Debug)]
pub struct ProcessInput {
    port: Arc<Mutex<Option<PortSender>>>,
}

impl ProcessInput {
    pub(crate) fn new(port: PortSender) -> Self {
        Self {
            port: Arc::new(Mutex::new(Some(port))),
        }
    }

    /// Forward a chunk. Waits while the stdin queue is full.
    pub async fn write(&self, bytes: impl Into<Vec<u8>>) -> ProcessResult<()> {
        let port = self.sender().ok_or(ProcessError::StreamClosed)?;
        port.data(bytes)
            .await
            .map_err(|_| ProcessError::StreamClosed)
    }

    /// Send `close` and release the port. Closing twice is a no-op.
    pub async fn close(&self) -> ProcessResult<()> {
        let port = self.lock().take();
        if let Some(port) = port {
            // The program may already be gone; either way the stream is done
            let _ = port.close().await;
        }
        Ok(())
    }

    /// True once closed locally or by the program.
    pub fn is_closed(&self) -> bool {
        self.lock().as_ref().map_or(true, |port| port.is_closed())
    }

    fn sender(&self) -> Option<PortSender> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PortSender>> {
        self.port.lock().unwrap_or_else(|e| e.into_inner())
    }
}
