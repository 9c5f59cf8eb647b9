//! Transferable stream ports.
//!
//! A port is one end of a message channel carrying [`StreamMessage`]s. Ports
//! are created in pairs by the controller; the context-side ends travel with
//! the `spawn` request and the controller keeps the others.
//!
//! Output ports (stdout/stderr) are unbounded: the context posts chunks
//! without waiting. The stdin port is bounded so a writer cannot run more
//! than [`DEFAULT_STDIN_QUEUE`] messages ahead of the program reading it.

use std::task::{Context, Poll};

use tokio::sync::mpsc;

/// Default number of stdin messages that may be queued before writers wait.
pub const DEFAULT_STDIN_QUEUE: usize = 64;

/// A message on a stream port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    /// A chunk of bytes
    Data(Vec<u8>),
    /// End of stream
    Close,
}

/// The other end of the port is gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("port closed")]
pub struct PortClosed;

#[derive(Clone, Debug)]
enum SenderKind {
    Bounded(mpsc::Sender<StreamMessage>),
    Unbounded(mpsc::UnboundedSender<StreamMessage>),
}

/// Sending end of a port.
#[derive(Clone, Debug)]
pub struct PortSender {
    kind: SenderKind,
}

impl PortSender {
    /// Post a message, waiting for capacity on bounded ports.
    pub async fn send(&self, msg: StreamMessage) -> Result<(), PortClosed> {
        match &self.kind {
            SenderKind::Bounded(tx) => tx.send(msg).await.map_err(|_| PortClosed),
            SenderKind::Unbounded(tx) => tx.send(msg).map_err(|_| PortClosed),
        }
    }

    /// Post a message without waiting. Fails if the port is closed or full.
    pub fn try_send(&self, msg: StreamMessage) -> Result<(), PortClosed> {
        match &self.kind {
            SenderKind::Bounded(tx) => tx.try_send(msg).map_err(|_| PortClosed),
            SenderKind::Unbounded(tx) => tx.send(msg).map_err(|_| PortClosed),
        }
    }

    /// Post a data chunk.
    pub async fn data(&self, bytes: impl Into<Vec<u8>>) -> Result<(), PortClosed> {
        self.send(StreamMessage::Data(bytes.into())).await
    }

    /// Post the close marker.
    pub async fn close(&self) -> Result<(), PortClosed> {
        self.send(StreamMessage::Close).await
    }

    /// True once the receiving end has been dropped or closed.
    pub fn is_closed(&self) -> bool {
        match &self.kind {
            SenderKind::Bounded(tx) => tx.is_closed(),
            SenderKind::Unbounded(tx) => tx.is_closed(),
        }
    }
}

#[derive(Debug)]
enum ReceiverKind {
    Bounded(mpsc::Receiver<StreamMessage>),
    Unbounded(mpsc::UnboundedReceiver<StreamMessage>),
}

/// Receiving end of a port.
#[derive(Debug)]
pub struct PortReceiver {
    kind: ReceiverKind,
}

impl PortReceiver {
    /// Receive the next message. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<StreamMessage> {
        match &mut self.kind {
            ReceiverKind::Bounded(rx) => rx.recv().await,
            ReceiverKind::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Poll for the next message. Used by `Stream` adapters.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<StreamMessage>> {
        match &mut self.kind {
            ReceiverKind::Bounded(rx) => rx.poll_recv(cx),
            ReceiverKind::Unbounded(rx) => rx.poll_recv(cx),
        }
    }

    /// Stop accepting messages; pending senders observe [`PortClosed`].
    pub fn close(&mut self) {
        match &mut self.kind {
            ReceiverKind::Bounded(rx) => rx.close(),
            ReceiverKind::Unbounded(rx) => rx.close(),
        }
    }
}

/// Create a bounded port pair.
pub fn bounded_port(capacity: usize) -> (PortSender, PortReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        PortSender {
            kind: SenderKind::Bounded(tx),
        },
        PortReceiver {
            kind: ReceiverKind::Bounded(rx),
        },
    )
}

/// Create an unbounded port pair.
pub fn unbounded_port() -> (PortSender, PortReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        PortSender {
            kind: SenderKind::Unbounded(tx),
        },
        PortReceiver {
            kind: ReceiverKind::Unbounded(rx),
        },
    )
}

/// Controller-side stdio ends.
#[derive(Debug)]
pub struct ControllerPorts {
    /// Writes to the program's stdin
    pub stdin: PortSender,
    /// Reads the program's stdout
    pub stdout: PortReceiver,
    /// Reads the program's stderr
    pub stderr: PortReceiver,
}

/// Context-side stdio ends, transferred with `spawn`.
#[derive(Debug)]
pub struct ContextPorts {
    /// Program reads stdin here
    pub stdin: PortReceiver,
    /// Program writes stdout here
    pub stdout: PortSender,
    /// Program writes stderr here
    pub stderr: PortSender,
}

/// Create the three stdio channels for one process.
pub fn stdio_channel(stdin_capacity: usize) -> (ControllerPorts, ContextPorts) {
    let (stdin_tx, stdin_rx) = bounded_port(stdin_capacity);
    let (stdout_tx, stdout_rx) = unbounded_port();
    let (stderr_tx, stderr_rx) = unbounded_port();
    (
        ControllerPorts {
            stdin: stdin_tx,
            stdout: stdout_rx,
            stderr: stderr_rx,
        },
        ContextPorts {
            stdin: stdin_rx,
            stdout: stdout_tx,
            stderr: stderr_tx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (tx, mut rx) = unbounded_port();
        tx.data(b"a".to_vec()).await.unwrap();
        tx.data(b"b".to_vec()).await.unwrap();
        tx.close().await.unwrap();

        assert_eq!(rx.recv().await, Some(StreamMessage::Data(b"a".to_vec())));
        assert_eq!(rx.recv().await, Some(StreamMessage::Data(b"b".to_vec())));
        assert_eq!(rx.recv().await, Some(StreamMessage::Close));
    }

    #[tokio::test]
    async fn test_bounded_port_applies_backpressure() {
        let (tx, mut rx) = bounded_port(1);
        tx.try_send(StreamMessage::Data(vec![1])).unwrap();
        assert!(tx.try_send(StreamMessage::Data(vec![2])).is_err());

        assert_eq!(rx.recv().await, Some(StreamMessage::Data(vec![1])));
        tx.try_send(StreamMessage::Data(vec![3])).unwrap();
    }

    #[tokio::test]
    async fn test_closed_receiver_rejects_senders() {
        let (controller, mut context) = stdio_channel(4);
        context.stdin.close();
        assert_eq!(controller.stdin.data(b"x".to_vec()).await, Err(PortClosed));

        drop(controller.stdout);
        assert!(context.stdout.is_closed());
    }
}
