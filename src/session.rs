//! Per-connection session state and the outbound sender loop.
//!
//! A `Session` is the producer side: any task holding an `Arc<Session>` may
//! enqueue messages. The matching `Outbound` is the consumer side and is run
//! on its own task, owning the write half of the connection. Messages from a
//! single producer reach the wire in the order they were enqueued.

use crate::error::SessionError;
use crate::message::Message;
use crate::shutdown::Shutdown;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

/// Opaque session identity, unique for the lifetime of a server.
pub type SessionId = u64;

/// Producer handle for one connection.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer: Option<SocketAddr>,
    connected_at: DateTime<Utc>,
    queue: mpsc::Sender<Message>,
    closed: Shutdown,
}

impl Session {
    /// Create a session with an outbound queue of `capacity` messages.
    ///
    /// The returned `Outbound` must be run for queued messages to be written.
    /// A `capacity` of zero is treated as one.
    pub fn new(id: SessionId, peer: Option<SocketAddr>, capacity: usize) -> (Arc<Self>, Outbound) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closed = Shutdown::new();

        let session = Arc::new(Self {
            id,
            peer,
            connected_at: Utc::now(),
            queue: tx,
            closed: closed.clone(),
        });

        let outbound = Outbound {
            id,
            queue: rx,
            closed,
        };

        (session, outbound)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Enqueue a message, waiting for room if the queue is full.
    pub async fn put(&self, message: Message) -> Result<(), SessionError> {
        if self.closed.is_fired() {
            return Err(SessionError::Closed);
        }

        self.queue
            .send(message)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Enqueue without waiting.
    pub fn try_put(&self, message: Message) -> Result<(), SessionError> {
        if self.closed.is_fired() {
            return Err(SessionError::Closed);
        }

        self.queue.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::QueueFull,
            TrySendError::Closed(_) => SessionError::Closed,
        })
    }

    /// Tear the session down. Messages already queued are still flushed.
    ///
    /// Returns `true` if this call closed the session.
    pub fn close(&self) -> bool {
        self.closed.fire()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_fired()
    }

    /// Wait until the session is torn down.
    pub async fn closed(&self) {
        self.closed.fired().await
    }
}

/// Consumer side of a session's outbound queue.
#[derive(Debug)]
pub struct Outbound {
    id: SessionId,
    queue: mpsc::Receiver<Message>,
    closed: Shutdown,
}

impl Outbound {
    /// Drain the queue onto `writer` until the session closes or `shutdown`
    /// fires.
    ///
    /// On close or shutdown, messages still queued are flushed in order and
    /// the writer is shut down. The first write or encode error closes the
    /// session and is returned.
    pub async fn run<W>(mut self, mut writer: W, shutdown: Shutdown) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = BytesMut::new();

        let mut result = loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.fired() => break Ok(()),
                _ = self.closed.fired() => break Ok(()),
                message = self.queue.recv() => match message {
                    Some(message) => message,
                    // Every producer handle is gone
                    None => break Ok(()),
                },
            };

            if let Err(e) = write_message(&mut writer, &mut buf, &message).await {
                break Err(e);
            }
            trace!(
                session = self.id,
                sequence = message.sequence(),
                len = message.len(),
                "Frame written"
            );
        };

        if result.is_ok() {
            result = self.flush(&mut writer, &mut buf).await;
        }

        if let Err(ref e) = result {
            warn!(session = self.id, error = %e, "Sender failed, closing session");
        }

        self.closed.fire();
        if let Err(e) = writer.shutdown().await {
            debug!(session = self.id, error = %e, "Connection shutdown failed");
        }

        result
    }

    /// Write out whatever is still queued, refusing new messages.
    async fn flush<W>(&mut self, writer: &mut W, buf: &mut BytesMut) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin,
    {
        self.queue.close();

        let mut flushed = 0usize;
        while let Ok(message) = self.queue.try_recv() {
            write_message(writer, buf, &message).await?;
            flushed += 1;
        }

        if flushed > 0 {
            debug!(session = self.id, flushed, "Flushed queued messages");
        }
        Ok(())
    }
}

async fn write_message<W>(
    writer: &mut W,
    buf: &mut BytesMut,
    message: &Message,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    buf.clear();
    message.encode_into(buf)?;
    writer.write_all(&buf[..]).await?;
    writer.flush().await?;
    Ok(())
}
