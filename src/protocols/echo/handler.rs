//! Echo protocol handler.

use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, trace};

use crate::handler::Handler;
use crate::message::Message;
use crate::session::Session;
use crate::shutdown::Shutdown;

/// Payload of the frame sent when a client connects.
pub const GREETING: &str = "welcome";

const REPLY_PREFIX: &[u8] = b"you said: ";

const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Greets each client and answers every line it sends.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

impl EchoHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Handler for EchoHandler {
    async fn handle(&self, session: Arc<Session>, reader: OwnedReadHalf, shutdown: Shutdown) {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::with_capacity(128);
        let mut sequence: u32 = 0;

        if session.put(Message::new(sequence, GREETING)).await.is_err() {
            return;
        }

        loop {
            let mut limited = (&mut reader).take(MAX_LINE_LENGTH as u64 + 1);
            let read = tokio::select! {
                _ = shutdown.fired() => break,
                _ = session.closed() => break,
                read = limited.read_until(b'\n', &mut line) => read,
            };

            match read {
                Ok(0) => {
                    // EOF
                    break;
                }
                Ok(_) if line.len() > MAX_LINE_LENGTH => {
                    debug!(session = session.id(), len = line.len(), "Line too long, closing");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(session = session.id(), error = %e, "Read failed");
                    break;
                }
            }

            trace!(session = session.id(), len = line.len(), "Line received");

            let mut reply = BytesMut::with_capacity(REPLY_PREFIX.len() + line.len());
            reply.extend_from_slice(REPLY_PREFIX);
            reply.extend_from_slice(&line);
            line.clear();

            sequence = sequence.wrapping_add(1);
            if session.put(Message::new(sequence, reply.freeze())).await.is_err() {
                break;
            }
        }
    }
}
