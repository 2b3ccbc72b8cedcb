//! tcp-zero: a minimal generic TCP server framework
//!
//! The server accepts connections, tracks them in a registry, frames
//! outbound messages, and hands each connection to a caller-supplied
//! [`Handler`].
//!
//! Components:
//! - `message`: `[seq: u32][len: u32][payload]` big-endian framing
//! - `session`: per-connection outbound queue and sender loop
//! - `hub`: registry of live sessions
//! - `server`: listener, accept loop, shutdown
//! - `protocols`: bundled handlers (echo)
//!
//! ```no_run
//! use std::sync::Arc;
//! use tcp_zero::config::Config;
//! use tcp_zero::protocols::echo::EchoHandler;
//! use tcp_zero::Server;
//!
//! # async fn run() -> Result<(), tcp_zero::ServerError> {
//! let server = Arc::new(Server::new(Config::with_listen("127.0.0.1:9573"), EchoHandler::new()));
//! server.listen_and_serve().await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod hub;
pub mod message;
pub mod protocols;
pub mod server;
pub mod session;
pub mod shutdown;

pub use error::{ServerError, SessionError};
pub use handler::Handler;
pub use hub::Hub;
pub use message::{decode, decode_all, DecodeError, EncodeError, Message, MAX_PAYLOAD_LEN};
pub use server::{Accept, Server, ServerState};
pub use session::{Outbound, Session, SessionId};
pub use shutdown::Shutdown;
