//! Echo protocol implementation.
//!
//! A line-oriented demo service on top of the framed outbound path:
//! - On connect the server sends frame `seq=0`, payload `welcome`
//! - Each `\n`-terminated line the client sends is answered with the next
//!   sequence number and payload `you said: <line>`
//!
//! ## Protocol Format
//!
//! Inbound is raw text. Outbound uses the standard frame header:
//!
//! ```text
//! Client:  hello\n
//! Server:  [00 00 00 01][00 00 00 10]you said: hello\n
//! ```
//!
//! The connection ends when the client disconnects, the server shuts down,
//! or the session's outbound path fails.

pub mod handler;

pub use handler::EchoHandler;
