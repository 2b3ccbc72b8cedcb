//! Protocol handler implementations.
//!
//! - `echo`: greets each client, then answers every line with a framed reply
//!   (used by the `tcp-zero` binary)

pub mod echo;
