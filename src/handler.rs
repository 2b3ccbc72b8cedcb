//! Protocol handler contract.

use crate::session::Session;
use crate::shutdown::Shutdown;
use std::future::Future;
use std::sync::Arc;
use tokio::net::tcp::OwnedReadHalf;

/// Application logic run once per accepted connection.
///
/// The handler is the only reader of the connection. It should loop until
/// the peer closes, `shutdown` fires, or the session is closed, enqueueing
/// outbound messages with [`Session::put`]. Returning ends the server's
/// involvement with the connection: the session is deregistered and closed.
///
/// Shutdown is cooperative. A handler blocked on a read that ignores
/// `shutdown` keeps its task alive until the peer sends or disconnects.
pub trait Handler: Send + Sync + 'static {
    fn handle(
        &self,
        session: Arc<Session>,
        reader: OwnedReadHalf,
        shutdown: Shutdown,
    ) -> impl Future<Output = ()> + Send;
}
