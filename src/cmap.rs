//! The boundary with the connection pool and the dispatcher that borrows connections from it.
//!
//! Pooling, connection establishment and wire framing are provided by the embedding driver
//! through the [`ConnectionPool`] and [`Connection`] traits.

mod dispatcher;

use std::{future::Future, sync::Arc};

pub use self::dispatcher::Dispatcher;
use crate::{
    error::{Error, Result},
    options::ServerAddress,
    trace::connection::{emit_connection_closed_event, ConnectionClosedReason},
};

/// An established connection to a single server.
pub trait Connection: Send + 'static {
    /// Writes one encoded request message and reads the encoded reply to it.
    fn send_and_receive(
        &mut self,
        message: Vec<u8>,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// A pool of connections shared by every dispatch.
pub trait ConnectionPool: Send + Sync + 'static {
    /// The connections handed out by this pool.
    type Connection: Connection;

    /// Checks out a connection to the server at `address`, waiting for one to become available
    /// if necessary.
    fn check_out(
        &self,
        address: &ServerAddress,
    ) -> impl Future<Output = Result<Self::Connection>> + Send;

    /// Returns a connection whose last exchange completed, so that it can be reused.
    fn check_in(&self, connection: Self::Connection);

    /// Discards a connection whose state is unknown because an exchange on it failed or was
    /// interrupted. The default implementation drops it.
    fn close(&self, connection: Self::Connection) {
        drop(connection);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExchangeState {
    Ready,
    InFlight,
    Failed,
}

/// Wrapper around a checked-out connection that hands it back to its pool when dropped.
///
/// A connection is checked back in only if its last exchange completed. A connection dropped in
/// the middle of an exchange (because the dispatch was cancelled) or after a failed exchange is
/// closed instead.
pub(crate) struct PooledConnection<P: ConnectionPool> {
    connection: Option<P::Connection>,
    pool: Arc<P>,
    address: ServerAddress,
    state: ExchangeState,
}

impl<P: ConnectionPool> PooledConnection<P> {
    pub(crate) fn new(connection: P::Connection, pool: Arc<P>, address: ServerAddress) -> Self {
        Self {
            connection: Some(connection),
            pool,
            address,
            state: ExchangeState::Ready,
        }
    }

    pub(crate) async fn send_and_receive(&mut self, message: Vec<u8>) -> Result<Vec<u8>> {
        if self.state == ExchangeState::Failed {
            return Err(Error::internal(
                "cannot reuse a connection whose previous exchange failed",
            ));
        }
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| Error::internal("connection was already released"))?;

        self.state = ExchangeState::InFlight;
        let result = connection.send_and_receive(message).await;
        self.state = match result {
            Ok(_) => ExchangeState::Ready,
            Err(_) => ExchangeState::Failed,
        };
        result
    }
}

impl<P: ConnectionPool> Drop for PooledConnection<P> {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        match self.state {
            ExchangeState::Ready => self.pool.check_in(connection),
            ExchangeState::InFlight => {
                emit_connection_closed_event(&self.address, ConnectionClosedReason::Cancelled);
                self.pool.close(connection);
            }
            ExchangeState::Failed => {
                emit_connection_closed_event(&self.address, ConnectionClosedReason::Error);
                self.pool.close(connection);
            }
        }
    }
}
