use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;

use super::{ConnectionPool, PooledConnection};
use crate::{
    bson::Document,
    bson_util,
    error::{CommandError, Error, ErrorKind, Result},
    operation::{RawReply, ReplyFieldNames, Request},
    options::{ClientOptions, ServerAddress},
    sdam::ServerDescription,
    trace::{command::CommandTracingEventEmitter, connection::emit_checkout_failed_event},
};

/// Sends requests to individual servers over connections borrowed from a [`ConnectionPool`].
///
/// Each dispatch checks out one connection, performs exactly one request/reply exchange on it and
/// releases it. Dispatches are never retried.
#[derive(Debug)]
pub struct Dispatcher<P> {
    pool: Arc<P>,
    checkout_timeout: Duration,
    reply_fields: Arc<ReplyFieldNames>,
}

impl<P> Clone for Dispatcher<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            checkout_timeout: self.checkout_timeout,
            reply_fields: self.reply_fields.clone(),
        }
    }
}

impl<P: ConnectionPool> Dispatcher<P> {
    /// Creates a dispatcher that waits at most
    /// [`ClientOptions::connection_checkout_timeout`] for a connection and reads command replies
    /// through [`ClientOptions::reply_fields`].
    pub fn new(pool: Arc<P>, options: &ClientOptions) -> Self {
        Self {
            pool,
            checkout_timeout: options.connection_checkout_timeout(),
            reply_fields: Arc::new(options.reply_fields.clone()),
        }
    }

    /// The pool connections are borrowed from.
    pub fn pool(&self) -> &Arc<P> {
        &self.pool
    }

    /// Sends `request` to `server` and waits for the reply.
    ///
    /// A [`Request::Command`] reply reporting failure is returned as a
    /// [`Command`](ErrorKind::Command) error. Replies to [`Request::WriteBatch`] are returned as-is
    /// so that their errors can be reconciled.
    pub async fn dispatch(&self, server: &ServerDescription, request: &Request) -> Result<RawReply> {
        self.dispatch_with_cancellation(server, request, &CancellationToken::new())
            .await
    }

    /// Like [`Dispatcher::dispatch`], but gives up with a [`Cancelled`](ErrorKind::Cancelled) error
    /// as soon as `cancellation_token` is cancelled. A connection interrupted mid-exchange is
    /// closed rather than returned to the pool.
    pub async fn dispatch_with_cancellation(
        &self,
        server: &ServerDescription,
        request: &Request,
        cancellation_token: &CancellationToken,
    ) -> Result<RawReply> {
        let address = &server.address;
        tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => {
                Err(ErrorKind::Cancelled { address: address.clone() }.into())
            }
            result = self.execute(address, request) => result,
        }
    }

    async fn execute(&self, address: &ServerAddress, request: &Request) -> Result<RawReply> {
        let command = request.command();
        let document = command.to_document();
        let emitter =
            CommandTracingEventEmitter::new(address, command.target_db(), command.name());
        emitter.emit_started_event(&document);

        let start_time = Instant::now();
        let result = self.exchange(address, &document).await.and_then(|reply| {
            if request.validates_reply() {
                validate_reply(&reply, &self.reply_fields)?;
            }
            Ok(reply)
        });
        let duration = start_time.elapsed();

        match result {
            Ok(reply) => {
                emitter.emit_succeeded_event(&reply, duration);
                Ok(RawReply::new(address.clone(), reply))
            }
            Err(error) => {
                emitter.emit_failed_event(&error, duration);
                Err(Error::dispatch(address, error))
            }
        }
    }

    async fn exchange(&self, address: &ServerAddress, document: &Document) -> Result<Document> {
        let mut message = Vec::new();
        document.to_writer(&mut message)?;

        let mut connection = self.check_out(address).await?;
        let reply = connection.send_and_receive(message).await?;

        Ok(Document::from_reader(reply.as_slice())?)
    }

    async fn check_out(&self, address: &ServerAddress) -> Result<PooledConnection<P>> {
        let start_time = Instant::now();
        let result = tokio::time::timeout(self.checkout_timeout, self.pool.check_out(address))
            .await
            .unwrap_or_else(|_| {
                Err(ErrorKind::ConnectionCheckoutTimeout {
                    address: address.clone(),
                }
                .into())
            });

        match result {
            Ok(connection) => Ok(PooledConnection::new(
                connection,
                self.pool.clone(),
                address.clone(),
            )),
            Err(error) => {
                emit_checkout_failed_event(address, &error, start_time.elapsed());
                Err(error)
            }
        }
    }
}

fn validate_reply(reply: &Document, fields: &ReplyFieldNames) -> Result<()> {
    let ok = reply.get(&fields.ok).ok_or_else(|| {
        Error::invalid_response(format!("missing '{}' field in reply", fields.ok))
    })?;

    if bson_util::is_ok(ok) {
        Ok(())
    } else {
        Err(ErrorKind::Command(CommandError::from_reply(reply, fields)).into())
    }
}
