use std::time::Duration;

use crate::{
    error::Error,
    options::ServerAddress,
    trace::{
        trace_or_log_enabled,
        TracingOrLogLevel,
        TracingRepresentation,
        CONNECTION_TRACING_EVENT_TARGET,
    },
};

/// The reason a checked-out connection was not returned to its pool.
#[derive(Clone, Copy, Debug)]
pub(crate) enum ConnectionClosedReason {
    /// The exchange on the connection failed, so its state is unknown.
    Error,

    /// The dispatch was cancelled before the exchange completed.
    Cancelled,
}

impl ConnectionClosedReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Error => "An error occurred while using the connection",
            Self::Cancelled => "The request was cancelled while using the connection",
        }
    }
}

pub(crate) fn emit_checkout_failed_event(address: &ServerAddress, reason: &Error, waited: Duration) {
    if trace_or_log_enabled!(
        target: CONNECTION_TRACING_EVENT_TARGET,
        TracingOrLogLevel::Debug
    ) {
        tracing::debug!(
            target: CONNECTION_TRACING_EVENT_TARGET,
            serverHost = address.host(),
            serverPort = address.port_tracing_representation(),
            reason = reason.tracing_representation(),
            durationMS = waited.as_millis(),
            "Connection checkout failed",
        );
    }
}

pub(crate) fn emit_connection_closed_event(address: &ServerAddress, reason: ConnectionClosedReason) {
    if trace_or_log_enabled!(
        target: CONNECTION_TRACING_EVENT_TARGET,
        TracingOrLogLevel::Debug
    ) {
        tracing::debug!(
            target: CONNECTION_TRACING_EVENT_TARGET,
            serverHost = address.host(),
            serverPort = address.port_tracing_representation(),
            reason = reason.as_str(),
            "Connection closed",
        );
    }
}
