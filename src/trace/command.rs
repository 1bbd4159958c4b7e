use std::time::Duration;

use crate::{
    bson::Document,
    error::Error,
    options::ServerAddress,
    trace::{
        serialize_command_or_reply,
        trace_or_log_enabled,
        TracingOrLogLevel,
        TracingRepresentation,
        COMMAND_TRACING_EVENT_TARGET,
        DEFAULT_MAX_DOCUMENT_LENGTH_BYTES,
    },
};

/// Type responsible for emitting command tracing events for a single dispatch.
pub(crate) struct CommandTracingEventEmitter<'a> {
    address: &'a ServerAddress,
    database_name: &'a str,
    command_name: &'a str,
    max_document_length_bytes: usize,
}

impl<'a> CommandTracingEventEmitter<'a> {
    pub(crate) fn new(
        address: &'a ServerAddress,
        database_name: &'a str,
        command_name: &'a str,
    ) -> CommandTracingEventEmitter<'a> {
        CommandTracingEventEmitter {
            address,
            database_name,
            command_name,
            max_document_length_bytes: DEFAULT_MAX_DOCUMENT_LENGTH_BYTES,
        }
    }

    pub(crate) fn emit_started_event(&self, command: &Document) {
        if trace_or_log_enabled!(target: COMMAND_TRACING_EVENT_TARGET, TracingOrLogLevel::Debug) {
            tracing::debug!(
                target: COMMAND_TRACING_EVENT_TARGET,
                command = serialize_command_or_reply(command, self.max_document_length_bytes),
                databaseName = self.database_name,
                commandName = self.command_name,
                serverHost = self.address.host(),
                serverPort = self.address.port_tracing_representation(),
                "Command started"
            );
        }
    }

    pub(crate) fn emit_succeeded_event(&self, reply: &Document, duration: Duration) {
        if trace_or_log_enabled!(target: COMMAND_TRACING_EVENT_TARGET, TracingOrLogLevel::Debug) {
            tracing::debug!(
                target: COMMAND_TRACING_EVENT_TARGET,
                reply = serialize_command_or_reply(reply, self.max_document_length_bytes),
                commandName = self.command_name,
                serverHost = self.address.host(),
                serverPort = self.address.port_tracing_representation(),
                durationMS = duration.as_millis(),
                "Command succeeded"
            );
        }
    }

    pub(crate) fn emit_failed_event(&self, failure: &Error, duration: Duration) {
        if trace_or_log_enabled!(target: COMMAND_TRACING_EVENT_TARGET, TracingOrLogLevel::Debug) {
            tracing::debug!(
                target: COMMAND_TRACING_EVENT_TARGET,
                failure = failure.tracing_representation(),
                commandName = self.command_name,
                serverHost = self.address.host(),
                serverPort = self.address.port_tracing_representation(),
                durationMS = duration.as_millis(),
                "Command failed"
            );
        }
    }
}
