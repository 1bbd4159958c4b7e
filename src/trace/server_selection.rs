use super::{
    trace_or_log_enabled,
    TracingOrLogLevel,
    TracingRepresentation,
    SERVER_SELECTION_TRACING_EVENT_TARGET,
};
use crate::{
    bson::oid::ObjectId,
    error::Error,
    options::ReadPreference,
    sdam::{ServerDescription, TopologyDescription},
};

/// How a selection attempt ended, if it has.
enum Outcome<'a> {
    Pending,
    Selected(&'a ServerDescription),
    Failed(&'a Error),
}

/// Emits the tracing events of a single server selection attempt.
pub(crate) struct ServerSelectionEventEmitter<'a> {
    topology_id: ObjectId,
    read_preference: &'a ReadPreference,
    operation_name: &'a str,
}

impl<'a> ServerSelectionEventEmitter<'a> {
    pub(crate) fn new(
        topology_id: ObjectId,
        read_preference: &'a ReadPreference,
        operation_name: &'a str,
    ) -> Self {
        Self {
            topology_id,
            read_preference,
            operation_name,
        }
    }

    pub(crate) fn emit_started_event(&self, description: &TopologyDescription) {
        self.emit(description, Outcome::Pending);
    }

    pub(crate) fn emit_failed_event(&self, description: &TopologyDescription, error: &Error) {
        self.emit(description, Outcome::Failed(error));
    }

    pub(crate) fn emit_succeeded_event(
        &self,
        description: &TopologyDescription,
        server: &ServerDescription,
    ) {
        self.emit(description, Outcome::Selected(server));
    }

    fn emit(&self, description: &TopologyDescription, outcome: Outcome<'_>) {
        if !trace_or_log_enabled!(
            target: SERVER_SELECTION_TRACING_EVENT_TARGET,
            TracingOrLogLevel::Debug
        ) {
            return;
        }

        let topology_id = self.topology_id.tracing_representation();
        let selector = self.read_preference.tracing_representation();
        let topology = description.tracing_representation();

        match outcome {
            Outcome::Pending => tracing::debug!(
                target: SERVER_SELECTION_TRACING_EVENT_TARGET,
                topologyId = topology_id,
                operation = self.operation_name,
                selector,
                topologyDescription = topology,
                "Server selection started"
            ),
            Outcome::Selected(server) => tracing::debug!(
                target: SERVER_SELECTION_TRACING_EVENT_TARGET,
                topologyId = topology_id,
                operation = self.operation_name,
                selector,
                topologyDescription = topology,
                serverHost = server.address.host(),
                serverPort = server.address.port_tracing_representation(),
                "Server selection succeeded"
            ),
            Outcome::Failed(error) => tracing::debug!(
                target: SERVER_SELECTION_TRACING_EVENT_TARGET,
                topologyId = topology_id,
                operation = self.operation_name,
                selector,
                topologyDescription = topology,
                failure = error.tracing_representation(),
                "Server selection failed"
            ),
        }
    }
}
