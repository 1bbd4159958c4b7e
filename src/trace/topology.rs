use crate::{
    bson::oid::ObjectId,
    error::Error,
    sdam::TopologyDescription,
};

use super::{
    trace_or_log_enabled,
    TracingOrLogLevel,
    TracingRepresentation,
    TOPOLOGY_TRACING_EVENT_TARGET,
};

/// Type responsible for emitting tracing events when the published topology changes.
#[derive(Clone, Debug)]
pub(crate) struct TopologyTracingEventEmitter {
    topology_id: ObjectId,
}

impl TopologyTracingEventEmitter {
    pub(crate) fn new(topology_id: ObjectId) -> TopologyTracingEventEmitter {
        TopologyTracingEventEmitter { topology_id }
    }

    pub(crate) fn emit_description_changed_event(
        &self,
        previous: &TopologyDescription,
        new: &TopologyDescription,
    ) {
        let diff = previous.diff(new);
        if diff.is_empty() {
            return;
        }

        if trace_or_log_enabled!(
            target: TOPOLOGY_TRACING_EVENT_TARGET,
            TracingOrLogLevel::Debug
        ) {
            let join = |addresses: &[&crate::options::ServerAddress]| {
                addresses
                    .iter()
                    .map(|address| address.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            };

            tracing::debug!(
                target: TOPOLOGY_TRACING_EVENT_TARGET,
                topologyId = self.topology_id.tracing_representation(),
                previousType = diff.type_changed.map(|(previous, _)| previous.to_string()),
                newType = diff.type_changed.map(|(_, new)| new.to_string()),
                addedServers = join(&diff.added),
                removedServers = join(&diff.removed),
                changedServers = join(&diff.changed),
                previousDescription = previous.tracing_representation(),
                newDescription = new.tracing_representation(),
                "Topology description changed"
            );
        }
    }

    pub(crate) fn emit_conflict_event(&self, current: &TopologyDescription, error: &Error) {
        if trace_or_log_enabled!(
            target: TOPOLOGY_TRACING_EVENT_TARGET,
            TracingOrLogLevel::Warn
        ) {
            tracing::warn!(
                target: TOPOLOGY_TRACING_EVENT_TARGET,
                topologyId = self.topology_id.tracing_representation(),
                failure = error.tracing_representation(),
                retainedDescription = current.tracing_representation(),
                "Discarding inconsistent topology observation"
            );
        }
    }
}
