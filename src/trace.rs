use crate::{
    bson::{oid::ObjectId, Bson, Document},
    error::Error,
    options::{ReadPreference, ServerAddress},
    sdam::TopologyDescription,
};

pub(crate) mod command;
pub(crate) mod connection;
pub(crate) mod server_selection;
pub(crate) mod topology;

pub(crate) const COMMAND_TRACING_EVENT_TARGET: &str = "mongodb_core::command";
pub(crate) const CONNECTION_TRACING_EVENT_TARGET: &str = "mongodb_core::connection";
pub(crate) const SERVER_SELECTION_TRACING_EVENT_TARGET: &str = "mongodb_core::server_selection";
pub(crate) const TOPOLOGY_TRACING_EVENT_TARGET: &str = "mongodb_core::topology";

pub(crate) const DEFAULT_MAX_DOCUMENT_LENGTH_BYTES: usize = 1000;

pub(crate) trait TracingRepresentation {
    type Representation;

    fn tracing_representation(&self) -> Self::Representation;
}

impl TracingRepresentation for ObjectId {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        self.to_hex()
    }
}

impl TracingRepresentation for Document {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        Bson::Document(self.clone())
            .into_relaxed_extjson()
            .to_string()
    }
}

/// Types whose `Display` output is what tracing events record for them.
macro_rules! display_representation {
    ($($ty:ty),+) => {
        $(
            impl TracingRepresentation for $ty {
                type Representation = String;

                fn tracing_representation(&self) -> String {
                    self.to_string()
                }
            }
        )+
    };
}

display_representation!(Error, ReadPreference, TopologyDescription);

impl ServerAddress {
    /// Tracing events always report a port, filling in the default when none was given.
    pub(crate) fn port_tracing_representation(&self) -> Option<u16> {
        match self {
            Self::Tcp { port, .. } => {
                Some(port.unwrap_or(crate::client::options::DEFAULT_PORT))
            }
        }
    }
}

/// Serializes a command or reply to extended JSON, truncated to at most `max_length_bytes` bytes
/// (plus a trailing ellipsis).
pub(crate) fn serialize_command_or_reply(doc: &Document, max_length_bytes: usize) -> String {
    let mut serialized = doc.tracing_representation();
    if serialized.len() > max_length_bytes {
        let end = (0..=max_length_bytes)
            .rev()
            .find(|end| serialized.is_char_boundary(*end))
            .unwrap_or(0);
        serialized.truncate(end);
        serialized.push_str("...");
    }
    serialized
}

/// The levels events in this crate are emitted at, mapped onto both `tracing` and `log`.
pub(crate) enum TracingOrLogLevel {
    Warn,
    Debug,
}

impl TracingOrLogLevel {
    pub(crate) const fn as_log_level(&self) -> log::Level {
        match self {
            Self::Warn => log::Level::Warn,
            Self::Debug => log::Level::Debug,
        }
    }

    pub(crate) const fn as_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Warn => tracing::Level::WARN,
            Self::Debug => tracing::Level::DEBUG,
        }
    }
}

/// Whether an event at the given target and level would be recorded by either a `tracing`
/// subscriber or a `log` logger.
macro_rules! trace_or_log_enabled {
    (target: $target:expr, $lvl:expr) => {
        tracing::enabled!(target: $target, $lvl.as_tracing_level())
            || log::log_enabled!(target: $target, $lvl.as_log_level())
    };
}
pub(crate) use trace_or_log_enabled;
