use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{options::ServerAddress, selection_criteria::TagSet};

/// The role a server reported in its most recent heartbeat.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Deserialize, Serialize, derive_more::Display,
)]
#[non_exhaustive]
pub enum ServerType {
    /// A single, non-replicated server.
    Standalone,

    /// A router in front of a sharded cluster.
    Mongos,

    /// The primary of a replica set.
    #[serde(rename = "RSPrimary")]
    RsPrimary,

    /// A secondary of a replica set.
    #[serde(rename = "RSSecondary")]
    RsSecondary,

    /// An arbiter of a replica set. Arbiters vote in elections but hold no data.
    #[serde(rename = "RSArbiter")]
    RsArbiter,

    /// A replica set member that is neither primary, secondary nor arbiter, e.g. one that is
    /// recovering or starting up.
    #[serde(rename = "RSOther")]
    RsOther,

    /// A member that is part of a replica set whose configuration it does not yet know.
    #[serde(rename = "RSGhost")]
    RsGhost,

    /// A server that has not been successfully checked.
    #[default]
    Unknown,
}

impl ServerType {
    /// Whether servers of this type can serve operations and therefore belong to a classified
    /// topology.
    pub(crate) fn is_data_bearing(self) -> bool {
        matches!(
            self,
            ServerType::Standalone
                | ServerType::RsPrimary
                | ServerType::RsSecondary
                | ServerType::Mongos
        )
    }
}

/// An immutable snapshot of what was observed about a single server. Each heartbeat produces a
/// new description rather than mutating the previous one.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
#[non_exhaustive]
pub struct ServerDescription {
    /// The address of the server.
    #[builder(setter(into))]
    pub address: ServerAddress,

    /// The role the server reported.
    #[builder(default)]
    pub server_type: ServerType,

    /// The name of the replica set the server reported belonging to, if any.
    #[builder(default, setter(strip_option, into))]
    pub set_name: Option<String>,

    /// The tags configured for the server.
    #[builder(default)]
    pub tags: TagSet,

    /// The average round trip time of the server's heartbeats, if one has been measured.
    #[builder(default, setter(strip_option))]
    pub average_round_trip_time: Option<Duration>,

    /// The estimated replication lag of a secondary behind its primary, if known.
    #[builder(default, setter(strip_option))]
    pub replication_lag: Option<Duration>,
}

impl ServerDescription {
    /// Creates a description of a server that has not been checked yet.
    pub fn new(address: ServerAddress) -> Self {
        Self::builder().address(address).build()
    }

    /// The replica set name the server reported, ignoring empty names.
    pub(crate) fn set_name(&self) -> Option<&str> {
        self.set_name.as_deref().filter(|name| !name.is_empty())
    }

    /// Whether the server's tags include every tag in `tag_set`.
    pub(crate) fn matches_tag_set(&self, tag_set: &TagSet) -> bool {
        tag_set
            .iter()
            .all(|(key, value)| self.tags.get(key) == Some(value))
    }
}

impl fmt::Display for ServerDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ Address: {}, Type: {}", self.address, self.server_type)?;

        if let Some(set_name) = self.set_name() {
            write!(f, ", Set Name: {set_name}")?;
        }
        if !self.tags.is_empty() {
            write!(f, ", Tags: {:?}", self.tags)?;
        }
        if let Some(rtt) = self.average_round_trip_time {
            write!(f, ", Average RTT: {rtt:?}")?;
        }
        if let Some(lag) = self.replication_lag {
            write!(f, ", Replication Lag: {lag:?}")?;
        }

        write!(f, " }}")
    }
}
