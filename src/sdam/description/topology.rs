pub(crate) mod server_selection;
#[cfg(test)]
mod test;

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    options::ServerAddress,
    sdam::description::server::{ServerDescription, ServerType},
};

/// The shape of a deployment, derived from the servers observed in it.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default, Deserialize, Serialize)]
#[non_exhaustive]
pub enum TopologyType {
    /// A single standalone server.
    Single,

    /// Members of the replica set named `set_name`.
    ReplicaSet {
        /// The name every member reported.
        set_name: String,
    },

    /// One or more routers in front of a sharded cluster.
    Sharded,

    /// A deployment whose shape could not be determined from the observed servers.
    #[default]
    Unknown,
}

impl TopologyType {
    /// The replica set name, if this is a replica set.
    pub fn set_name(&self) -> Option<&str> {
        match self {
            Self::ReplicaSet { set_name } => Some(set_name.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for TopologyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "Single"),
            Self::ReplicaSet { set_name } => write!(f, "ReplicaSet ({set_name})"),
            Self::Sharded => write!(f, "Sharded"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A validated classification of a deployment together with the servers that can serve
/// operations in it.
///
/// Descriptions are never mutated once built: each monitoring cycle classifies the newly observed
/// servers into a fresh description that replaces the previous one.
#[derive(Debug, Clone, Default, PartialEq)]
#[non_exhaustive]
pub struct TopologyDescription {
    pub(crate) topology_type: TopologyType,
    pub(crate) servers: HashMap<ServerAddress, ServerDescription>,
}

impl TopologyDescription {
    /// Classifies a set of observed servers.
    ///
    /// Servers of type [`ServerType::Unknown`] are ignored. Arbiters, ghosts and other replica set
    /// members take part in the consistency checks but are not retained, since they cannot serve
    /// operations.
    ///
    /// Returns a [`TopologyConflict`](crate::error::ErrorKind::TopologyConflict) error if two
    /// servers report different replica set names (or a server's name differs from
    /// `expected_set_name`), or if standalone servers or routers are observed alongside servers of
    /// any other kind.
    pub fn classify(
        servers: impl IntoIterator<Item = ServerDescription>,
        expected_set_name: Option<&str>,
    ) -> Result<Self> {
        let servers: Vec<ServerDescription> = servers.into_iter().collect();

        if expected_set_name.is_none()
            && servers.len() == 1
            && servers[0].server_type == ServerType::Standalone
        {
            return Ok(Self::single(servers));
        }

        let mut set_name = expected_set_name
            .filter(|name| !name.is_empty())
            .map(String::from);
        let mut total = 0usize;
        let mut standalones = 0usize;
        let mut routers = 0usize;
        let mut retained = HashMap::new();

        for server in servers {
            if server.server_type == ServerType::Unknown {
                continue;
            }

            if let Some(name) = server.set_name() {
                match set_name {
                    Some(ref pinned) if pinned != name => {
                        return Err(Error::topology_conflict(format!(
                            "non-matching replica set names: expected {pinned}, but {} reported \
                             {name}",
                            server.address
                        )));
                    }
                    Some(_) => {}
                    None => set_name = Some(name.to_string()),
                }
            }

            total += 1;
            match server.server_type {
                ServerType::Standalone => standalones += 1,
                ServerType::Mongos => routers += 1,
                _ => {}
            }

            // Checked after every server so a mixed set is rejected no matter the scan order.
            if standalones > 0 && standalones != total {
                return Err(Error::topology_conflict(
                    "standalone server mixed with replica-set/router servers",
                ));
            }
            if routers > 0 && routers != total {
                return Err(Error::topology_conflict(
                    "router server mixed with replica-set/standalone servers",
                ));
            }

            if server.server_type.is_data_bearing() {
                retained.insert(server.address.clone(), server);
            }
        }

        let topology_type = if standalones > 0 {
            TopologyType::Single
        } else if let Some(set_name) = set_name {
            TopologyType::ReplicaSet { set_name }
        } else if routers > 0 {
            TopologyType::Sharded
        } else {
            TopologyType::Unknown
        };

        Ok(Self {
            topology_type,
            servers: retained,
        })
    }

    fn single(servers: Vec<ServerDescription>) -> Self {
        Self {
            topology_type: TopologyType::Single,
            servers: servers
                .into_iter()
                .map(|server| (server.address.clone(), server))
                .collect(),
        }
    }

    /// The classification of the deployment.
    pub fn topology_type(&self) -> &TopologyType {
        &self.topology_type
    }

    /// The servers retained by the classification, in no particular order.
    pub fn servers(&self) -> impl Iterator<Item = &ServerDescription> {
        self.servers.values()
    }

    /// The description of the server at `address`, if it was retained.
    pub fn server(&self, address: &ServerAddress) -> Option<&ServerDescription> {
        self.servers.get(address)
    }

    pub(crate) fn primary(&self) -> Option<&ServerDescription> {
        self.servers
            .values()
            .find(|sd| sd.server_type == ServerType::RsPrimary)
    }

    /// Computes what changed between `self` and a newer description.
    pub(crate) fn diff<'a>(&'a self, other: &'a TopologyDescription) -> TopologyDescriptionDiff<'a> {
        let mut added: Vec<&ServerAddress> = other
            .servers
            .keys()
            .filter(|address| !self.servers.contains_key(*address))
            .collect();
        let mut removed: Vec<&ServerAddress> = self
            .servers
            .keys()
            .filter(|address| !other.servers.contains_key(*address))
            .collect();
        let mut changed: Vec<&ServerAddress> = other
            .servers
            .iter()
            .filter_map(|(address, server)| match self.servers.get(address) {
                Some(previous) if previous != server => Some(address),
                _ => None,
            })
            .collect();

        added.sort_by_key(|address| address.to_string());
        removed.sort_by_key(|address| address.to_string());
        changed.sort_by_key(|address| address.to_string());

        TopologyDescriptionDiff {
            type_changed: (self.topology_type != other.topology_type)
                .then_some((&self.topology_type, &other.topology_type)),
            added,
            removed,
            changed,
        }
    }
}

impl fmt::Display for TopologyDescription {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::result::Result<(), fmt::Error> {
        write!(f, "{{ Type: {}", self.topology_type)?;

        if !self.servers.is_empty() {
            let mut servers: Vec<_> = self.servers.values().collect();
            servers.sort_by_key(|server| server.address.to_string());

            write!(f, ", Servers: [ ")?;
            let mut iter = servers.into_iter();
            if let Some(server) = iter.next() {
                write!(f, "{server}")?;
            }
            for server in iter {
                write!(f, ", {server}")?;
            }
            write!(f, " ]")?;
        }

        write!(f, " }}")
    }
}

/// The differences between two consecutive topology descriptions.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct TopologyDescriptionDiff<'a> {
    pub(crate) type_changed: Option<(&'a TopologyType, &'a TopologyType)>,
    pub(crate) added: Vec<&'a ServerAddress>,
    pub(crate) removed: Vec<&'a ServerAddress>,
    pub(crate) changed: Vec<&'a ServerAddress>,
}

impl TopologyDescriptionDiff<'_> {
    pub(crate) fn is_empty(&self) -> bool {
        self.type_changed.is_none()
            && self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
    }
}
