
use std::{ops::Deref, time::Duration};

use rand::seq::IndexedRandom;

use super::{TopologyDescription, TopologyType};
use crate::{
    error::{Error, Result},
    options::ClientOptions,
    sdam::description::server::{ServerDescription, ServerType},
    selection_criteria::{ReadPreference, TagSet},
};

pub(crate) const IDLE_WRITE_PERIOD: Duration = Duration::from_secs(10);
pub(crate) const SMALLEST_MAX_STALENESS: Duration = Duration::from_secs(90);

/// The servers eligible for an operation, ordered by ascending latency. Servers whose latency
/// is unknown come last; ties are broken by address.
///
/// A `Selection` always contains at least one server.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    servers: Vec<&'a ServerDescription>,
    local_threshold: Duration,
    randomize: bool,
}

impl<'a> Selection<'a> {
    fn new(mut servers: Vec<&'a ServerDescription>, options: &ClientOptions) -> Result<Self> {
        if servers.is_empty() {
            return Err(Error::internal("cannot build an empty selection"));
        }

        servers.sort_by(|a, b| {
            let latency = |sd: &ServerDescription| {
                (sd.average_round_trip_time.is_none(), sd.average_round_trip_time)
            };
            latency(*a)
                .cmp(&latency(*b))
                .then_with(|| a.address.to_string().cmp(&b.address.to_string()))
        });

        Ok(Self {
            servers,
            local_threshold: options.local_threshold(),
            randomize: options.randomize_within_latency_window(),
        })
    }

    /// The eligible servers that are within the local threshold of the fastest one.
    pub fn in_latency_window(&self) -> &[&'a ServerDescription] {
        let max_rtt_within_window = self.servers[0]
            .average_round_trip_time
            .map(|rtt| rtt.checked_add(self.local_threshold).unwrap_or(Duration::MAX));

        let in_window = match max_rtt_within_window {
            Some(max_rtt) => self
                .servers
                .iter()
                .take_while(|sd| {
                    sd.average_round_trip_time
                        .map(|rtt| rtt <= max_rtt)
                        .unwrap_or(false)
                })
                .count(),
            // The fastest server's latency is unknown, so none of them have been measured.
            None => self.servers.len(),
        };

        &self.servers[..in_window]
    }

    /// Picks the server to send the operation to: the first one, or a uniformly random one from
    /// the latency window when randomization is enabled.
    pub fn choose(&self) -> &'a ServerDescription {
        if self.randomize {
            if let Some(server) = self.in_latency_window().choose(&mut rand::rng()).copied() {
                return server;
            }
        }
        self.servers[0]
    }

    /// Consumes the selection, returning the ordered list of eligible servers.
    pub fn into_servers(self) -> Vec<&'a ServerDescription> {
        self.servers
    }
}

impl<'a> Deref for Selection<'a> {
    type Target = [&'a ServerDescription];

    fn deref(&self) -> &Self::Target {
        &self.servers
    }
}

impl TopologyDescription {
    /// Returns the servers eligible for an operation with the given read preference, ordered by
    /// latency.
    ///
    /// The read preference only applies to replica sets: a single topology yields its standalone
    /// server and a sharded topology its routers. An unknown topology, or one with no eligible
    /// server, yields a [`ServerSelection`](crate::error::ErrorKind::ServerSelection) error.
    pub fn select_servers(
        &self,
        read_preference: &ReadPreference,
        options: &ClientOptions,
    ) -> Result<Selection<'_>> {
        if self.topology_type == TopologyType::Unknown {
            return Err(Error::server_selection(format!(
                "no servers are available for read preference {read_preference}: the topology \
                 type is Unknown"
            )));
        }

        if let Some(max_staleness) = read_preference.max_staleness() {
            // A zero bound is the same as no bound.
            if max_staleness > Duration::ZERO {
                verify_max_staleness(max_staleness, options.heartbeat_frequency())?;
            }
        }

        let suitable_servers = match self.topology_type {
            TopologyType::Single => self
                .servers
                .values()
                .filter(|sd| sd.server_type == ServerType::Standalone)
                .collect(),
            TopologyType::Sharded => self
                .servers
                .values()
                .filter(|sd| sd.server_type == ServerType::Mongos)
                .collect(),
            TopologyType::ReplicaSet { .. } => self.filter_servers_in_replica_set(read_preference),
            TopologyType::Unknown => Vec::new(),
        };

        if suitable_servers.is_empty() {
            let message = match read_preference {
                ReadPreference::Primary => format!("no primary available in topology {self}"),
                _ => format!(
                    "no server in topology {self} is suitable for read preference \
                     {read_preference}"
                ),
            };
            return Err(Error::server_selection(message));
        }

        Selection::new(suitable_servers, options)
    }

    fn filter_servers_in_replica_set(
        &self,
        read_preference: &ReadPreference,
    ) -> Vec<&ServerDescription> {
        match read_preference {
            ReadPreference::Primary => self.primary().into_iter().collect(),
            ReadPreference::Secondary { .. } => {
                self.filter_servers_with_read_preference(&[ServerType::RsSecondary], read_preference)
            }
            ReadPreference::PrimaryPreferred { .. } => match self.primary() {
                Some(primary) => vec![primary],
                None => self.filter_servers_with_read_preference(
                    &[ServerType::RsSecondary],
                    read_preference,
                ),
            },
            ReadPreference::SecondaryPreferred { .. } => {
                let secondaries = self.filter_servers_with_read_preference(
                    &[ServerType::RsSecondary],
                    read_preference,
                );
                if !secondaries.is_empty() {
                    secondaries
                } else {
                    self.primary().into_iter().collect()
                }
            }
            ReadPreference::Nearest { .. } => self.filter_servers_with_read_preference(
                &[ServerType::RsPrimary, ServerType::RsSecondary],
                read_preference,
            ),
        }
    }

    fn filter_servers_with_read_preference(
        &self,
        types: &[ServerType],
        read_preference: &ReadPreference,
    ) -> Vec<&ServerDescription> {
        let mut servers = self
            .servers
            .values()
            .filter(|sd| types.contains(&sd.server_type))
            .collect();

        if let Some(tag_sets) = read_preference.tag_sets() {
            filter_servers_by_tag_sets(&mut servers, tag_sets);
        }

        if let Some(max_staleness) = read_preference.max_staleness() {
            if max_staleness > Duration::ZERO {
                filter_servers_by_max_staleness(&mut servers, max_staleness);
            }
        }

        servers
    }
}

/// Ensures a max staleness is large enough to be meaningful given how often servers are checked.
pub(crate) fn verify_max_staleness(
    max_staleness: Duration,
    heartbeat_frequency: Duration,
) -> Result<()> {
    let smallest_max_staleness = std::cmp::max(
        SMALLEST_MAX_STALENESS,
        heartbeat_frequency
            .checked_add(IDLE_WRITE_PERIOD)
            .unwrap_or(Duration::MAX),
    );

    if max_staleness < smallest_max_staleness {
        return Err(Error::invalid_argument(format!(
            "invalid max_staleness value: must be at least {} seconds",
            smallest_max_staleness.as_secs()
        )));
    }

    Ok(())
}

fn filter_servers_by_tag_sets(servers: &mut Vec<&ServerDescription>, tag_sets: &[TagSet]) {
    if tag_sets.is_empty() {
        return;
    }

    servers.retain(|server| tag_sets.iter().any(|tag_set| server.matches_tag_set(tag_set)));
}

fn filter_servers_by_max_staleness(servers: &mut Vec<&ServerDescription>, max_staleness: Duration) {
    servers.retain(|server| {
        server.server_type != ServerType::RsSecondary
            || server
                .replication_lag
                .map(|lag| lag <= max_staleness)
                .unwrap_or(false)
    });
}
