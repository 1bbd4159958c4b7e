mod description;
mod monitor;
mod topology;

pub use self::{
    description::{
        server::{ServerDescription, ServerType},
        topology::{server_selection::Selection, TopologyDescription, TopologyType},
    },
    monitor::{HeartbeatSource, Monitor},
    topology::{TopologyUpdater, TopologyWatcher},
};

pub(crate) use self::{monitor::MIN_HEARTBEAT_FREQUENCY, topology::Topology};
