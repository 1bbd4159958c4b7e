//! This crate contains the deployment-facing core of a MongoDB driver: it classifies the shape of
//! a deployment from the servers observed in it, selects a server for each operation according to
//! a read preference, dispatches requests over connections borrowed from a pool and reconciles the
//! replies to writes that were split across several network batches. It uses the [`bson`] crate
//! for BSON support and runs on [`tokio`](https://docs.rs/tokio).
//!
//! Connection pooling, connection establishment and server monitoring belong to the embedding
//! driver, which plugs them in through the [`ConnectionPool`], [`Connection`] and
//! [`HeartbeatSource`] traits.
//!
//! # Example Usage
//!
//! ## Classifying a deployment and selecting a server
//! ```rust
//! # fn main() -> mongodb_core::error::Result<()> {
//! use std::time::Duration;
//!
//! use mongodb_core::{
//!     options::{ClientOptions, ReadPreference, ServerAddress},
//!     ServerDescription,
//!     ServerType,
//!     TopologyDescription,
//!     TopologyType,
//! };
//!
//! let member = |address: &str, server_type: ServerType, rtt: u64| {
//!     ServerDescription::builder()
//!         .address(ServerAddress::parse(address).unwrap())
//!         .server_type(server_type)
//!         .set_name("rs0")
//!         .average_round_trip_time(Duration::from_millis(rtt))
//!         .build()
//! };
//!
//! let description = TopologyDescription::classify(
//!     vec![
//!         member("a:27017", ServerType::RsPrimary, 10),
//!         member("b:27017", ServerType::RsSecondary, 2),
//!     ],
//!     None,
//! )?;
//! assert_eq!(
//!     description.topology_type(),
//!     &TopologyType::ReplicaSet { set_name: "rs0".to_string() }
//! );
//!
//! let nearest = ReadPreference::Nearest { options: None };
//! let selection = description.select_servers(&nearest, &ClientOptions::default())?;
//! assert_eq!(selection.choose().address.host(), "b");
//! # Ok(())
//! # }
//! ```
//!
//! ## Reconciling the replies to a batched write
//! ```rust
//! use mongodb_core::{
//!     bson::doc,
//!     options::{ReplyFieldNames, ReplyVariant, ServerAddress},
//!     reconcile,
//!     BatchIndexMap,
//!     RawReply,
//! };
//!
//! // Five documents were sent in two batches: [0, 1, 2] and [3, 4].
//! let replies = vec![
//!     RawReply::new(ServerAddress::default(), doc! { "ok": 1, "n": 3 }),
//!     RawReply::new(
//!         ServerAddress::default(),
//!         doc! {
//!             "ok": 1,
//!             "n": 1,
//!             "writeErrors": [{ "index": 1, "code": 11000, "errmsg": "duplicate key" }],
//!         },
//!     ),
//! ];
//! let index_maps = vec![BatchIndexMap::range(0, 3), BatchIndexMap::range(3, 2)];
//!
//! let result = reconcile(
//!     &replies,
//!     &index_maps,
//!     ReplyVariant::Modern,
//!     true,
//!     &ReplyFieldNames::default(),
//! );
//! assert_eq!(result.affected_count, 4);
//! assert_eq!(result.write_errors[0].index, 4);
//! ```
//!
//! ## Logging
//! Events are emitted through [`tracing`](https://docs.rs/tracing) (and forwarded to
//! [`log`](https://docs.rs/log) when no tracing subscriber is installed) at the debug level, with
//! the following targets:
//!
//! | Target                           | Events                                                |
//! |:---------------------------------|:------------------------------------------------------|
//! | `mongodb_core::topology`         | classification published, conflicting observation     |
//! | `mongodb_core::server_selection` | selection started, succeeded or failed                |
//! | `mongodb_core::command`          | command started, succeeded or failed                  |
//! | `mongodb_core::connection`       | checkout failed, connection closed instead of reused  |
//!
//! ## Minimum supported Rust version (MSRV)
//!
//! The MSRV for this crate is currently 1.83.0.

#![warn(missing_docs)]
#![cfg_attr(docsrs, warn(rustdoc::missing_crate_level_docs))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod options;

pub use ::bson;

mod bson_util;
mod client;
mod cmap;
mod concern;
pub mod error;
mod operation;
pub mod results;
mod sdam;
mod selection_criteria;
mod serde_util;
#[cfg(test)]
mod test;
mod trace;

pub use crate::{
    client::Cluster,
    cmap::{Connection, ConnectionPool, Dispatcher},
    operation::{reconcile, BatchIndexMap, Command, RawReply, Request, WriteBatch},
    results::WriteResult,
    sdam::{
        HeartbeatSource,
        Monitor,
        Selection,
        ServerDescription,
        ServerType,
        TopologyDescription,
        TopologyType,
        TopologyUpdater,
        TopologyWatcher,
    },
};
