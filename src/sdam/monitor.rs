use std::{future::Future, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{description::server::ServerDescription, topology::TopologyUpdater};
use crate::{
    error::Result,
    options::ClientOptions,
    trace::{
        trace_or_log_enabled,
        TracingOrLogLevel,
        TracingRepresentation,
        TOPOLOGY_TRACING_EVENT_TARGET,
    },
};

pub(crate) const MIN_HEARTBEAT_FREQUENCY: Duration = Duration::from_millis(500);

/// A source of server observations, such as a component that sends `hello` commands to every
/// known server.
pub trait HeartbeatSource: Send + Sync + 'static {
    /// Checks every known server, returning a fresh description of each of them.
    fn check(&self) -> impl Future<Output = Result<Vec<ServerDescription>>> + Send;
}

/// Periodically polls a [`HeartbeatSource`] and feeds what it observes into the topology.
#[derive(Debug)]
pub struct Monitor<S> {
    source: S,
    updater: TopologyUpdater,
    heartbeat_frequency: Duration,
    shutdown: CancellationToken,
}

impl<S: HeartbeatSource> Monitor<S> {
    /// Creates a monitor. This method does not start the monitor; use [`Monitor::start`] to do so.
    ///
    /// Heartbeat frequencies below 500ms are raised to 500ms.
    pub fn new(source: S, updater: TopologyUpdater, options: &ClientOptions) -> Self {
        Self {
            source,
            updater,
            heartbeat_frequency: options.heartbeat_frequency().max(MIN_HEARTBEAT_FREQUENCY),
            shutdown: CancellationToken::new(),
        }
    }

    /// A token that stops the monitor once cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Starts polling on the current tokio runtime. The first check happens immediately.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.execute())
    }

    async fn execute(self) {
        let mut interval = tokio::time::interval(self.heartbeat_frequency);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.check_once().await;
                }
            }
        }
    }

    /// Performs a single check, returning whether a new classification was published.
    pub(crate) async fn check_once(&self) -> bool {
        match self.source.check().await {
            Ok(servers) => self.updater.update(servers).is_ok(),
            Err(error) => {
                if trace_or_log_enabled!(
                    target: TOPOLOGY_TRACING_EVENT_TARGET,
                    TracingOrLogLevel::Debug
                ) {
                    tracing::debug!(
                        target: TOPOLOGY_TRACING_EVENT_TARGET,
                        failure = error.tracing_representation(),
                        "Heartbeat failed"
                    );
                }
                false
            }
        }
    }
}
