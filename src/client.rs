pub mod options;

use std::{fmt, sync::Arc};

use crate::{
    bson::Document,
    cmap::{ConnectionPool, Dispatcher},
    error::Result,
    operation::{reconcile, Command, RawReply, ReplyVariant, Request, WriteOperation},
    options::{ClientOptions, ReadPreference},
    results::WriteResult,
    sdam::{
        HeartbeatSource,
        Monitor,
        ServerDescription,
        Topology,
        TopologyDescription,
        TopologyUpdater,
        TopologyWatcher,
    },
    trace::server_selection::ServerSelectionEventEmitter,
};

/// The entry point of the core: a view of one deployment that selects servers for operations,
/// dispatches requests to them and reconciles the replies to batched writes.
///
/// The classification of the deployment is fed by the embedding driver, either directly through
/// [`Cluster::updater`] or by running a [`Monitor`] created with [`Cluster::monitor`]. Connections
/// are borrowed from the [`ConnectionPool`] given at construction.
///
/// `Cluster` uses [`std::sync::Arc`] internally, so it can safely be shared across threads or
/// async tasks. Two clusters are equal if they were created with equal options, which include
/// their seed addresses.
pub struct Cluster<P> {
    inner: Arc<ClusterInner<P>>,
}

struct ClusterInner<P> {
    options: ClientOptions,
    topology: Topology,
    dispatcher: Dispatcher<P>,
}

impl<P> Clone for Cluster<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P> PartialEq for Cluster<P> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.options == other.inner.options
    }
}

impl<P> fmt::Debug for Cluster<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("options", &self.inner.options)
            .field("topology", &self.inner.topology.description())
            .finish()
    }
}

impl<P: ConnectionPool> Cluster<P> {
    /// Creates a cluster for the deployment described by `options`, borrowing connections from
    /// `pool`. No server is known until the first classification is published.
    pub fn new(options: ClientOptions, pool: Arc<P>) -> Result<Self> {
        options.validate()?;

        let topology = Topology::new(&options);
        let dispatcher = Dispatcher::new(pool, &options);

        Ok(Self {
            inner: Arc::new(ClusterInner {
                options,
                topology,
                dispatcher,
            }),
        })
    }

    /// The options this cluster was created with.
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// A handle through which observed servers are published.
    pub fn updater(&self) -> TopologyUpdater {
        self.inner.topology.updater()
    }

    /// A handle that observes newly published classifications.
    pub fn watch(&self) -> TopologyWatcher {
        self.inner.topology.watch()
    }

    /// A snapshot of the current classification.
    pub fn description(&self) -> Arc<TopologyDescription> {
        self.inner.topology.description()
    }

    /// Creates a monitor that polls `source` on the configured heartbeat frequency and publishes
    /// what it observes into this cluster's topology.
    pub fn monitor<S: HeartbeatSource>(&self, source: S) -> Monitor<S> {
        Monitor::new(source, self.updater(), &self.inner.options)
    }

    /// The dispatcher used by this cluster.
    pub fn dispatcher(&self) -> &Dispatcher<P> {
        &self.inner.dispatcher
    }

    /// Returns every server eligible for `read_preference`, ordered by ascending latency.
    ///
    /// When `read_preference` is `None`, the read preference from the options applies, and
    /// [`ReadPreference::Primary`] if none was configured.
    pub fn select_servers(
        &self,
        read_preference: Option<&ReadPreference>,
    ) -> Result<Vec<ServerDescription>> {
        self.select(read_preference, "selectServers")
            .map(|(_, servers)| servers)
    }

    /// Returns the server an operation with `read_preference` should be sent to.
    pub fn select_server(&self, read_preference: Option<&ReadPreference>) -> Result<ServerDescription> {
        self.select(read_preference, "selectServer")
            .map(|(server, _)| server)
    }

    fn select(
        &self,
        read_preference: Option<&ReadPreference>,
        operation_name: &str,
    ) -> Result<(ServerDescription, Vec<ServerDescription>)> {
        let primary = ReadPreference::Primary;
        let read_preference = read_preference
            .or(self.inner.options.read_preference.as_ref())
            .unwrap_or(&primary);

        let description = self.inner.topology.description();
        let emitter = ServerSelectionEventEmitter::new(
            self.inner.topology.id(),
            read_preference,
            operation_name,
        );
        emitter.emit_started_event(&description);

        match description.select_servers(read_preference, &self.inner.options) {
            Ok(selection) => {
                let chosen = selection.choose();
                emitter.emit_succeeded_event(&description, chosen);
                let servers = selection.iter().map(|server| (*server).clone()).collect();
                Ok((chosen.clone(), servers))
            }
            Err(error) => {
                emitter.emit_failed_event(&description, &error);
                Err(error)
            }
        }
    }

    /// Sends `request` to `server`. See [`Dispatcher::dispatch`].
    pub async fn dispatch(&self, server: &ServerDescription, request: &Request) -> Result<RawReply> {
        self.inner.dispatcher.dispatch(server, request).await
    }

    /// Runs `command` against `db` on a server selected with `read_preference`, returning the
    /// reply. A reply reporting failure is returned as an error.
    pub async fn run_command(
        &self,
        db: &str,
        command: Document,
        read_preference: Option<&ReadPreference>,
    ) -> Result<Document> {
        let command = Command::new(db, command)?;
        let server = self.select(read_preference, command.name())?.0;
        let reply = self.dispatch(&server, &Request::Command(command)).await?;
        Ok(reply.into_document())
    }

    /// Splits `operation` into batches, sends them in order to the primary and folds the replies
    /// into one [`WriteResult`].
    ///
    /// When the operation is ordered, no batch is sent after one whose reply reports a failure.
    /// The operation's write concern defaults to the one from the options.
    pub async fn execute_write(
        &self,
        mut operation: WriteOperation,
        variant: ReplyVariant,
    ) -> Result<WriteResult> {
        if operation.write_concern.is_none() {
            operation.write_concern = self.inner.options.write_concern.clone();
        }
        let acknowledged = operation.is_acknowledged();
        let operation_name = operation.kind.command_name();
        let batches = operation.into_batches()?;

        let (primary, _) = self.select(Some(&ReadPreference::Primary), operation_name)?;

        let fields = &self.inner.options.reply_fields;
        let mut replies = Vec::with_capacity(batches.len());
        let mut index_maps = Vec::with_capacity(batches.len());
        for batch in batches {
            let ordered = batch.ordered;
            let index_map = batch.index_map.clone();
            let reply = self.dispatch(&primary, &Request::WriteBatch(batch)).await?;
            let failed = variant.reports_failure(reply.document(), fields);

            replies.push(reply);
            index_maps.push(index_map);
            if ordered && failed {
                break;
            }
        }

        Ok(reconcile(&replies, &index_maps, variant, acknowledged, fields))
    }
}
