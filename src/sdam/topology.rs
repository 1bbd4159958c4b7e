use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::{
    bson::oid::ObjectId,
    error::Result,
    options::ClientOptions,
    sdam::description::{server::ServerDescription, topology::TopologyDescription},
    trace::topology::TopologyTracingEventEmitter,
};

/// The current view of a deployment: the most recent valid classification, published to any
/// number of watchers.
#[derive(Debug)]
pub(crate) struct Topology {
    id: ObjectId,
    watcher: TopologyWatcher,
    updater: TopologyUpdater,
}

impl Topology {
    pub(crate) fn new(options: &ClientOptions) -> Topology {
        let id = ObjectId::new();
        let (sender, receiver) = watch::channel(Arc::new(TopologyDescription::default()));

        let updater = TopologyUpdater {
            sender: Arc::new(sender),
            expected_set_name: options.repl_set_name.clone(),
            emitter: TopologyTracingEventEmitter::new(id),
        };
        let watcher = TopologyWatcher { receiver };

        Topology {
            id,
            watcher,
            updater,
        }
    }

    pub(crate) fn id(&self) -> ObjectId {
        self.id
    }

    pub(crate) fn watch(&self) -> TopologyWatcher {
        let mut watcher = self.watcher.clone();
        // Mark the latest description as seen, so that the new watcher only waits for newer ones.
        watcher.receiver.borrow_and_update();
        watcher
    }

    pub(crate) fn updater(&self) -> TopologyUpdater {
        self.updater.clone()
    }

    pub(crate) fn description(&self) -> Arc<TopologyDescription> {
        self.watcher.description()
    }
}

/// Publishes new classifications of the deployment.
///
/// Every call to [`TopologyUpdater::update`] classifies a complete set of observed servers. A
/// valid classification atomically replaces the published one; a conflicting one is discarded and
/// the previous classification stays in effect.
#[derive(Clone, Debug)]
pub struct TopologyUpdater {
    sender: Arc<watch::Sender<Arc<TopologyDescription>>>,
    expected_set_name: Option<String>,
    emitter: TopologyTracingEventEmitter,
}

impl TopologyUpdater {
    /// Classifies `servers` and, if they form a consistent topology, publishes the result.
    pub fn update(
        &self,
        servers: impl IntoIterator<Item = ServerDescription>,
    ) -> Result<Arc<TopologyDescription>> {
        let description =
            match TopologyDescription::classify(servers, self.expected_set_name.as_deref()) {
                Ok(description) => Arc::new(description),
                Err(error) => {
                    self.emitter.emit_conflict_event(&self.sender.borrow(), &error);
                    return Err(error);
                }
            };

        let previous = self.sender.send_replace(description.clone());
        self.emitter.emit_description_changed_event(&previous, &description);

        Ok(description)
    }
}

/// Observes the published classification of the deployment.
#[derive(Clone, Debug)]
pub struct TopologyWatcher {
    receiver: watch::Receiver<Arc<TopologyDescription>>,
}

impl TopologyWatcher {
    /// A snapshot of the latest classification. The snapshot is never modified; later
    /// classifications are published as new descriptions.
    pub fn description(&self) -> Arc<TopologyDescription> {
        self.receiver.borrow().clone()
    }

    /// Waits up to `timeout` for a newer classification than the last one observed through this
    /// watcher, returning whether one was published.
    pub async fn wait_for_update(&mut self, timeout: Duration) -> bool {
        let changed = tokio::time::timeout(timeout, self.receiver.changed())
            .await
            .map(|result| result.is_ok())
            .unwrap_or(false);
        self.receiver.borrow_and_update();
        changed
    }
}
