use std::{
    collections::{HashMap, HashSet},
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use mongodb_core::{
    bson::{doc, Bson, Document},
    error::Result,
    options::{
        ClientOptions,
        ReadPreference,
        ReadPreferenceOptions,
        ReplyVariant,
        ServerAddress,
        WriteKind,
        WriteOperation,
    },
    Cluster,
    Connection,
    ConnectionPool,
    HeartbeatSource,
    ServerDescription,
    ServerType,
    TopologyType,
};
use pretty_assertions::assert_eq;

/// An in-memory deployment where every server holds its own set of `_id`s.
#[derive(Clone, Default)]
struct FakeDeployment {
    collections: Arc<Mutex<HashMap<ServerAddress, HashSet<i32>>>>,
    requests: Arc<Mutex<Vec<ServerAddress>>>,
    down: Arc<Mutex<HashSet<ServerAddress>>>,
}

impl FakeDeployment {
    fn handle(&self, address: &ServerAddress, request: Document) -> Document {
        self.requests.lock().unwrap().push(address.clone());

        if request.contains_key("ping") {
            return doc! { "ok": 1 };
        }
        let Ok(documents) = request.get_array("documents") else {
            return doc! { "ok": 0, "code": 59, "codeName": "CommandNotFound", "errmsg": "no such command" };
        };

        let mut collections = self.collections.lock().unwrap();
        let ids = collections.entry(address.clone()).or_default();
        let mut inserted = 0;
        let mut write_errors = Vec::new();
        for (index, document) in documents.iter().enumerate() {
            let id = document
                .as_document()
                .and_then(|document| document.get_i32("_id").ok())
                .unwrap_or_default();
            if ids.insert(id) {
                inserted += 1;
            } else {
                write_errors.push(Bson::Document(doc! {
                    "index": index as i32,
                    "code": 11000,
                    "errmsg": format!("E11000 duplicate key error dup key: {{ _id: {id} }}"),
                }));
                if request.get_bool("ordered").unwrap_or(true) {
                    break;
                }
            }
        }

        let mut reply = doc! { "ok": 1, "n": inserted };
        if !write_errors.is_empty() {
            reply.insert("writeErrors", write_errors);
        }
        reply
    }
}

struct FakeConnection {
    address: ServerAddress,
    deployment: FakeDeployment,
}

impl Connection for FakeConnection {
    async fn send_and_receive(&mut self, message: Vec<u8>) -> Result<Vec<u8>> {
        if self.deployment.down.lock().unwrap().contains(&self.address) {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset).into());
        }

        let request = Document::from_reader(message.as_slice()).map_err(io::Error::other)?;
        let reply = self.deployment.handle(&self.address, request);

        let mut bytes = Vec::new();
        reply.to_writer(&mut bytes).map_err(io::Error::other)?;
        Ok(bytes)
    }
}

impl ConnectionPool for FakeDeployment {
    type Connection = FakeConnection;

    async fn check_out(&self, address: &ServerAddress) -> Result<FakeConnection> {
        Ok(FakeConnection {
            address: address.clone(),
            deployment: self.clone(),
        })
    }

    fn check_in(&self, _connection: FakeConnection) {}
}

fn member(address: &str, server_type: ServerType, rtt_ms: u64, dc: &str) -> ServerDescription {
    ServerDescription::builder()
        .address(ServerAddress::parse(address).unwrap())
        .server_type(server_type)
        .set_name("rs0")
        .tags([("dc".to_string(), dc.to_string())].into_iter().collect())
        .average_round_trip_time(Duration::from_millis(rtt_ms))
        .replication_lag(Duration::from_secs(1))
        .build()
}

fn replica_set() -> Vec<ServerDescription> {
    vec![
        member("a:27017", ServerType::RsPrimary, 12, "ny"),
        member("b:27017", ServerType::RsSecondary, 3, "sf"),
        member("c:27017", ServerType::RsSecondary, 7, "ny"),
        member("d:27017", ServerType::RsArbiter, 1, "ny"),
    ]
}

fn new_cluster(deployment: &FakeDeployment) -> Cluster<FakeDeployment> {
    let options = ClientOptions::parse("mongodb://a,b,c/?replicaSet=rs0").unwrap();
    Cluster::new(options, Arc::new(deployment.clone())).unwrap()
}

fn insert(ids: &[i32], ordered: bool, max_batch_size: usize) -> WriteOperation {
    WriteOperation::builder()
        .target_db("test")
        .collection("coll")
        .kind(WriteKind::Insert)
        .documents(ids.iter().map(|id| doc! { "_id": id }).collect::<Vec<_>>())
        .ordered(ordered)
        .max_batch_size(max_batch_size)
        .build()
}

#[tokio::test]
async fn select_dispatch_reconcile() {
    let deployment = FakeDeployment::default();
    let cluster = new_cluster(&deployment);
    cluster.updater().update(replica_set()).unwrap();

    assert_eq!(
        cluster.description().topology_type(),
        &TopologyType::ReplicaSet {
            set_name: "rs0".to_string()
        }
    );

    let seeded = cluster
        .execute_write(insert(&[1, 5], true, 100), ReplyVariant::Modern)
        .await
        .unwrap();
    assert_eq!(seeded.affected_count, 2);
    assert!(seeded.is_success());

    let result = cluster
        .execute_write(insert(&[0, 1, 2, 3, 4, 5, 6], false, 3), ReplyVariant::Modern)
        .await
        .unwrap();

    assert_eq!(result.affected_count, 5);
    assert_eq!(result.failed_indexes(), vec![1, 5]);
    assert!(result.write_errors.iter().all(|error| error.code == 11000));
    assert!(result.reply_errors.is_empty());

    let requests = deployment.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 4);
    assert!(requests
        .iter()
        .all(|address| address == &ServerAddress::parse("a:27017").unwrap()));
}

#[tokio::test]
async fn ordered_write_stops_at_first_error() {
    let deployment = FakeDeployment::default();
    let cluster = new_cluster(&deployment);
    cluster.updater().update(replica_set()).unwrap();

    cluster
        .execute_write(insert(&[3], true, 100), ReplyVariant::Modern)
        .await
        .unwrap();
    let result = cluster
        .execute_write(insert(&[0, 1, 2, 3, 4, 5, 6], true, 2), ReplyVariant::Modern)
        .await
        .unwrap();

    assert_eq!(result.affected_count, 3);
    assert_eq!(result.failed_indexes(), vec![3]);
}

#[tokio::test]
async fn read_preference_routes_commands() {
    let deployment = FakeDeployment::default();
    let cluster = new_cluster(&deployment);
    cluster.updater().update(replica_set()).unwrap();

    let tagged = ReadPreference::Secondary {
        options: Some(
            ReadPreferenceOptions::builder()
                .tag_sets(vec![[("dc".to_string(), "ny".to_string())]
                    .into_iter()
                    .collect()])
                .build(),
        ),
    };
    let servers = cluster.select_servers(Some(&tagged)).unwrap();
    let hosts: Vec<_> = servers.iter().map(|server| server.address.host()).collect();
    assert_eq!(hosts, vec!["c"]);

    cluster
        .run_command("admin", doc! { "ping": 1 }, Some(&tagged))
        .await
        .unwrap();
    assert_eq!(
        deployment.requests.lock().unwrap().last(),
        Some(&ServerAddress::parse("c:27017").unwrap())
    );

    let error = cluster
        .run_command("admin", doc! { "bogus": 1 }, None)
        .await
        .unwrap_err();
    assert_eq!(error.code(), Some(59));
}

#[tokio::test]
async fn unreachable_server_is_reported_with_its_address() {
    let deployment = FakeDeployment::default();
    let cluster = new_cluster(&deployment);
    cluster.updater().update(replica_set()).unwrap();

    let primary = ServerAddress::parse("a:27017").unwrap();
    deployment.down.lock().unwrap().insert(primary.clone());

    let error = cluster
        .execute_write(insert(&[1], true, 100), ReplyVariant::Modern)
        .await
        .unwrap_err();
    assert!(error.is_network_error());
    assert_eq!(error.address(), Some(&primary));
}

#[tokio::test]
async fn conflicting_observation_keeps_previous_topology() {
    let deployment = FakeDeployment::default();
    let cluster = new_cluster(&deployment);
    let published = cluster.updater().update(replica_set()).unwrap();

    let mut observed = replica_set();
    observed.push(
        ServerDescription::builder()
            .address(ServerAddress::parse("e:27017").unwrap())
            .server_type(ServerType::Mongos)
            .build(),
    );
    let error = cluster.updater().update(observed).unwrap_err();

    assert!(error.is_topology_conflict());
    assert_eq!(cluster.description(), published);
    assert!(cluster.select_server(None).is_ok());
}

struct StaticHeartbeat(Vec<ServerDescription>);

impl HeartbeatSource for StaticHeartbeat {
    async fn check(&self) -> Result<Vec<ServerDescription>> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn monitor_feeds_selection() {
    let deployment = FakeDeployment::default();
    let cluster = new_cluster(&deployment);
    assert!(cluster.select_server(None).unwrap_err().is_server_selection_error());

    let mut watcher = cluster.watch();
    let monitor = cluster.monitor(StaticHeartbeat(replica_set()));
    let shutdown = monitor.shutdown_token();
    let handle = monitor.start();

    assert!(watcher.wait_for_update(Duration::from_secs(5)).await);
    let primary = cluster.select_server(None).unwrap();
    assert_eq!(primary.address.host(), "a");

    shutdown.cancel();
    handle.await.unwrap();
}
