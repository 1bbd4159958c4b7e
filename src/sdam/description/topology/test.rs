use pretty_assertions::assert_eq;

use crate::{
    options::ServerAddress,
    sdam::{ServerDescription, ServerType, TopologyDescription, TopologyType},
};

pub(crate) fn server(address: &str, server_type: ServerType) -> ServerDescription {
    ServerDescription::builder()
        .address(ServerAddress::parse(address).unwrap())
        .server_type(server_type)
        .build()
}

pub(crate) fn member(address: &str, server_type: ServerType, set_name: &str) -> ServerDescription {
    ServerDescription::builder()
        .address(ServerAddress::parse(address).unwrap())
        .server_type(server_type)
        .set_name(set_name)
        .build()
}

fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut result = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let item = rest.remove(i);
        for mut permutation in permutations(&rest) {
            permutation.insert(0, item.clone());
            result.push(permutation);
        }
    }
    result
}

fn addresses(description: &TopologyDescription) -> Vec<String> {
    let mut addresses: Vec<String> = description
        .servers()
        .map(|sd| sd.address.to_string())
        .collect();
    addresses.sort();
    addresses
}

#[test]
fn single_standalone_is_single() {
    let description =
        TopologyDescription::classify(vec![server("a:27017", ServerType::Standalone)], None)
            .unwrap();
    assert_eq!(description.topology_type(), &TopologyType::Single);
    assert_eq!(addresses(&description), vec!["a:27017"]);
}

#[test]
fn replica_set_members_share_a_name() {
    let description = TopologyDescription::classify(
        vec![
            member("a:27017", ServerType::RsPrimary, "rs0"),
            member("b:27017", ServerType::RsSecondary, "rs0"),
            member("c:27017", ServerType::RsArbiter, "rs0"),
            member("d:27017", ServerType::RsGhost, ""),
            server("e:27017", ServerType::Unknown),
        ],
        None,
    )
    .unwrap();

    assert_eq!(
        description.topology_type(),
        &TopologyType::ReplicaSet {
            set_name: "rs0".to_string()
        }
    );
    assert_eq!(description.topology_type().set_name(), Some("rs0"));
    assert_eq!(addresses(&description), vec!["a:27017", "b:27017"]);
}

#[test]
fn non_matching_set_names_conflict() {
    let error = TopologyDescription::classify(
        vec![
            member("a:27017", ServerType::RsPrimary, "rs0"),
            member("b:27017", ServerType::RsSecondary, "rs1"),
        ],
        None,
    )
    .unwrap_err();
    assert!(error.is_topology_conflict());
    assert!(error.to_string().contains("non-matching replica set names"));
}

#[test]
fn expected_set_name_is_enforced() {
    let error = TopologyDescription::classify(
        vec![member("a:27017", ServerType::RsPrimary, "rs0")],
        Some("rs1"),
    )
    .unwrap_err();
    assert!(error.is_topology_conflict());

    let description = TopologyDescription::classify(
        vec![member("a:27017", ServerType::RsSecondary, "rs1")],
        Some("rs1"),
    )
    .unwrap();
    assert_eq!(description.topology_type().set_name(), Some("rs1"));
}

#[test]
fn unknown_servers_are_skipped() {
    let description = TopologyDescription::classify(
        vec![
            server("a:27017", ServerType::Unknown),
            server("b:27017", ServerType::Standalone),
        ],
        None,
    )
    .unwrap();
    assert_eq!(description.topology_type(), &TopologyType::Single);
    assert_eq!(addresses(&description), vec!["b:27017"]);

    let description =
        TopologyDescription::classify(vec![server("a:27017", ServerType::Unknown)], None).unwrap();
    assert_eq!(description.topology_type(), &TopologyType::Unknown);
    assert_eq!(description.servers().count(), 0);

    let description = TopologyDescription::classify(Vec::new(), None).unwrap();
    assert_eq!(description.topology_type(), &TopologyType::Unknown);
}

#[test]
fn routers_are_sharded() {
    let description = TopologyDescription::classify(
        vec![
            server("a:27017", ServerType::Mongos),
            server("b:27017", ServerType::Mongos),
        ],
        None,
    )
    .unwrap();
    assert_eq!(description.topology_type(), &TopologyType::Sharded);
    assert_eq!(addresses(&description), vec!["a:27017", "b:27017"]);
}

#[test]
fn standalone_mixed_with_members_conflicts_in_every_order() {
    let servers = vec![
        server("a:27017", ServerType::Standalone),
        member("b:27017", ServerType::RsPrimary, "rs0"),
        member("c:27017", ServerType::RsSecondary, "rs0"),
    ];

    for permutation in permutations(&servers) {
        let error = TopologyDescription::classify(permutation.clone(), None).unwrap_err();
        assert!(
            error.is_topology_conflict(),
            "expected conflict for {permutation:?}"
        );
        assert!(error.to_string().contains("standalone server mixed"));
    }
}

#[test]
fn router_mixed_with_members_conflicts_in_every_order() {
    let servers = vec![
        server("a:27017", ServerType::Mongos),
        member("b:27017", ServerType::RsSecondary, "rs0"),
        member("c:27017", ServerType::RsArbiter, "rs0"),
    ];

    for permutation in permutations(&servers) {
        let error = TopologyDescription::classify(permutation, None).unwrap_err();
        assert!(error.is_topology_conflict());
        assert!(error.to_string().contains("router server mixed"));
    }
}

#[test]
fn standalone_mixed_with_router_conflicts_in_every_order() {
    let servers = vec![
        server("a:27017", ServerType::Standalone),
        server("b:27017", ServerType::Mongos),
    ];

    for permutation in permutations(&servers) {
        assert!(TopologyDescription::classify(permutation, None)
            .unwrap_err()
            .is_topology_conflict());
    }
}

#[test]
fn diff_reports_changes() {
    let previous = TopologyDescription::classify(
        vec![
            member("a:27017", ServerType::RsPrimary, "rs0"),
            member("b:27017", ServerType::RsSecondary, "rs0"),
        ],
        None,
    )
    .unwrap();
    let next = TopologyDescription::classify(
        vec![
            member("a:27017", ServerType::RsSecondary, "rs0"),
            member("c:27017", ServerType::RsPrimary, "rs0"),
        ],
        None,
    )
    .unwrap();

    let diff = previous.diff(&next);
    assert_eq!(diff.type_changed, None);
    assert_eq!(
        diff.added.iter().map(|a| a.to_string()).collect::<Vec<_>>(),
        vec!["c:27017"]
    );
    assert_eq!(
        diff.removed.iter().map(|a| a.to_string()).collect::<Vec<_>>(),
        vec!["b:27017"]
    );
    assert_eq!(
        diff.changed.iter().map(|a| a.to_string()).collect::<Vec<_>>(),
        vec!["a:27017"]
    );
    assert!(!diff.is_empty());
    assert!(next.diff(&next).is_empty());
}

#[test]
fn display_lists_servers_in_address_order() {
    let description = TopologyDescription::classify(
        vec![
            member("b:27017", ServerType::RsSecondary, "rs0"),
            member("a:27017", ServerType::RsPrimary, "rs0"),
        ],
        None,
    )
    .unwrap();
    assert_eq!(
        description.to_string(),
        "{ Type: ReplicaSet (rs0), Servers: [ { Address: a:27017, Type: RsPrimary, Set Name: rs0 \
         }, { Address: b:27017, Type: RsSecondary, Set Name: rs0 } ] }"
    );
}
