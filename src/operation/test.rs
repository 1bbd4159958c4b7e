use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Bson, Document},
    operation::{
        BatchIndexMap,
        Command,
        ReplyFieldNames,
        ReplyVariant,
        Request,
        WriteBatch,
        WriteKind,
        WriteOperation,
    },
    options::{Acknowledgment, WriteConcern},
};

fn documents(count: usize) -> Vec<Document> {
    (0..count).map(|i| doc! { "_id": i as i32 }).collect()
}

#[test]
fn command_name_is_first_key() {
    let command = Command::new("admin", doc! { "ping": 1, "comment": "hi" }).unwrap();
    assert_eq!(command.name(), "ping");
    assert_eq!(command.target_db(), "admin");
    assert_eq!(
        command.to_document(),
        doc! { "ping": 1, "comment": "hi", "$db": "admin" }
    );

    assert!(Command::new("admin", Document::new()).is_err());
    assert!(Command::new("", doc! { "ping": 1 }).is_err());
}

#[test]
fn batches_are_consecutive_chunks() {
    let operation = WriteOperation::builder()
        .target_db("db")
        .collection("coll")
        .kind(WriteKind::Insert)
        .documents(documents(5))
        .max_batch_size(3)
        .build();

    let batches = operation.into_batches().unwrap();

    let maps: Vec<_> = batches
        .iter()
        .map(|batch| batch.index_map().as_slice().to_vec())
        .collect();
    assert_eq!(maps, vec![vec![0, 1, 2], vec![3, 4]]);

    let first = batches[0].command();
    assert_eq!(first.name(), "insert");
    assert_eq!(first.target_db(), "db");
    assert_eq!(first.body().get_str("insert").unwrap(), "coll");
    assert_eq!(first.body().get_array("documents").unwrap().len(), 3);
    assert!(first.body().get_bool("ordered").unwrap());
    assert!(first.body().get("writeConcern").is_none());

    let second = batches[1].command().body().get_array("documents").unwrap();
    assert_eq!(second[0], Bson::Document(doc! { "_id": 3 }));
}

#[test]
fn batches_carry_write_concern_and_ordering() {
    let operation = WriteOperation::builder()
        .target_db("db")
        .collection("coll")
        .kind(WriteKind::Delete)
        .documents(vec![doc! { "q": {}, "limit": 0 }])
        .ordered(false)
        .write_concern(WriteConcern::builder().journal(true).build())
        .build();

    let batches = operation.into_batches().unwrap();
    assert_eq!(batches.len(), 1);
    assert!(!batches[0].ordered);

    let body = batches[0].command().body();
    assert_eq!(body.get_array("deletes").unwrap().len(), 1);
    assert_eq!(body.get_document("writeConcern").unwrap(), &doc! { "j": true });
}

#[test]
fn invalid_writes_are_rejected() {
    let empty = WriteOperation::builder()
        .target_db("db")
        .collection("coll")
        .kind(WriteKind::Update)
        .documents(Vec::new())
        .build();
    assert!(empty.into_batches().is_err());

    let zero_batch = WriteOperation::builder()
        .target_db("db")
        .collection("coll")
        .kind(WriteKind::Insert)
        .documents(documents(1))
        .max_batch_size(0)
        .build();
    assert!(zero_batch.into_batches().is_err());

    let unacknowledged_journal = WriteOperation::builder()
        .target_db("db")
        .collection("coll")
        .kind(WriteKind::Insert)
        .documents(documents(1))
        .write_concern(
            WriteConcern::builder()
                .w(Acknowledgment::Nodes(0))
                .journal(true)
                .build(),
        )
        .build();
    assert!(unacknowledged_journal.into_batches().is_err());
}

#[test]
fn acknowledgment_follows_write_concern() {
    let build = |write_concern: Option<WriteConcern>| {
        let mut operation = WriteOperation::builder()
            .target_db("db")
            .collection("coll")
            .kind(WriteKind::Insert)
            .documents(documents(1))
            .build();
        operation.write_concern = write_concern;
        operation
    };

    assert!(build(None).is_acknowledged());
    assert!(build(Some(WriteConcern::majority())).is_acknowledged());
    assert!(!build(Some(WriteConcern::unacknowledged())).is_acknowledged());
}

#[test]
fn write_batch_ordering_defaults_to_true() {
    let command = Command::new("db", doc! { "insert": "coll", "documents": [] }).unwrap();
    let batch = WriteBatch::new(command, BatchIndexMap::default());
    assert!(batch.ordered);

    let command = Command::new(
        "db",
        doc! { "insert": "coll", "documents": [], "ordered": false },
    )
    .unwrap();
    let request = Request::from(WriteBatch::new(command, BatchIndexMap::range(0, 0)));
    assert!(!request.validates_reply());
    match request {
        Request::WriteBatch(batch) => assert!(!batch.ordered),
        other => panic!("expected a write batch, got {other:?}"),
    }
}

#[test]
fn failure_detection_per_variant() {
    let fields = ReplyFieldNames::default();

    assert!(!ReplyVariant::Modern.reports_failure(&doc! { "ok": 1, "n": 1 }, &fields));
    assert!(ReplyVariant::Modern.reports_failure(&doc! { "ok": 0 }, &fields));
    assert!(ReplyVariant::Modern.reports_failure(
        &doc! { "ok": 1, "writeErrors": [{ "index": 0 }] },
        &fields
    ));

    assert!(!ReplyVariant::Legacy.reports_failure(&doc! { "n": 1, "err": null }, &fields));
    assert!(!ReplyVariant::Legacy.reports_failure(&doc! { "n": 1, "err": false }, &fields));
    assert!(!ReplyVariant::Legacy.reports_failure(
        &doc! { "n": 1, "err": false, "errmsg": false },
        &fields
    ));
    assert!(ReplyVariant::Legacy.reports_failure(&doc! { "err": "x" }, &fields));
    assert!(ReplyVariant::Legacy.reports_failure(&doc! { "errmsg": "x" }, &fields));
}

#[test]
fn reply_field_names_deserialize_with_defaults() {
    let fields: ReplyFieldNames =
        serde_json::from_value(serde_json::json!({ "count": "nRemoved" })).unwrap();
    assert_eq!(fields.count, "nRemoved");
    assert_eq!(fields.write_errors, "writeErrors");
    assert_eq!(fields.ok, "ok");
}
