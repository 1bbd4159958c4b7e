use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::{
    bson::doc,
    options::{Acknowledgment, WriteConcern},
};

#[test]
fn write_concern_is_acknowledged() {
    let w_1 = WriteConcern::builder()
        .w(Acknowledgment::Nodes(1))
        .journal(false)
        .build();
    assert!(w_1.is_acknowledged());

    let w_majority = WriteConcern::builder()
        .w(Acknowledgment::Majority)
        .journal(false)
        .build();
    assert!(w_majority.is_acknowledged());

    let w_0 = WriteConcern::builder()
        .w(Acknowledgment::Nodes(0))
        .journal(false)
        .build();
    assert!(!w_0.is_acknowledged());

    assert!(!WriteConcern::unacknowledged().is_acknowledged());

    let empty = WriteConcern::builder().build();
    assert!(empty.is_acknowledged());

    let journaled = WriteConcern::builder().journal(true).build();
    assert!(journaled.is_acknowledged());
}

#[test]
fn unacknowledged_journaled_write_concern_is_invalid() {
    let invalid = WriteConcern::builder()
        .w(Acknowledgment::Nodes(0))
        .journal(true)
        .build();
    let error = invalid.validate().unwrap_err();
    assert!(error.to_string().contains("w=0 and j=true"));

    assert!(WriteConcern::majority().validate().is_ok());
}

#[test]
fn write_concern_document() {
    assert_eq!(WriteConcern::default().to_document().unwrap(), None);

    let write_concern = WriteConcern::builder()
        .w(Acknowledgment::Majority)
        .w_timeout(Duration::from_millis(100))
        .journal(true)
        .build();
    assert_eq!(
        write_concern.to_document().unwrap(),
        Some(doc! { "w": "majority", "wtimeout": 100, "j": true })
    );

    assert_eq!(
        WriteConcern::nodes(2).to_document().unwrap(),
        Some(doc! { "w": 2 })
    );
}

#[test]
fn acknowledgment_from_string() {
    assert_eq!(Acknowledgment::from("majority"), Acknowledgment::Majority);
    assert_eq!(
        Acknowledgment::from("dataCenters".to_string()),
        Acknowledgment::Custom("dataCenters".to_string())
    );
}
