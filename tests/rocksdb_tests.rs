#![cfg(feature = "rocksdb")]

use std::sync::Arc;

use seshat::connector::{Connector, ConnectorConfig, ConnectorRegistry, RocksConnector};
use seshat::errors::SeshatError;
use seshat::item::{TxnState, VersionedItem};
use seshat::timesource::CounterTimeSource;
use seshat::Seshat;

#[tokio::test]
async fn test_conditional_operations() {
    let dir = tempfile::tempdir().unwrap();
    let conn = RocksConnector::open(dir.path()).unwrap();

    let mut item = VersionedItem::committed("k", b"v1".to_vec(), 10);
    item.txn_state = TxnState::Prepared;
    let v = conn.conditional_update("k", item, true).await.unwrap();
    assert_eq!(v, 1);
    assert_eq!(conn.conditional_commit("k", v, 20).await.unwrap(), 2);

    let stored = conn.get_item("k").await.unwrap();
    assert_eq!(stored.txn_state, TxnState::Committed);
    assert_eq!(stored.t_valid, 20);

    // A second create against an existing key is a stale write.
    let again = conn
        .conditional_update("k", VersionedItem::committed("k", vec![], 1), true)
        .await;
    assert!(matches!(again, Err(SeshatError::VersionMismatch { .. })));

    conn.atomic_create("tsr", "COMMITTED").await.unwrap();
    match conn.atomic_create("tsr", "ABORTED").await {
        Err(SeshatError::KeyExists { existing, .. }) => assert_eq!(existing, "COMMITTED"),
        other => panic!("expected KeyExists, got {other:?}"),
    }
    // Names and items live in separate key spaces.
    assert!(conn.get("k").await.is_err());
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let conn = RocksConnector::open(dir.path()).unwrap();
        conn.put_item("k", VersionedItem::committed("k", b"kept".to_vec(), 3))
            .await
            .unwrap();
        conn.put("name", "value").await.unwrap();
    }
    let conn = RocksConnector::open(dir.path()).unwrap();
    assert_eq!(conn.get_item("k").await.unwrap().value, b"kept");
    assert_eq!(conn.get("name").await.unwrap(), "value");
}

#[tokio::test]
async fn test_transaction_through_registry() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ConnectorRegistry::with_defaults();
    let caps = registry.capabilities("rocksdb").unwrap();
    assert!(caps.persistent);
    assert!(matches!(
        registry.create(&ConnectorConfig::new("rocksdb")),
        Err(SeshatError::Config(_))
    ));

    let conn: Arc<dyn Connector> = registry
        .create(&ConnectorConfig::new("rocksdb").with_path(dir.path()))
        .unwrap();
    let seshat = Seshat::builder()
        .local_datastore("disk", conn.clone())
        .global_datastore("disk")
        .time_source(Arc::new(CounterTimeSource::new()))
        .build()
        .unwrap();

    let mut txn = seshat.begin().await.unwrap();
    txn.write("disk", "answer", &42_u32).unwrap();
    txn.commit().await.unwrap();

    let mut check = seshat.begin().await.unwrap();
    assert_eq!(check.read::<u32>("disk", "answer").await.unwrap(), 42);
    assert_eq!(
        conn.get_item("answer").await.unwrap().txn_state,
        TxnState::Committed
    );
}
