use std::time::Duration;

use sql_workpool::prelude::*;

#[test]
fn connect_info_deserializes_from_application_config() {
    let info: ConnectInfo = serde_json::from_str(
        r#"{
            "user": "app",
            "password": "secret",
            "database": "game.db",
            "host": "127.0.0.1",
            "port": 3306
        }"#,
    )
    .expect("parse");
    assert_eq!(info.user, "app");
    assert_eq!(info.database, "game.db");
    assert_eq!(info.port, 3306);
}

#[test]
fn connect_info_defaults_everything_but_the_database() {
    let info: ConnectInfo = serde_json::from_str(r#"{"database": ":memory:"}"#).expect("parse");
    assert_eq!(info, ConnectInfo::in_memory());
    assert!(info.host.is_empty());
    assert_eq!(info.port, 0);
}

#[test]
fn reconnect_policy_defaults_match_the_supervised_bounds() {
    let policy = ReconnectPolicy::default();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.delay, Duration::from_secs(3));
}

#[test]
fn reconnect_policy_roundtrips_through_serde() {
    let policy = ReconnectPolicy {
        max_attempts: 2,
        delay: Duration::from_millis(250),
    };
    let json = serde_json::to_string(&policy).expect("serialize");
    let back: ReconnectPolicy = serde_json::from_str(&json).expect("parse");
    assert_eq!(back, policy);
}

#[test]
fn connection_kinds_intersect_through_both() {
    use ConnectionKind::{Async, Both, Sync};
    assert!(Both.intersects(Sync));
    assert!(Both.intersects(Async));
    assert!(Sync.intersects(Both));
    assert!(Async.intersects(Both));
    assert!(Sync.intersects(Sync));
    assert!(Async.intersects(Async));
    assert!(!Sync.intersects(Async));
    assert!(!Async.intersects(Sync));
}

#[test]
fn catalog_ids_follow_registration_order() {
    let catalog = StatementCatalog::builder()
        .statement("select 1", &[], ConnectionKind::Sync)
        .statement("select ?", &[SqlArgType::Int64], ConnectionKind::Async)
        .build();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.get(0).expect("first").kind, ConnectionKind::Sync);
    assert_eq!(catalog.get(1).expect("second").args.len(), 1);
    assert!(catalog.get(2).is_none());
}
