use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap as HashMap;
use seshat::config::DiscoveryConfig;
use seshat::discovery::{InMemoryDiscovery, ServiceDiscovery};
use seshat::errors::SeshatError;

fn short_ttl() -> DiscoveryConfig {
    DiscoveryConfig {
        ttl: Duration::from_millis(50),
        cleanup: Duration::from_millis(10),
        ..DiscoveryConfig::default()
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_lookup_rotates_over_instances() {
    let discovery = InMemoryDiscovery::default();
    discovery
        .register("10.0.0.1:80", &names(&["users"]), HashMap::new())
        .await
        .unwrap();
    discovery
        .register("10.0.0.2:80", &names(&["users", "orders"]), HashMap::new())
        .await
        .unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(discovery.get_service("users").await.unwrap());
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen, names(&["10.0.0.1:80", "10.0.0.2:80"]));
    assert_eq!(discovery.get_service("orders").await.unwrap(), "10.0.0.2:80");

    discovery.deregister("10.0.0.2:80").await.unwrap();
    assert!(matches!(
        discovery.get_service("orders").await,
        Err(SeshatError::Network(_))
    ));
    assert_eq!(discovery.services().len(), 1);
}

#[tokio::test]
async fn test_instances_expire_without_heartbeat() {
    let discovery = InMemoryDiscovery::new(short_ttl());
    let mut metadata = HashMap::new();
    metadata.insert("zone".to_string(), "a".to_string());
    discovery
        .register("10.0.0.1:80", &names(&["users"]), metadata)
        .await
        .unwrap();
    discovery
        .register("10.0.0.2:80", &names(&["users"]), HashMap::new())
        .await
        .unwrap();
    assert_eq!(
        discovery.services()[0].metadata.get("zone").map(String::as_str),
        Some("a")
    );

    tokio::time::sleep(Duration::from_millis(30)).await;
    discovery.heartbeat("10.0.0.2:80").unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Only the instance that kept beating is handed out.
    for _ in 0..3 {
        assert_eq!(discovery.get_service("users").await.unwrap(), "10.0.0.2:80");
    }
    assert_eq!(discovery.cleanup(), 1);
    assert!(discovery.heartbeat("10.0.0.1:80").is_err());
}

#[tokio::test]
async fn test_background_cleanup() {
    let discovery = Arc::new(InMemoryDiscovery::new(short_ttl()));
    discovery
        .register("10.0.0.1:80", &names(&["users"]), HashMap::new())
        .await
        .unwrap();
    let handle = InMemoryDiscovery::spawn_cleanup(&discovery);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(discovery.services().is_empty());

    drop(discovery);
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}

#[test]
fn test_config_from_json_uses_milliseconds() {
    let config = DiscoveryConfig::from_json(r#"{"ttl": 1500}"#).unwrap();
    assert_eq!(config.ttl, Duration::from_millis(1500));
    assert_eq!(config.heartbeat, DiscoveryConfig::default().heartbeat);
}
