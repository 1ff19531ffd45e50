//! Integration tests for topic reconciliation.

use dataproxy_sink::{ClusterConfig, MemoryConfigSource, MemoryProducerFactory, ZoneProducerPool};
use std::collections::BTreeSet;
use std::sync::Arc;

fn clusters(names: &[&str]) -> Vec<ClusterConfig> {
    names
        .iter()
        .map(|name| ClusterConfig::new(*name, format!("{}:9092", name)))
        .collect()
}

fn topic_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

async fn setup(initial: &[&str]) -> (Arc<MemoryConfigSource>, Arc<MemoryProducerFactory>, ZoneProducerPool) {
    let source = Arc::new(MemoryConfigSource::with_clusters(clusters(initial)));
    let factory = Arc::new(MemoryProducerFactory::new());
    let pool = ZoneProducerPool::builder()
        .name("zone-topics")
        .config_source(source.clone())
        .producer_factory(factory.clone())
        .build()
        .unwrap();
    pool.start().await;
    (source, factory, pool)
}

#[tokio::test]
async fn test_topics_broadcast_to_active_producers() {
    let (source, factory, pool) = setup(&["A", "B"]).await;
    source.set_topics(["orders", "payments"]).await;

    assert!(pool.reconcile_topics().await.unwrap());
    for name in ["A", "B"] {
        let producer = factory.producer(name).unwrap();
        assert_eq!(
            producer.published_topics().await,
            topic_set(&["orders", "payments"])
        );
    }
}

#[tokio::test]
async fn test_unchanged_or_empty_topics_are_noop() {
    let (source, _factory, pool) = setup(&["A"]).await;
    assert!(!pool.reconcile_topics().await.unwrap());

    source.set_topics(["orders"]).await;
    assert!(pool.reconcile_topics().await.unwrap());
    assert!(!pool.reconcile_topics().await.unwrap());

    source.set_topics(Vec::<String>::new()).await;
    assert!(!pool.reconcile_topics().await.unwrap());
    assert_eq!(pool.topics().await, topic_set(&["orders"]));
}

#[tokio::test]
async fn test_topic_set_only_grows() {
    let (source, factory, pool) = setup(&["A"]).await;

    source.set_topics(["t1", "t2"]).await;
    pool.reload().await;
    source.set_topics(["t2", "t3"]).await;
    pool.reload().await;

    let expected = topic_set(&["t1", "t2", "t3"]);
    assert_eq!(pool.topics().await, expected);
    assert_eq!(
        factory.producer("A").unwrap().published_topics().await,
        expected
    );
}

#[tokio::test]
async fn test_new_producer_receives_accumulated_topics() {
    let (source, factory, pool) = setup(&["A"]).await;
    source.set_topics(["t1"]).await;
    pool.reload().await;
    source.set_topics(["t1", "t2"]).await;
    pool.reload().await;

    // B joins while upstream topics are unchanged, so no broadcast happens
    source.set_clusters(clusters(&["A", "B"])).await;
    let summary = pool.reconcile_clusters().await.unwrap();
    assert_eq!(summary.created, vec!["B".to_string()]);
    assert!(!pool.reconcile_topics().await.unwrap());

    assert_eq!(
        factory.producer("B").unwrap().published_topics().await,
        topic_set(&["t1", "t2"])
    );
}

#[tokio::test]
async fn test_retiring_producers_skip_broadcast() {
    let (source, factory, pool) = setup(&["A", "B"]).await;
    source.set_clusters(clusters(&["A"])).await;
    pool.reload().await;

    source.set_topics(["late-topic"]).await;
    assert!(pool.reconcile_topics().await.unwrap());

    assert!(factory
        .producer("A")
        .unwrap()
        .published_topics()
        .await
        .contains("late-topic"));
    assert!(factory
        .producer("B")
        .unwrap()
        .published_topics()
        .await
        .is_empty());
}
