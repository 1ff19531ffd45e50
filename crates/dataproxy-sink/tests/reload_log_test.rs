//! Checks the human-readable reload status lines.

use dataproxy_sink::{ClusterConfig, MemoryConfigSource, MemoryProducerFactory, ZoneProducerPool};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn clusters(names: &[&str]) -> Vec<ClusterConfig> {
    names
        .iter()
        .map(|name| ClusterConfig::new(*name, format!("{}:9092", name)))
        .collect()
}

#[tokio::test]
async fn test_reload_logs_summary_line() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let source = Arc::new(MemoryConfigSource::with_clusters(clusters(&["A", "B"])));
    let pool = ZoneProducerPool::builder()
        .name("zone-log")
        .config_source(source.clone())
        .producer_factory(Arc::new(MemoryProducerFactory::new()))
        .build()
        .unwrap();

    pool.start().await;
    let first = logs.contents();
    assert!(first.contains("Reload zone-log's cluster info"));
    assert!(first.contains("created [A, B]"));
    // first change also flips the backend-ready status
    assert!(first.contains("and updated sink status"));

    source.set_clusters(clusters(&["B", "C"])).await;
    pool.reload().await;
    let all = logs.contents();
    let second = &all[first.len()..];
    assert!(second.contains("current clusters [B, C]"));
    assert!(second.contains("removed [A]"));
    assert!(second.contains("created [C]"));
    assert!(!second.contains("and updated sink status"));

    // nothing changed, nothing logged at info
    pool.reload().await;
    let after = logs.contents();
    assert_eq!(after[all.len()..].matches("cluster info").count(), 0);
}

#[tokio::test]
async fn test_failed_creation_is_logged_without_other_changes() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let factory = Arc::new(MemoryProducerFactory::new());
    factory.fail_start_for("A");
    let pool = ZoneProducerPool::builder()
        .name("zone-fail")
        .config_source(Arc::new(MemoryConfigSource::with_clusters(clusters(&["A"]))))
        .producer_factory(factory)
        .build()
        .unwrap();

    let summary = pool.reload().await.unwrap();
    assert!(!summary.changed());
    assert_eq!(summary.failed, vec!["A".to_string()]);

    let out = logs.contents();
    let line = out
        .lines()
        .find(|line| line.contains("Reload zone-fail's cluster info"))
        .expect("summary line missing");
    assert!(line.contains("WARN"));
    assert!(line.contains("failed [A]"));
    assert!(!line.contains("and updated sink status"));
}
