use std::sync::Arc;
use std::time::Duration;

use driftline_core::store::InMemoryStateStore;
use driftline_core::{
    FileSystemMonitor, ListingConfig, MonitorConfig, MonitorPhase, MonitorTicker,
    NotifyReconfigurationRequester,
};

#[path = "support/mod.rs"]
mod support;

use support::{inbox, init_tracing};

#[tokio::test]
async fn ticker_signals_host_and_closes_monitor_on_shutdown() {
    init_tracing();
    let fs = inbox(&[("a.csv", 1), ("b.csv", 2)]);
    let config = MonitorConfig {
        scan_interval_ms: 20,
        task_assignment_wait_ms: 2_000,
        listing: ListingConfig {
            root: "/inbox".into(),
            ..ListingConfig::default()
        },
        ..MonitorConfig::default()
    };
    let period = config.scan_interval();
    let monitor = FileSystemMonitor::from_config(config, fs, Arc::new(InMemoryStateStore::new()))
        .await
        .unwrap();
    let host = Arc::new(NotifyReconfigurationRequester::new());
    let ticker = MonitorTicker::spawn(monitor.clone(), host.clone(), period);

    assert!(monitor.partition_files_and_get(2, 10).await.is_empty());
    tokio::time::timeout(Duration::from_secs(5), host.requested())
        .await
        .expect("host should be asked to reconfigure tasks");
    let groups = monitor.partition_files_and_get(2, 10).await;
    assert_eq!(groups.iter().map(Vec::len).sum::<usize>(), 2);

    ticker.shutdown().await;
    assert_eq!(monitor.phase(), MonitorPhase::Stopped);
}
