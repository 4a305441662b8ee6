// SnapshotWriter: command ordering, file layout, no flush without a durable write

mod common;

use std::collections::HashMap;

use chrono::NaiveDate;
use common::{FakeDaemon, Reply};
use map646_stat::StatError;
use map646_stat::bucket::TimeBucket;
use map646_stat::channel::ChannelClient;
use map646_stat::models::{CounterValue, Snapshot};
use map646_stat::snapshot_writer::SnapshotWriter;
use tempfile::TempDir;

const SHOW: &str = r#"{"v4": {"192.0.2.1": {"tcp_in": {"num": 3}}}, "v6": null}"#;

fn bucket_0907() -> TimeBucket {
    let ts = NaiveDate::from_ymd_opt(2023, 1, 5)
        .unwrap()
        .and_hms_opt(9, 7, 0)
        .unwrap();
    TimeBucket::from_datetime(&ts)
}

fn healthy_daemon() -> FakeDaemon {
    FakeDaemon::spawn(HashMap::from([
        ("time", Reply::text("2023-01-05 09:00:00\n")),
        ("show", Reply::text(SHOW)),
        ("flush", Reply::text("")),
    ]))
}

#[tokio::test]
async fn collect_writes_record_then_flushes() {
    let daemon = healthy_daemon();
    let base = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(ChannelClient::new(daemon.path()), base.path());

    let path = writer.collect(bucket_0907()).await.unwrap();

    assert_eq!(
        path,
        base.path().join("2023/01/05/09/map646_202301050907.stat")
    );
    assert_eq!(daemon.commands(), vec!["time", "show", "flush"]);

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, format!("#lastflush: 2023-01-05 09:00:00\n{SHOW}\n"));

    let snapshot = Snapshot::load(&path, "map646_").unwrap();
    assert_eq!(snapshot.last_flush, vec!["2023-01-05 09:00:00"]);
    assert_eq!(snapshot.stamp.unwrap().as_str(), "202301050907");
    assert_eq!(
        snapshot.tree.get_path(&["v4", "192.0.2.1", "tcp_in", "num"]),
        Some(&CounterValue::Count(3))
    );
}

#[tokio::test]
async fn same_minute_twice_appends_a_second_record() {
    let daemon = healthy_daemon();
    let base = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(ChannelClient::new(daemon.path()), base.path());

    writer.collect(bucket_0907()).await.unwrap();
    let path = writer.collect(bucket_0907()).await.unwrap();

    let snapshot = Snapshot::load(&path, "map646_").unwrap();
    assert_eq!(snapshot.last_flush.len(), 2);
    assert_eq!(
        snapshot.tree.get_path(&["v4", "192.0.2.1", "tcp_in", "num"]),
        Some(&CounterValue::Count(6))
    );
}

#[tokio::test]
async fn show_failure_creates_no_file_and_sends_no_flush() {
    let daemon = FakeDaemon::spawn(HashMap::from([
        ("time", Reply::text("2023-01-05 09:00:00")),
        ("show", Reply::RawHeader("garbage".into(), Vec::new())),
    ]));
    let base = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(ChannelClient::new(daemon.path()), base.path());

    let err = writer.collect(bucket_0907()).await.unwrap_err();

    assert!(matches!(err, StatError::Protocol { .. }), "got {err:?}");
    assert!(!bucket_0907().file_path(base.path(), "map646_").exists());
    assert!(!daemon.commands().contains(&"flush".to_string()));
}

#[tokio::test]
async fn unreachable_daemon_aborts_before_writing() {
    let base = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(
        ChannelClient::new(base.path().join("no-daemon.sock")),
        base.path(),
    );

    let err = writer.collect(bucket_0907()).await.unwrap_err();

    assert!(matches!(err, StatError::Connection { .. }), "got {err:?}");
    assert!(!bucket_0907().file_path(base.path(), "map646_").exists());
}

#[tokio::test]
async fn unwritable_target_skips_flush() {
    let daemon = healthy_daemon();
    let base = TempDir::new().unwrap();
    // A directory where the snapshot file should go makes the open fail.
    let target = bucket_0907().file_path(base.path(), "map646_");
    std::fs::create_dir_all(&target).unwrap();
    let writer = SnapshotWriter::new(ChannelClient::new(daemon.path()), base.path());

    let err = writer.collect(bucket_0907()).await.unwrap_err();

    assert!(matches!(err, StatError::Storage { .. }), "got {err:?}");
    assert_eq!(daemon.commands(), vec!["time", "show"]);
}

#[tokio::test]
async fn custom_file_prefix_is_used() {
    let daemon = healthy_daemon();
    let base = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(ChannelClient::new(daemon.path()), base.path())
        .with_file_prefix("edge1_");

    let path = writer.collect(bucket_0907()).await.unwrap();

    assert!(path.ends_with("2023/01/05/09/edge1_202301050907.stat"));
}
