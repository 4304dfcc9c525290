use super::*;
use crate::record::{Measure, Metrics};
use crate::store::{MemoryStore, SeriesSchema};
use crate::testing::{FakeTool, config, utc};
use crate::tool::QueryMode;
use std::path::PathBuf;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn touch(root: &Path, source: &str, name: &str) -> PathBuf {
    let stamp = crate::capture::parse_capture_name(name).expect("test file name");
    let dir = root
        .join("live")
        .join(source)
        .join(day_path(stamp.date()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, b"").unwrap();
    path
}

fn stamps(store: &MemoryStore, key: &SeriesKey) -> Vec<i64> {
    store.samples(key).iter().map(|(ts, _)| *ts).collect()
}

#[test]
fn missing_profile_root_aborts_before_any_source() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = Pipeline::new(
        config(&dir.path().join("nowhere"), &["gw1"], &[80]),
        FakeTool::uniform(),
        MemoryStore::new(),
    );

    let err = Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(2))
        .expect_err("profile root missing");
    assert!(matches!(err, ImportError::MissingProfileRoot(_)));
    assert!(err.is_fatal());
    assert_eq!(p.tool().call_count(), 0);
}

#[test]
fn scans_every_day_and_source_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    touch(root, "gw1", "nfcapd.202401010000");
    touch(root, "gw1", "nfcapd.202401010005");
    touch(root, "gw1", "nfcapd.202401030000");
    touch(root, "gw2", "nfcapd.202401010005");
    touch(root, "gw2", "nfcapd.202401030000");

    let mut p = Pipeline::new(
        config(root, &["gw1", "gw2"], &[80]),
        FakeTool::uniform(),
        MemoryStore::new(),
    );
    let report = Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(3))
        .expect("scan");

    assert_eq!(report.sources_processed, 2);
    assert_eq!(report.files_imported, 5);
    assert_eq!(report.failures, 0);
    assert_eq!(report.progress.total(), 6);
    assert_eq!(report.progress.done(), 6, "missing day 2 still advances progress");

    let store = p.store();
    assert_eq!(
        stamps(store, &SeriesKey::source("gw1")),
        vec![utc(2024, 1, 1, 0, 0), utc(2024, 1, 1, 0, 5), utc(2024, 1, 3, 0, 0)]
    );
    assert_eq!(
        stamps(store, &SeriesKey::source("gw2")),
        vec![utc(2024, 1, 1, 0, 5), utc(2024, 1, 3, 0, 0)]
    );
    assert_eq!(
        stamps(store, &SeriesKey::combined(80)),
        vec![utc(2024, 1, 1, 0, 0), utc(2024, 1, 1, 0, 5), utc(2024, 1, 3, 0, 0)],
        "combined ports cover every timestamp any source reported, oldest first"
    );
    assert_eq!(report.port_samples, 3);
    assert!(store.samples(&SeriesKey::new("gw1", 80)).is_empty());

    let combined_calls: Vec<_> = p
        .tool()
        .calls()
        .into_iter()
        .filter(|c| c.mode == QueryMode::DstPort(80))
        .collect();
    assert_eq!(combined_calls.len(), 3);
    assert!(combined_calls.iter().all(|c| c.sources == vec!["gw1", "gw2"]));
}

#[test]
fn resumes_from_checkpoint_day_and_skips_imported_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    touch(root, "gw1", "nfcapd.202401010000");
    touch(root, "gw1", "nfcapd.202401020000");
    touch(root, "gw1", "nfcapd.202401020005");

    let mut store = MemoryStore::new();
    let key = SeriesKey::source("gw1");
    store.create(&key, &SeriesSchema::with_step(300)).unwrap();
    store.append(&key, utc(2024, 1, 2, 0, 0), &Metrics::default()).unwrap();

    let mut p = Pipeline::new(config(root, &["gw1"], &[]), FakeTool::uniform(), store);
    let report = Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(3))
        .expect("scan");

    assert_eq!(report.files_imported, 1);
    assert_eq!(report.files_skipped, 1, "day 1 is never visited");
    assert_eq!(report.progress.total(), 2);
    assert_eq!(report.progress.done(), 2);
    assert_eq!(p.tool().call_count(), 1);
    assert_eq!(
        stamps(p.store(), &key),
        vec![utc(2024, 1, 2, 0, 0), utc(2024, 1, 2, 0, 5)]
    );
}

#[test]
fn rescanning_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    touch(root, "gw1", "nfcapd.202401010000");
    touch(root, "gw1", "nfcapd.202401010005");

    let mut p = Pipeline::new(config(root, &["gw1"], &[80]), FakeTool::uniform(), MemoryStore::new());
    Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(1))
        .unwrap();
    let calls_after_first = p.tool().call_count();

    let report = Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(1))
        .expect("second scan");
    assert_eq!(report.files_imported, 0);
    assert_eq!(report.failures, 0);
    assert_eq!(p.tool().call_count(), calls_after_first);
    assert_eq!(p.store().samples(&SeriesKey::source("gw1")).len(), 2);
    assert_eq!(p.store().samples(&SeriesKey::combined(80)).len(), 2);
}

#[test]
fn skips_directories_and_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let real = touch(root, "gw1", "nfcapd.202401010000");
    let day_dir = real.parent().unwrap();
    fs::create_dir(day_dir.join("nfcapd.202401010010")).unwrap();
    fs::write(day_dir.join("nfcapd.current.1234"), b"").unwrap();
    fs::write(day_dir.join(".nfstat"), b"").unwrap();

    let mut p = Pipeline::new(config(root, &["gw1"], &[]), FakeTool::uniform(), MemoryStore::new());
    let report = Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(1))
        .expect("scan");

    assert_eq!(report.files_imported, 1);
    assert_eq!(report.files_skipped, 2);
    assert_eq!(report.failures, 0);
}

#[test]
fn tool_failure_skips_only_that_file() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    touch(root, "gw1", "nfcapd.202401010000");
    touch(root, "gw1", "nfcapd.202401010005");
    touch(root, "gw1", "nfcapd.202401010010");

    let tool = FakeTool::new(|query| {
        if query.capture.ends_with("nfcapd.202401010005") {
            return Err(ImportError::tool("nfdump", "corrupt file"));
        }
        Ok(crate::testing::lines(&["cmd", "flows_tcp: 1"]))
    });
    let mut p = Pipeline::new(config(root, &["gw1"], &[]), tool, MemoryStore::new());
    let report = Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(1))
        .expect("scan continues");

    assert_eq!(report.files_imported, 2);
    assert_eq!(report.failures, 1);
    assert_eq!(
        stamps(p.store(), &SeriesKey::source("gw1")),
        vec![utc(2024, 1, 1, 0, 0), utc(2024, 1, 1, 0, 10)]
    );
}

#[test]
fn force_resets_store_and_reimports() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    touch(root, "gw1", "nfcapd.202401010000");

    let mut store = MemoryStore::new();
    let key = SeriesKey::source("gw1");
    store.create(&key, &SeriesSchema::with_step(60)).unwrap();
    store.append(&key, utc(2024, 1, 5, 0, 0), &Metrics::default()).unwrap();
    store.create(&SeriesKey::source("retired"), &SeriesSchema::with_step(60)).unwrap();

    let mut p = Pipeline::new(config(root, &["gw1"], &[]), FakeTool::uniform(), store);
    let report = Scanner::new(&mut p, ScanOptions { force: true })
        .run_until(day(1), day(1))
        .expect("forced scan");

    assert_eq!(report.files_imported, 1);
    assert_eq!(stamps(p.store(), &key), vec![utc(2024, 1, 1, 0, 0)]);
    assert_eq!(p.store().schema(&key).unwrap().step_seconds, 300);
    assert!(!p.store().exists(&SeriesKey::source("retired")).unwrap());
}

#[test]
fn schema_mismatch_aborts_without_writes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    touch(root, "gw1", "nfcapd.202401010000");

    let mut store = MemoryStore::new();
    store.create(&SeriesKey::source("gw1"), &SeriesSchema::with_step(60)).unwrap();

    let mut p = Pipeline::new(config(root, &["gw1"], &[]), FakeTool::uniform(), store);
    let err = Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(1))
        .expect_err("schema differs");
    assert!(matches!(err, ImportError::SchemaMismatch { .. }));
    assert_eq!(p.tool().call_count(), 0);
}

#[test]
fn per_source_ports_are_optional_and_independent() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    touch(root, "gw1", "nfcapd.202401010000");
    touch(root, "gw2", "nfcapd.202401010000");

    let mut cfg = config(root, &["gw1", "gw2"], &[80, 443]);
    cfg.import.process_ports = false;
    cfg.import.process_ports_by_source = true;
    let mut p = Pipeline::new(cfg, FakeTool::uniform(), MemoryStore::new());
    let report = Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(1))
        .expect("scan");

    assert_eq!(report.port_samples, 4);
    let store = p.store();
    for source in ["gw1", "gw2"] {
        for port in [80, 443] {
            let samples = store.samples(&SeriesKey::new(source, port));
            assert_eq!(samples.len(), 1, "{source}:{port}");
            assert_eq!(samples[0].1.total(Measure::Flows), port as u64);
        }
    }
    assert!(!store.exists(&SeriesKey::combined(80)).unwrap());
}

#[test]
fn combined_ports_do_not_depend_on_source_order() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    // the last configured source has no file for 00:05
    touch(root, "gw1", "nfcapd.202401010000");
    touch(root, "gw1", "nfcapd.202401010005");
    touch(root, "gw2", "nfcapd.202401010000");

    let mut p = Pipeline::new(
        config(root, &["gw1", "gw2"], &[80]),
        FakeTool::uniform(),
        MemoryStore::new(),
    );
    Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(1))
        .expect("scan");

    assert_eq!(
        stamps(p.store(), &SeriesKey::combined(80)),
        vec![utc(2024, 1, 1, 0, 0), utc(2024, 1, 1, 0, 5)]
    );
}

#[test]
fn no_sources_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("live")).unwrap();
    let mut p = Pipeline::new(config(dir.path(), &[], &[80]), FakeTool::uniform(), MemoryStore::new());

    let report = Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(3))
        .expect("empty scan");
    assert_eq!(report.sources_processed, 0);
    assert_eq!(report.progress.total(), 0);
    assert_eq!(report.progress.fraction(), 1.0);
}

/// Healthy tool except that summarizing `file` for `source` loses the store.
fn store_lost_at(source: &'static str, file: &'static str) -> FakeTool {
    let healthy = FakeTool::uniform();
    FakeTool::new(move |query| {
        if query.mode == QueryMode::Totals
            && query.sources == vec![source]
            && query.capture.ends_with(file)
        {
            return Err(ImportError::StoreUnreachable {
                path: PathBuf::from("/store"),
                source: std::io::Error::other("disk went away"),
            });
        }
        healthy.run(query)
    })
}

#[test]
fn aborted_scan_keeps_combined_ports_written_so_far() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for name in ["nfcapd.202401010000", "nfcapd.202401010005", "nfcapd.202401010010"] {
        touch(root, "gw1", name);
    }
    let cfg = config(root, &["gw1"], &[80]);

    let mut p = Pipeline::new(cfg.clone(), store_lost_at("gw1", "nfcapd.202401010010"), MemoryStore::new());
    let err = Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(1))
        .expect_err("store failure aborts");
    assert!(err.is_fatal());
    let (_, store) = p.into_parts();
    assert_eq!(
        stamps(&store, &SeriesKey::combined(80)),
        vec![utc(2024, 1, 1, 0, 0), utc(2024, 1, 1, 0, 5)]
    );

    let mut p = Pipeline::new(cfg, FakeTool::uniform(), store);
    Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(1))
        .expect("resumed scan");
    let all = vec![utc(2024, 1, 1, 0, 0), utc(2024, 1, 1, 0, 5), utc(2024, 1, 1, 0, 10)];
    assert_eq!(stamps(p.store(), &SeriesKey::source("gw1")), all);
    assert_eq!(stamps(p.store(), &SeriesKey::combined(80)), all);
}

#[test]
fn resumed_scan_feeds_already_imported_files_to_combined_ports() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for source in ["gw1", "gw2"] {
        for name in ["nfcapd.202401010000", "nfcapd.202401010005", "nfcapd.202401010010"] {
            touch(root, source, name);
        }
    }
    let cfg = config(root, &["gw1", "gw2"], &[80]);

    // gw1 is complete, gw2 dies on its second file
    let mut p = Pipeline::new(cfg.clone(), store_lost_at("gw2", "nfcapd.202401010005"), MemoryStore::new());
    Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(1))
        .expect_err("store failure aborts");
    let (_, store) = p.into_parts();
    assert_eq!(stamps(&store, &SeriesKey::source("gw1")).len(), 3);
    assert_eq!(stamps(&store, &SeriesKey::combined(80)), vec![utc(2024, 1, 1, 0, 0)]);

    let mut p = Pipeline::new(cfg, FakeTool::uniform(), store);
    let report = Scanner::new(&mut p, ScanOptions::default())
        .run_until(day(1), day(1))
        .expect("resumed scan");

    assert_eq!(report.files_imported, 2, "only gw2 still needs summaries");
    assert_eq!(
        stamps(p.store(), &SeriesKey::combined(80)),
        vec![utc(2024, 1, 1, 0, 0), utc(2024, 1, 1, 0, 5), utc(2024, 1, 1, 0, 10)]
    );
    let gw1_totals = p
        .tool()
        .calls()
        .into_iter()
        .filter(|c| c.mode == QueryMode::Totals && c.sources == vec!["gw1"])
        .count();
    assert_eq!(gw1_totals, 0);
}
