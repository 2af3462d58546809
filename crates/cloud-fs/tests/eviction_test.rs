use chrono::{Duration as ChronoDuration, Utc};
use cloud_fs::{sweeper, CloudFs, FileState, MountConfig, OpenFlags, SecretString};
use cloud_remote::MemoryProvider;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use zip::{write::FileOptions, ZipWriter};

const REPORT: &[u8] = b"quarterly report, deterministic content";

fn connect(provider: Arc<MemoryProvider>, config: MountConfig) -> CloudFs {
    CloudFs::connect(provider, config, &SecretString::new("pw".to_string())).unwrap()
}

fn read_all(fs: &CloudFs, path: &str) -> Vec<u8> {
    let fh = fs.open(path, OpenFlags::read_only()).unwrap();
    let data = fs.read(fh, 0, 1 << 20).unwrap();
    fs.release(fh).unwrap();
    data
}

fn zip_bytes() -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options: FileOptions<()> =
        FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    zip.start_file("readme.txt", options).unwrap();
    zip.write_all(b"inside the archive").unwrap();

    zip.finish().unwrap().into_inner()
}

#[test]
fn eviction_round_trip_restores_placeholder_and_content() {
    let provider = Arc::new(MemoryProvider::new().file("/docs/report.txt", "r", REPORT, None));
    let fs = connect(provider.clone(), MountConfig::default());

    let content = read_all(&fs, "/docs/report.txt");
    let size = fs.attr("/docs/report.txt").unwrap().size;
    assert_eq!(content, REPORT);
    assert_eq!(size, REPORT.len() as u64);

    let report = fs.sweep(Utc::now() + ChronoDuration::minutes(21));
    assert_eq!(report.evicted, 1);

    let entry = fs.namespace().lookup("/docs/report.txt").unwrap();
    assert_eq!(entry.state(), FileState::Registered);
    assert_eq!(entry.content_len(), 0);
    assert!(!fs.registry().contains("/docs/report.txt"));
    assert_ne!(fs.attr("/docs/report.txt").unwrap().size, size);

    // Structure survives eviction
    assert_eq!(fs.read_dir_all("/docs").unwrap().len(), 1);

    assert_eq!(read_all(&fs, "/docs/report.txt"), content);
    assert_eq!(provider.fetch_count("r"), 2);
}

#[test]
fn fresh_files_survive_a_sweep() {
    let provider = Arc::new(MemoryProvider::new().file("/a.txt", "a", "a", None));
    let fs = connect(provider, MountConfig::default());
    read_all(&fs, "/a.txt");

    let report = fs.sweep(Utc::now() + ChronoDuration::minutes(5));

    assert_eq!(report.examined, 1);
    assert_eq!(report.evicted, 0);
    assert_eq!(report.retained, 1);
    assert!(fs.registry().contains("/a.txt"));
}

#[test]
fn hydration_is_idempotent() {
    let provider = Arc::new(MemoryProvider::new().file("/a.txt", "a", REPORT, None));
    let fs = connect(provider.clone(), MountConfig::default());

    fs.ensure_hydrated("/a.txt").unwrap();
    let first = fs.attr("/a.txt").unwrap().size;
    fs.ensure_hydrated("/a.txt").unwrap();
    let second = fs.attr("/a.txt").unwrap().size;

    assert_eq!(provider.fetch_count("a"), 1);
    assert_eq!(first, second);
    assert_eq!(fs.registry().len(), 1);
}

#[test]
fn concurrent_hydrations_share_one_fetch() {
    let provider = Arc::new(
        MemoryProvider::new()
            .with_fetch_delay(Duration::from_millis(100))
            .file("/big.bin", "big", vec![7u8; 4096], None),
    );
    let fs = connect(provider.clone(), MountConfig::default());

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let fs = fs.clone();
            thread::spawn(move || read_all(&fs, "/big.bin"))
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), vec![7u8; 4096]);
    }

    assert_eq!(provider.fetch_count("big"), 1);
}

#[test]
fn failed_fetch_leaves_file_registered_until_next_access() {
    let provider = Arc::new(MemoryProvider::new().file("/a.txt", "a", "alpha", None));
    let fs = connect(provider.clone(), MountConfig::default());
    provider.fail_fetch("a");

    assert!(fs.open("/a.txt", OpenFlags::read_only()).is_err());
    let entry = fs.namespace().lookup("/a.txt").unwrap();
    assert_eq!(entry.state(), FileState::Registered);
    assert!(fs.registry().is_empty());
    assert_eq!(fs.stats().open_handles, 0);

    provider.clear_failures();
    assert_eq!(read_all(&fs, "/a.txt"), b"alpha");
    assert_eq!(provider.fetch_count("a"), 2);
}

#[test]
fn archive_content_gains_zip_suffix() {
    let archive = zip_bytes();
    let provider = Arc::new(
        MemoryProvider::new()
            .file("/Week 1/slides", "s", archive.clone(), None)
            .file("/Week 1/bundle.zip", "b", archive.clone(), Some("application/zip"))
            .file("/Week 1/plain.txt", "p", "text", Some("text/plain")),
    );
    let fs = connect(provider, MountConfig::default());

    for path in ["/Week 1/slides", "/Week 1/bundle.zip", "/Week 1/plain.txt"] {
        fs.ensure_hydrated(path).unwrap();
    }

    let names: Vec<String> = fs
        .read_dir_all("/Week 1")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["slides.zip", "bundle.zip", "plain.txt"]);

    let by_display = fs.lookup("/Week 1", "slides.zip").unwrap();
    let by_name = fs.lookup("/Week 1", "slides").unwrap();
    assert!(Arc::ptr_eq(&by_display, &by_name));
    assert_eq!(by_display.path(), "/Week 1/slides");
    assert_eq!(read_all(&fs, "/Week 1/slides"), archive);

    // Full paths accept the display name too
    assert_eq!(
        fs.attr("/Week 1/slides.zip").unwrap().size,
        archive.len() as u64
    );
    assert_eq!(read_all(&fs, "/Week 1/slides.zip"), archive);
}

#[test]
fn archive_suffix_never_duplicates_a_sibling() {
    let archive = zip_bytes();
    let provider = Arc::new(
        MemoryProvider::new()
            .file("/slides", "s", archive.clone(), None)
            .file("/slides.zip", "z", archive.clone(), Some("application/zip")),
    );
    let fs = connect(provider, MountConfig::default());

    fs.ensure_hydrated("/slides").unwrap();
    fs.ensure_hydrated("/slides.zip").unwrap();

    let names: Vec<String> = fs
        .read_dir_all("/")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["slides (2).zip", "slides.zip"]);

    assert_eq!(fs.lookup("/", "slides.zip").unwrap().path(), "/slides.zip");
    assert_eq!(fs.lookup("/", "slides (2).zip").unwrap().path(), "/slides");
    assert_eq!(fs.attr("/slides (2).zip").unwrap().size, archive.len() as u64);

    // The name survives eviction and the next hydration
    fs.sweep(Utc::now() + ChronoDuration::minutes(21));
    fs.ensure_hydrated("/slides").unwrap();
    assert_eq!(
        fs.namespace().lookup("/slides").unwrap().display_name(),
        "slides (2).zip"
    );
}

#[test]
fn capacity_bound_evicts_least_recently_hydrated() {
    let provider = Arc::new(
        MemoryProvider::new()
            .file("/1.txt", "1", "one", None)
            .file("/2.txt", "2", "two", None)
            .file("/3.txt", "3", "three", None),
    );
    let config = MountConfig {
        max_cached_files: 2,
        ..Default::default()
    };
    let fs = connect(provider, config);

    for path in ["/1.txt", "/2.txt", "/3.txt"] {
        fs.ensure_hydrated(path).unwrap();
    }
    let report = fs.sweep(Utc::now());

    assert_eq!(report.evicted, 1);
    assert_eq!(fs.registry().paths(), vec!["/2.txt", "/3.txt"]);
    assert!(!fs.namespace().lookup("/1.txt").unwrap().is_hydrated());
}

#[test]
fn unbounded_capacity_keeps_everything_fresh() {
    let provider = Arc::new(
        MemoryProvider::new()
            .file("/1.txt", "1", "one", None)
            .file("/2.txt", "2", "two", None),
    );
    let config = MountConfig {
        max_cached_files: 0,
        ..Default::default()
    };
    let fs = connect(provider, config);
    fs.ensure_hydrated("/1.txt").unwrap();
    fs.ensure_hydrated("/2.txt").unwrap();

    assert_eq!(fs.sweep(Utc::now()).evicted, 0);
    assert_eq!(fs.registry().len(), 2);
}

#[tokio::test]
async fn background_sweeper_evicts_idle_files() {
    let provider = Arc::new(MemoryProvider::new().file("/a.txt", "a", "alpha", None));
    let config = MountConfig {
        stale_after_secs: 0,
        ..Default::default()
    };
    let fs = connect(provider, config);
    fs.ensure_hydrated("/a.txt").unwrap();

    let handle = sweeper::spawn(fs.clone(), Duration::from_millis(50), false);
    tokio::time::sleep(Duration::from_millis(400)).await;
    handle.shutdown().await;

    let entry = fs.namespace().lookup("/a.txt").unwrap();
    assert_eq!(entry.state(), FileState::Registered);
    assert!(fs.registry().is_empty());
}

#[tokio::test]
async fn background_sweeper_refreshes_the_tree() {
    let provider = Arc::new(MemoryProvider::new().file("/a.txt", "a", "alpha", None));
    let fs = connect(provider.clone(), MountConfig::default());
    provider.fail_listing("root");

    let handle = sweeper::spawn(fs.clone(), Duration::from_millis(50), true);
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.shutdown().await;

    // Every refresh failed, the namespace from connect is still served
    assert_eq!(fs.read_dir_all("/").unwrap().len(), 1);
    assert!(fs.attr("/a.txt").is_ok());
}
