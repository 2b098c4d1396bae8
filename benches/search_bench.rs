use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::fs;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tempfile::tempdir;

use ffind_indexer::builder::{BuildConfig, IndexBuilder};
use ffind_indexer::index::Index;
use ffind_indexer::search::{SearchConfig, Searcher};
use ffind_indexer::snapshot::{PragmaConfig, Snapshot};

const STEMS: [&str; 8] =
    ["report", "invoice", "main", "helper", "notes", "config", "Budget", "photo"];
const EXTENSIONS: [&str; 6] = ["pdf", "rs", "txt", "toml", "xlsx", "jpg"];

/// Get current process RSS in MB (cross-platform: macOS, Linux, Windows).
fn get_rss_mb() -> f64 {
    let pid = Pid::from_u32(std::process::id());
    let mut sys = System::new_with_specifics(
        RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing().with_memory()),
    );
    sys.refresh_processes(ProcessesToUpdate::All, true);
    sys.process(pid).map(|p| p.memory() as f64 / 1_000_000.0).unwrap_or(0.0)
}

fn synthetic_name(i: usize) -> String {
    let stem = STEMS[i % STEMS.len()];
    let ext = EXTENSIONS[(i / STEMS.len()) % EXTENSIONS.len()];
    format!("{stem}_{i:06}.{ext}")
}

/// In-memory index with N records spread over 100 directories.
fn synthetic_index(num_files: usize) -> Index {
    let index = Index::new();
    for i in 0..num_files {
        let name = synthetic_name(i);
        index.insert(&name, &format!("/data/dir_{:03}/{name}", i % 100));
    }
    index
}

/// Create a directory tree with N files for build benchmarks.
fn create_benchmark_tree(num_files: usize) -> tempfile::TempDir {
    let dir = tempdir().unwrap();
    for i in 0..num_files {
        let sub = dir.path().join(format!("dir_{:02}", i % 20));
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join(synthetic_name(i)), "").unwrap();
    }
    dir
}

fn benchmark_search(c: &mut Criterion) {
    let index = synthetic_index(50_000);
    let searcher = Searcher::new(&index, SearchConfig::default());

    // Verify search works before benchmarking (correctness check)
    let results = searcher.search("report");
    assert_eq!(results.len(), 1000, "'report' should hit the default cap");
    assert!(!searcher.search("budget xlsx").is_empty(), "multi-term search may be broken!");

    let mut group = c.benchmark_group("search");

    for query in ["r", "report", "port_0001", ".pdf", "budget xlsx", "main 000 rs", "nomatch"] {
        group.bench_with_input(BenchmarkId::new("search", query), query, |b, q| {
            b.iter(|| {
                let _ = searcher.search(q);
            });
        });
    }

    group.finish();
}

fn benchmark_insert_remove(c: &mut Criterion) {
    let index = synthetic_index(50_000);

    c.bench_function("insert_remove_cycle", |b| {
        b.iter(|| {
            index.insert("Quarterly_Summary_Final.docx", "/tmp/Quarterly_Summary_Final.docx");
            index.remove("/tmp/Quarterly_Summary_Final.docx");
        });
    });
}

fn benchmark_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(20);

    for num_files in [1000, 5000] {
        let dir = create_benchmark_tree(num_files);
        for threads in [1, 4] {
            let id = BenchmarkId::new(format!("threads_{threads}"), num_files);
            group.bench_with_input(id, &threads, |b, &threads| {
                let config = BuildConfig { threads, ..BuildConfig::default() };
                b.iter(|| IndexBuilder::new(dir.path(), config.clone()).build().unwrap());
            });
        }
    }

    group.finish();
}

fn benchmark_snapshot(c: &mut Criterion) {
    let index = synthetic_index(20_000);
    let dir = tempdir().unwrap();
    let path = dir.path().join("bench.db");
    let config = PragmaConfig::default();

    let mut group = c.benchmark_group("snapshot_20k");
    group.sample_size(10);

    group.bench_function("save", |b| {
        b.iter(|| Snapshot::save(&index, &path, dir.path(), &config).unwrap());
    });
    group.bench_function("load", |b| {
        b.iter(|| Snapshot::load(&path).unwrap());
    });

    group.finish();
}

/// Memory benchmark: RSS growth from building the suffix index.
fn benchmark_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory");
    group.sample_size(10);

    for num_files in [10_000, 50_000] {
        group.bench_with_input(BenchmarkId::new("index_rss", num_files), &num_files, |b, n| {
            b.iter_custom(|iters| {
                let mut total_duration = std::time::Duration::ZERO;
                let mut peak_rss = 0.0f64;

                for _ in 0..iters {
                    let rss_before = get_rss_mb();
                    let start = std::time::Instant::now();
                    let index = synthetic_index(*n);
                    total_duration += start.elapsed();

                    peak_rss = peak_rss.max(get_rss_mb() - rss_before);
                    drop(index);
                }

                eprintln!("  [{n} files] RSS delta: {peak_rss:.1} MB");
                total_duration
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_search,
    benchmark_insert_remove,
    benchmark_build,
    benchmark_snapshot,
    benchmark_memory
);
criterion_main!(benches);
