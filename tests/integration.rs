use ffind_indexer::cli::OutputFormat;
use ffind_indexer::error::IndexerError;
use ffind_indexer::search::{SearchConfig, Searcher};
use ffind_indexer::snapshot::{PragmaConfig, Snapshot};
use ffind_indexer::updater::{ChangeEvent, IndexUpdater, apply};
use ffind_indexer::{BuildConfig, Index, IndexBuilder, IndexRecord, SNAPSHOT_NAME};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

/// Helper to build an index over `root` with default settings.
fn build(root: &Path) -> Index {
    IndexBuilder::new(root, BuildConfig::default()).build().unwrap().0
}

fn search(index: &Index, query: &str) -> Vec<IndexRecord> {
    Searcher::new(index, SearchConfig::default()).search(query)
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn test_build_and_search_roundtrip() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src/bin")).unwrap();
    fs::write(dir.path().join("src/main.rs"), "").unwrap();
    fs::write(dir.path().join("src/bin/helper.rs"), "").unwrap();
    fs::write(dir.path().join("README.md"), "").unwrap();

    let (index, stats) = IndexBuilder::new(dir.path(), BuildConfig::default()).build().unwrap();
    assert_eq!(stats.files_indexed, 3);
    assert!(!stats.cancelled);

    let results = search(&index, ".rs");
    let names: Vec<&str> = results.iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(names, vec!["helper.rs", "main.rs"]);
    assert_eq!(results[1].full_path, path_str(&dir.path().join("src/main.rs")));

    // Directories are walked, never indexed.
    assert!(search(&index, "bin").is_empty());
}

#[test]
fn test_every_substring_of_a_name_finds_it() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("Budget_2024.xlsx"), "").unwrap();
    let index = build(dir.path());

    let name = "budget_2024.xlsx";
    for start in 0..name.len() {
        for end in start + 1..=name.len() {
            let term = &name[start..end];
            assert_eq!(search(&index, term).len(), 1, "substring {term:?} should match");
        }
    }
}

#[test]
fn test_multi_term_query_against_tree() {
    let dir = tempdir().unwrap();
    for name in ["alpha_beta.txt", "alpha_gamma.txt", "beta_gamma.txt"] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    let index = build(dir.path());

    let results = search(&index, "ALPHA   beta");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].filename, "alpha_beta.txt");

    assert_eq!(search(&index, "gamma").len(), 2);
    assert!(search(&index, "alpha beta gamma").is_empty());
}

#[test]
fn test_results_capped_and_sorted() {
    let dir = tempdir().unwrap();
    for i in 0..30 {
        fs::write(dir.path().join(format!("log_{i:02}.txt")), "").unwrap();
    }
    let index = build(dir.path());

    let config = SearchConfig { max_results: 10, ..SearchConfig::default() };
    let results = Searcher::new(&index, config).search("log");
    assert_eq!(results.len(), 10);
    assert!(results.windows(2).all(|w| w[0].full_path < w[1].full_path));
    assert_eq!(results[0].filename, "log_00.txt");

    assert_eq!(search(&index, "log").len(), 30);
}

#[test]
fn test_default_cap_is_one_thousand() {
    let index = Index::new();
    for i in 0..1200 {
        index.insert(&format!("item{i:04}.dat"), &format!("/data/item{i:04}.dat"));
    }
    let results = search(&index, "item");
    assert_eq!(results.len(), 1000);
    assert_eq!(results.last().unwrap().filename, "item0999.dat");
}

#[test]
fn test_events_keep_index_current() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("draft.txt"), "").unwrap();
    let index = build(dir.path());

    let created = dir.path().join("summary.txt");
    apply(&index, &ChangeEvent::created(&created));
    assert_eq!(search(&index, "summary").len(), 1);

    let draft = dir.path().join("draft.txt");
    let final_path = dir.path().join("final.txt");
    apply(&index, &ChangeEvent::moved(&draft, &final_path));
    assert!(search(&index, "draft").is_empty());
    assert_eq!(search(&index, "final")[0].full_path, path_str(&final_path));

    apply(&index, &ChangeEvent::deleted(&created));
    assert!(search(&index, "summary").is_empty());

    // Deleting twice is harmless.
    apply(&index, &ChangeEvent::deleted(&created));
    assert_eq!(index.len(), 1);
}

#[test]
fn test_move_then_search_old_and_new_names() {
    let index = Index::from_records([("old_name.txt", "/d/old_name.txt")]);
    let before = index.stats();

    apply(&index, &ChangeEvent::moved("/d/old_name.txt", "/e/new_name.txt"));
    assert!(search(&index, "old_name").is_empty());
    assert_eq!(search(&index, "new_name")[0].full_path, "/e/new_name.txt");
    assert_eq!(index.stats().records, before.records);
}

#[test]
fn test_updater_thread_applies_events_in_order() {
    let index = Arc::new(Index::new());
    let updater = IndexUpdater::spawn(Arc::clone(&index)).unwrap();

    updater.send(ChangeEvent::created("/w/a.txt")).unwrap();
    updater.send(ChangeEvent::moved("/w/a.txt", "/w/b.txt")).unwrap();
    updater.send(ChangeEvent::moved("/w/b.txt", "/w/c.txt")).unwrap();
    updater.send(ChangeEvent::created("/w/dir").directory()).unwrap();
    let stats = updater.finish();

    assert_eq!(stats.applied, 3);
    assert_eq!(stats.ignored, 1);
    assert_eq!(index.records(), vec![IndexRecord::new("c.txt", "/w/c.txt")]);
}

#[test]
fn test_snapshot_roundtrip_preserves_search_results() {
    let dir = tempdir().unwrap();
    for name in ["Report.PDF", "report_draft.docx", "notes.txt"] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    let index = build(dir.path());
    let snapshot = dir.path().join(SNAPSHOT_NAME);
    Snapshot::save(&index, &snapshot, dir.path(), &PragmaConfig::default()).unwrap();

    let (loaded, meta) = Snapshot::load(&snapshot).unwrap();
    assert_eq!(meta.root, path_str(dir.path()));
    assert_eq!(search(&loaded, "report"), search(&index, "report"));
    assert_eq!(loaded.stats(), index.stats());

    // Rebuilding the tree does not pick up the snapshot itself.
    assert_eq!(build(dir.path()).len(), 3);
}

#[test]
fn test_invalid_root_errors() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing");
    let file = dir.path().join("file.txt");
    fs::write(&file, "").unwrap();

    for root in [&missing, &file] {
        let result = IndexBuilder::new(root, BuildConfig::default()).build();
        assert!(matches!(result, Err(IndexerError::InvalidRoot { .. })));
    }
}

#[test]
fn test_json_output_shape() {
    let index = Index::from_records([("a.rs", "/p/a.rs"), ("b.rs", "/p/b.rs")]);
    let searcher =
        Searcher::new(&index, SearchConfig { format: OutputFormat::Json, ..Default::default() });
    let results = searcher.search(".rs");

    let mut output = Vec::new();
    searcher.format_results(&results, &mut output).unwrap();

    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let rows = value["results"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["path"], "/p/a.rs");
    assert_eq!(rows[1]["filename"], "b.rs");
}

#[cfg(unix)]
#[test]
fn test_non_utf8_filename_indexed_lossily() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempdir().unwrap();
    let name = OsStr::from_bytes(b"bad\xffname.txt");
    if fs::write(dir.path().join(name), "").is_err() {
        // Some filesystems reject invalid UTF-8 names outright.
        return;
    }

    let index = build(dir.path());
    assert_eq!(search(&index, "name.txt").len(), 1);
}
