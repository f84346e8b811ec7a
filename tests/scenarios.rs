//! Cross-module scenario tests (spec.md §8 S1-S6), driven through the
//! public `Session`/`DeltaCalculator` surface the way a real client would
//! use it, rather than poking the graph directly.

use bramble::cache::Cache;
use bramble::config::Config;
use bramble::core::models::ModuleType;
use bramble::core::traits::{TracingReporter, TransformOptions};
use bramble::delta::DeltaCalculator;
use bramble::graph::DependencyGraph;
use bramble::id_allocator::IdAllocator;
use bramble::resolver::Resolver;
use bramble::session::Session;
use bramble::worker_pool::WorkerPool;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

async fn new_session(dir: &TempDir, entry: &str) -> Session {
    let root = dir.path().to_path_buf();
    let config = Config::default_for_root(&root);
    let resolver = Resolver::new(config.clone());
    let cache = Arc::new(Cache::new(config.cache_dir(), 64 * 1024 * 1024).unwrap());
    let pool = Arc::new(WorkerPool::new(cache, 4, config.transformer_key.clone()));
    let graph = DependencyGraph::new(
        resolver,
        pool,
        IdAllocator::new(),
        TransformOptions::default(),
        "web".to_string(),
    )
    .unwrap();
    let entry_path = dir.path().join(entry);
    let calculator = DeltaCalculator::new(graph, vec![(entry_path, ModuleType::Module)]);
    Session::new(calculator, Arc::new(TracingReporter))
}

/// S1: initial build of `/bundle` depending on `/foo`, `/bar`, `/baz`;
/// first call resets with the full set, the immediate second call is
/// empty.
#[tokio::test]
async fn s1_initial_build() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("bundle.js"),
        "require('./foo');\nrequire('./bar');\nrequire('./baz');\n",
    )
    .unwrap();
    fs::write(dir.path().join("foo.js"), "").unwrap();
    fs::write(dir.path().join("bar.js"), "").unwrap();
    fs::write(dir.path().join("baz.js"), "").unwrap();

    let session = new_session(&dir, "bundle.js").await;
    let (_epoch, first) = session.get_delta(false).await.unwrap();
    assert!(first.reset);
    assert_eq!(first.modified.len(), 4);
    assert!(first.deleted.is_empty());

    let (_epoch2, second) = session.get_delta(false).await.unwrap();
    assert!(second.is_empty());
}

/// S2: a single edit to `/foo` yields a delta touching only `/foo`.
#[tokio::test]
async fn s2_single_edit() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bundle.js"), "require('./foo');\n").unwrap();
    fs::write(dir.path().join("foo.js"), "").unwrap();

    let session = new_session(&dir, "bundle.js").await;
    session.get_delta(false).await.unwrap();

    let foo = dir.path().join("foo.js");
    fs::write(&foo, "const x = 1;\n").unwrap();
    session.notify_change(foo.clone()).await;

    let (_epoch, delta) = session.get_delta(false).await.unwrap();
    assert!(!delta.reset);
    assert!(delta.deleted.is_empty());
    assert_eq!(delta.modified.len(), 1);
    assert!(delta.modified.contains_key(&foo));
}

/// S3: `/foo` swaps its dependency on `/bar` + `/baz` for `/qux`.
#[tokio::test]
async fn s3_add_and_remove() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bundle.js"), "require('./foo');\n").unwrap();
    fs::write(dir.path().join("foo.js"), "require('./bar');\nrequire('./baz');\n").unwrap();
    fs::write(dir.path().join("bar.js"), "").unwrap();
    fs::write(dir.path().join("baz.js"), "").unwrap();

    let session = new_session(&dir, "bundle.js").await;
    session.get_delta(false).await.unwrap();

    let foo = dir.path().join("foo.js");
    fs::write(&foo, "require('./qux');\n").unwrap();
    fs::write(dir.path().join("qux.js"), "").unwrap();
    session.notify_change(foo.clone()).await;

    let (_epoch, delta) = session.get_delta(false).await.unwrap();
    assert!(!delta.reset);
    assert_eq!(delta.modified.len(), 2);
    assert!(delta.modified.contains_key(&foo));
    assert!(delta.modified.contains_key(&dir.path().join("qux.js")));
    assert_eq!(delta.deleted.len(), 2);
    assert!(delta.deleted.contains(&dir.path().join("bar.js")));
    assert!(delta.deleted.contains(&dir.path().join("baz.js")));
}

/// S4: delete-then-modify on the same path before the next `getDelta`
/// coalesces into a single retransform, never a deletion.
#[tokio::test]
async fn s4_delete_then_modify_coalesces() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bundle.js"), "require('./foo');\n").unwrap();
    fs::write(dir.path().join("foo.js"), "").unwrap();

    let session = new_session(&dir, "bundle.js").await;
    session.get_delta(false).await.unwrap();

    let foo = dir.path().join("foo.js");
    session.notify_delete(foo.clone()).await;
    fs::write(&foo, "const x = 2;\n").unwrap();
    session.notify_change(foo.clone()).await;

    let (_epoch, delta) = session.get_delta(false).await.unwrap();
    assert!(delta.deleted.is_empty());
    assert!(delta.modified.contains_key(&foo));
}

/// S5 (byte layout): exercised at the unit level in
/// `serializers::ram_bundle`'s own tests, against the canonical §6 field
/// formula (`header_size_bytes = 8 + 8*N`) rather than the worked example
/// in §8, which is internally inconsistent with it (see DESIGN.md).
#[tokio::test]
async fn s5_indexed_ram_round_trips_through_session() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bundle.js"), "require('./a');\n").unwrap();
    fs::write(dir.path().join("a.js"), "const value = 42;\n").unwrap();

    let session = new_session(&dir, "bundle.js").await;
    session.get_delta(false).await.unwrap();
    let (graph, allocator) = session.snapshot().await;

    let bytes = bramble::serializers::ram_bundle::serialize(&graph, &allocator).unwrap();
    let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    assert_eq!(magic, bramble::serializers::ram_bundle::MAGIC);

    let a_id = allocator.existing_id_of(&dir.path().join("a.js")).unwrap();
    let (offset, length) = bramble::serializers::ram_bundle::read_entry(&bytes, a_id.0);
    let slice = &bytes[offset as usize..offset as usize + length as usize];
    assert!(std::str::from_utf8(slice).unwrap().contains("value = 42"));
}

/// S6: a syntax error in `/bar` fails `getDelta`; fixing it and emitting a
/// change event recovers with a clean delta.
#[tokio::test]
async fn s6_transform_error_recovery() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bundle.js"), "require('./bar');\n").unwrap();
    fs::write(dir.path().join("bar.js"), "").unwrap();

    let session = new_session(&dir, "bundle.js").await;
    session.get_delta(false).await.unwrap();

    let bar = dir.path().join("bar.js");
    fs::write(&bar, "function( {").unwrap();
    session.notify_change(bar.clone()).await;
    assert!(session.get_delta(false).await.is_err());

    fs::write(&bar, "const x = 1;\n").unwrap();
    session.notify_change(bar.clone()).await;
    let (_epoch, delta) = session.get_delta(false).await.unwrap();
    assert!(delta.deleted.is_empty());
    assert!(delta.modified.contains_key(&bar));
}

/// Property 7 (spec.md §8): the file RAM bundle's sentinel is the magic's
/// little-endian byte sequence.
#[tokio::test]
async fn file_ram_sentinel_matches_property_7() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bundle.js"), "").unwrap();

    let session = new_session(&dir, "bundle.js").await;
    session.get_delta(false).await.unwrap();
    let (graph, allocator) = session.snapshot().await;

    let out_dir = dir.path().join("out");
    bramble::serializers::file_ram::write(&out_dir, &graph, &allocator).await.unwrap();
    let sentinel = fs::read(out_dir.join("UNBUNDLE")).unwrap();
    assert_eq!(sentinel, [0xE5, 0xD1, 0x0B, 0xFB]);
}
