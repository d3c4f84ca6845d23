mod common;
use crate::common::init_tracing;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use fleetvisor::agent::ModuleEvent;
use fleetvisor::fs::RealFileSystem;
use fleetvisor::source::{FragmentFilter, spawn_fragment_watcher};
use fleetvisor::types::RawConfigSet;

fn yaml_filter() -> FragmentFilter {
    FragmentFilter::new(&["*.yaml".to_string(), "*.yml".to_string()]).unwrap()
}

async fn next_push(rx: &mut mpsc::Receiver<ModuleEvent>) -> RawConfigSet {
    match timeout(Duration::from_secs(5), rx.recv()).await {
        Ok(Some(ModuleEvent::ConfigPushed { fragments })) => fragments,
        Ok(other) => panic!("expected ConfigPushed, got {other:?}"),
        Err(_) => panic!("no push within 5 seconds"),
    }
}

#[tokio::test]
async fn pushes_existing_fragments_at_startup() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("10-base.yaml"), "a: 1\n").unwrap();
    std::fs::write(dir.path().join("README"), "ignored").unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let _handle =
        spawn_fragment_watcher(dir.path(), yaml_filter(), Arc::new(RealFileSystem), tx).unwrap();

    let fragments = next_push(&mut rx).await;
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments["10-base.yaml"], b"a: 1\n");
}

#[tokio::test]
async fn pushes_again_after_a_fragment_changes() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("10-base.yaml"), "a: 1\n").unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let _handle =
        spawn_fragment_watcher(dir.path(), yaml_filter(), Arc::new(RealFileSystem), tx).unwrap();
    let _initial = next_push(&mut rx).await;

    std::fs::write(dir.path().join("20-site.yml"), "b: 2\n").unwrap();

    // Several pushes may arrive for one write; wait for one that sees it.
    let mut fragments = next_push(&mut rx).await;
    while !fragments.contains_key("20-site.yml") {
        fragments = next_push(&mut rx).await;
    }
    assert_eq!(fragments.len(), 2);
    assert_eq!(fragments["20-site.yml"], b"b: 2\n");
}

#[tokio::test]
async fn creates_a_missing_fragment_directory() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let frag_dir = dir.path().join("not-yet");

    let (tx, mut rx) = mpsc::channel(8);
    let handle =
        spawn_fragment_watcher(&frag_dir, yaml_filter(), Arc::new(RealFileSystem), tx).unwrap();

    assert!(frag_dir.is_dir());
    assert_eq!(handle.dir(), frag_dir.as_path());
    assert!(next_push(&mut rx).await.is_empty());
}
