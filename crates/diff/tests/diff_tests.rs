//! Diffing two snapshots loaded into one worker.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use heapscope_core::{ChildrenProvider, Comparator, DiffSide, Item, SnapshotSource, SortField};
use heapscope_diff::DiffEngine;
use heapscope_proxy::{LoaderProxy, RemoteCallProxy, SnapshotProxy};
use heapscope_worker::spawn_in_process;

const BASE: &str = r#"{"nodes": [
    {"id": 1, "name": "(root)", "type": "synthetic", "self_size": 0, "edges": [
        {"name": "a", "type": "property", "to": 3},
        {"name": "b", "type": "property", "to": 5},
        {"name": "c", "type": "property", "to": 7},
        {"name": "d", "type": "property", "to": 15}
    ]},
    {"id": 3, "name": "Widget", "type": "object", "self_size": 10},
    {"id": 5, "name": "Widget", "type": "object", "self_size": 10},
    {"id": 7, "name": "Widget", "type": "object", "self_size": 10},
    {"id": 15, "name": "Gadget", "type": "object", "self_size": 40}
]}"#;

const TARGET: &str = r#"{"nodes": [
    {"id": 1, "name": "(root)", "type": "synthetic", "self_size": 0, "edges": [
        {"name": "c", "type": "property", "to": 7},
        {"name": "e", "type": "property", "to": 9},
        {"name": "f", "type": "property", "to": 11},
        {"name": "g", "type": "property", "to": 13},
        {"name": "d", "type": "property", "to": 15}
    ]},
    {"id": 7, "name": "Widget", "type": "object", "self_size": 10},
    {"id": 9, "name": "Widget", "type": "object", "self_size": 20},
    {"id": 11, "name": "Widget", "type": "object", "self_size": 20},
    {"id": 13, "name": "Widget", "type": "object", "self_size": 20},
    {"id": 15, "name": "Gadget", "type": "object", "self_size": 40}
]}"#;

async fn load(proxy: &RemoteCallProxy, text: &str) -> Arc<SnapshotProxy> {
    let loader = LoaderProxy::create(proxy).unwrap();
    loader.write(text).unwrap();
    Arc::new(loader.build_snapshot().await.unwrap())
}

async fn engine() -> DiffEngine {
    let (client, _worker) = spawn_in_process();
    let proxy = RemoteCallProxy::connect(client.channel, client.replies);
    let base: Arc<dyn SnapshotSource> = load(&proxy, BASE).await;
    let target: Arc<dyn SnapshotSource> = load(&proxy, TARGET).await;
    DiffEngine::compute(base, target).await.unwrap()
}

#[tokio::test]
async fn test_diff_rows_and_totals() {
    let engine = engine().await;
    assert_eq!(engine.rows().len(), 1);
    assert!(engine.get("Gadget").is_none());

    let widget = engine.get("Widget").unwrap();
    assert_eq!((widget.added_count(), widget.removed_count()), (3, 2));
    assert_eq!((widget.added_size(), widget.removed_size()), (60, 20));
    assert_eq!(widget.count_delta(), 1);
    assert_eq!(widget.size_delta(), 40);

    let totals = engine.totals();
    assert_eq!(totals.count_delta(), 1);
}

#[tokio::test]
async fn test_combined_provider_serves_added_then_removed() {
    let engine = engine().await;
    let provider = engine.provider_for("Widget").unwrap().unwrap();
    assert_eq!(provider.total_length(), 5);

    let by_id = Comparator::new(SortField::Id, true, SortField::Name, true);
    provider.sort_and_rewind(&by_id).await.unwrap();
    let range = provider.serialize_items_range(0, 5).await.unwrap();
    assert_eq!((range.start_position, range.end_position, range.total_length), (0, 5, 5));

    let served: Vec<(DiffSide, u64)> = range
        .items
        .iter()
        .map(|item| match item {
            Item::DiffNode { side, node } => (*side, node.id),
            other => panic!("unexpected item {other:?}"),
        })
        .collect();
    assert_eq!(
        served,
        vec![
            (DiffSide::Added, 9),
            (DiffSide::Added, 11),
            (DiffSide::Added, 13),
            (DiffSide::Removed, 3),
            (DiffSide::Removed, 5),
        ]
    );
    provider.dispose();
}

#[tokio::test]
async fn test_unchanged_class_has_no_provider() {
    let engine = engine().await;
    assert!(engine.provider_for("Gadget").unwrap().is_none());
    assert!(engine.provider_for("Missing").unwrap().is_none());
}
