//! A parsed heap snapshot held entirely in worker memory.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use heapscope_core::{
    Aggregate, AggregateForDiff, DiffForClass, EdgeRecord, Error, Item, NodeFilter, NodeRecord,
    Result, Samples, SearchConfig, SnapshotObjectId, Statistics,
};
use heapscope_ipc::{Payload, methods};
use itertools::{EitherOrBoth, Itertools};
use regex::RegexBuilder;
use tracing::debug;

use crate::dispatcher::{CallContext, Dispatch, WorkerObject, arguments, value};
use crate::format::SnapshotDocument;
use crate::provider::WorkerProvider;

/// Distance of nodes the root cannot reach.
pub const UNREACHABLE: u32 = u32::MAX;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
struct Node {
    id: SnapshotObjectId,
    name: String,
    node_type: String,
    self_size: u64,
    retained_size: u64,
    trace_node_id: Option<u32>,
    distance: u32,
}

impl Node {
    /// Constructor name shown in class listings.
    fn class_name(&self) -> String {
        match self.node_type.as_str() {
            "object" | "native" => self.name.clone(),
            "hidden" => "(system)".to_string(),
            "code" => "(compiled code)".to_string(),
            other => format!("({other})"),
        }
    }
}

#[derive(Debug, Clone)]
struct Edge {
    from: usize,
    to: usize,
    name: String,
    edge_type: String,
}

#[derive(Debug)]
pub struct InMemorySnapshot {
    uid: u64,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    samples: Option<Samples>,
    /// Diff results keyed by base snapshot uid.
    diffs: HashMap<u64, BTreeMap<String, DiffForClass>>,
}

impl InMemorySnapshot {
    /// Index the document and compute root distances.
    pub fn from_document(document: SnapshotDocument) -> Result<Self> {
        if document.nodes.is_empty() {
            return Err(Error::snapshot_parse("snapshot has no nodes"));
        }

        let mut index_of = HashMap::with_capacity(document.nodes.len());
        for (index, entry) in document.nodes.iter().enumerate() {
            if index_of.insert(entry.id, index).is_some() {
                return Err(Error::snapshot_parse(format!("duplicate object id {}", entry.id)));
            }
        }

        let node_count = document.nodes.len();
        let mut nodes = Vec::with_capacity(node_count);
        let mut edges = Vec::new();
        let mut outgoing = vec![Vec::new(); node_count];
        let mut incoming = vec![Vec::new(); node_count];

        for (from, entry) in document.nodes.into_iter().enumerate() {
            for edge in entry.edges {
                let to = *index_of.get(&edge.to).ok_or_else(|| {
                    Error::snapshot_parse(format!(
                        "edge from object {} points at unknown object {}",
                        entry.id, edge.to
                    ))
                })?;
                let edge_index = edges.len();
                outgoing[from].push(edge_index);
                incoming[to].push(edge_index);
                edges.push(Edge {
                    from,
                    to,
                    name: edge.name.into_string(),
                    edge_type: edge.edge_type,
                });
            }
            nodes.push(Node {
                id: entry.id,
                name: entry.name,
                node_type: entry.node_type,
                self_size: entry.self_size,
                retained_size: entry.retained_size.unwrap_or(entry.self_size),
                trace_node_id: entry.trace_node_id,
                distance: UNREACHABLE,
            });
        }

        let mut snapshot = Self {
            uid: NEXT_UID.fetch_add(1, Ordering::Relaxed),
            nodes,
            edges,
            outgoing,
            incoming,
            samples: document.samples,
            diffs: HashMap::new(),
        };
        snapshot.compute_distances();
        Ok(snapshot)
    }

    pub const fn uid(&self) -> u64 {
        self.uid
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Breadth-first distances from the root, ignoring weak edges.
    fn compute_distances(&mut self) {
        let Some(root) = self.nodes.first_mut() else {
            return;
        };
        root.distance = 0;
        let mut queue = VecDeque::from([0usize]);
        while let Some(index) = queue.pop_front() {
            let next = self.nodes[index].distance.saturating_add(1);
            for &edge_index in &self.outgoing[index] {
                let edge = &self.edges[edge_index];
                if edge.edge_type == "weak" {
                    continue;
                }
                let target = &mut self.nodes[edge.to];
                if target.distance == UNREACHABLE {
                    target.distance = next;
                    queue.push_back(edge.to);
                }
            }
        }
    }

    /// Nodes that take part in class listings; synthetic roots do not.
    fn listed_nodes(&self) -> impl Iterator<Item = (usize, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.node_type != "synthetic")
    }

    fn passes(node: &Node, filter: &NodeFilter) -> bool {
        filter.accepts_id(node.id)
            && filter
                .allocation_node_id
                .is_none_or(|trace| node.trace_node_id == Some(trace))
    }

    fn node_record(&self, index: usize) -> NodeRecord {
        let node = &self.nodes[index];
        NodeRecord {
            id: node.id,
            name: node.name.clone(),
            node_type: node.node_type.clone(),
            node_index: index,
            self_size: node.self_size,
            retained_size: node.retained_size,
            distance: node.distance,
        }
    }

    fn edge_item(&self, edge_index: usize, toward_target: bool) -> Item {
        let edge = &self.edges[edge_index];
        let other = if toward_target { edge.to } else { edge.from };
        Item::Edge(EdgeRecord {
            name: edge.name.clone(),
            edge_type: edge.edge_type.clone(),
            edge_index,
            node: self.node_record(other),
        })
    }

    fn node_items(&self, indexes: impl IntoIterator<Item = usize>) -> Result<Vec<Item>> {
        indexes
            .into_iter()
            .map(|index| {
                if index < self.nodes.len() {
                    Ok(Item::Node(self.node_record(index)))
                } else {
                    Err(Error::NodeNotFound {
                        node_id: index as u64,
                    })
                }
            })
            .collect()
    }

    /// Edge indexes leaving or entering the node at `index`.
    fn adjacent(lists: &[Vec<usize>], index: usize) -> Result<&[usize]> {
        lists
            .get(index)
            .map(Vec::as_slice)
            .ok_or(Error::NodeNotFound {
                node_id: index as u64,
            })
    }

    pub fn aggregates_with_filter(&self, filter: &NodeFilter) -> BTreeMap<String, Aggregate> {
        let mut aggregates: BTreeMap<String, Aggregate> = BTreeMap::new();
        for (_, node) in self.listed_nodes().filter(|(_, node)| Self::passes(node, filter)) {
            let name = node.class_name();
            let aggregate = aggregates.entry(name.clone()).or_insert_with(|| Aggregate {
                name,
                count: 0,
                self_size: 0,
                max_retained_size: 0,
                distance: UNREACHABLE,
            });
            aggregate.count += 1;
            aggregate.self_size += node.self_size;
            aggregate.max_retained_size = aggregate.max_retained_size.max(node.retained_size);
            aggregate.distance = aggregate.distance.min(node.distance);
        }
        aggregates
    }

    pub fn aggregates_for_diff(&self) -> BTreeMap<String, AggregateForDiff> {
        let mut by_class: BTreeMap<String, Vec<(SnapshotObjectId, usize, u64)>> = BTreeMap::new();
        for (index, node) in self.listed_nodes() {
            by_class
                .entry(node.class_name())
                .or_default()
                .push((node.id, index, node.self_size));
        }
        by_class
            .into_iter()
            .map(|(name, mut rows)| {
                rows.sort_unstable_by_key(|&(id, _, _)| id);
                let mut summary = AggregateForDiff::default();
                for (id, index, self_size) in rows {
                    summary.ids.push(id);
                    summary.indexes.push(index);
                    summary.self_sizes.push(self_size);
                }
                (name, summary)
            })
            .collect()
    }

    /// Diff against a base snapshot's summary, caching the added indexes
    /// for [`added_nodes`](Self::added_nodes).
    pub fn calculate_snapshot_diff(
        &mut self,
        base_uid: u64,
        base: &BTreeMap<String, AggregateForDiff>,
    ) -> BTreeMap<String, DiffForClass> {
        let mine = self.aggregates_for_diff();
        let empty = AggregateForDiff::default();
        let classes: BTreeSet<&String> = base.keys().chain(mine.keys()).collect();

        let diffs: BTreeMap<String, DiffForClass> = classes
            .into_iter()
            .map(|name| {
                let before = base.get(name).unwrap_or(&empty);
                let after = mine.get(name).unwrap_or(&empty);
                diff_class(name, before, after)
            })
            .filter(|diff| diff.added_count > 0 || diff.removed_count > 0)
            .map(|diff| (diff.name.clone(), diff))
            .collect();

        debug!(uid = self.uid, base_uid, changed_classes = diffs.len(), "Calculated diff");
        self.diffs.insert(base_uid, diffs.clone());
        diffs
    }

    /// Objects of `class_name` added since the base snapshot.
    pub fn added_nodes(&self, base_uid: u64, class_name: &str) -> Result<Vec<Item>> {
        let diffs = self.diffs.get(&base_uid).ok_or_else(|| {
            Error::invalid_request(format!("no diff calculated against snapshot {base_uid}"))
        })?;
        match diffs.get(class_name) {
            Some(diff) => self.node_items(diff.added_indexes.iter().copied()),
            None => Ok(Vec::new()),
        }
    }

    pub fn edges_of(&self, node_index: usize) -> Result<Vec<Item>> {
        Ok(Self::adjacent(&self.outgoing, node_index)?
            .iter()
            .map(|&edge_index| self.edge_item(edge_index, true))
            .collect())
    }

    pub fn retainers_of(&self, node_index: usize) -> Result<Vec<Item>> {
        Ok(Self::adjacent(&self.incoming, node_index)?
            .iter()
            .map(|&edge_index| self.edge_item(edge_index, false))
            .collect())
    }

    pub fn instances_of(&self, class_name: &str, filter: &NodeFilter) -> Vec<Item> {
        self.listed_nodes()
            .filter(|(_, node)| Self::passes(node, filter) && node.class_name() == class_name)
            .map(|(index, _)| Item::Node(self.node_record(index)))
            .collect()
    }

    pub fn nodes_matching(&self, filter: &NodeFilter) -> Vec<Item> {
        self.listed_nodes()
            .filter(|(_, node)| Self::passes(node, filter))
            .map(|(index, _)| Item::Node(self.node_record(index)))
            .collect()
    }

    pub fn nodes_at(&self, node_indexes: &[usize]) -> Result<Vec<Item>> {
        self.node_items(node_indexes.iter().copied())
    }

    /// Ids of nodes whose name matches, ascending. `@<id>` looks an object
    /// up by id.
    pub fn search(&self, config: &SearchConfig, filter: &NodeFilter) -> Result<Vec<SnapshotObjectId>> {
        let query = config.query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self
            .listed_nodes()
            .map(|(_, node)| node)
            .filter(|node| Self::passes(node, filter));

        let mut ids: Vec<SnapshotObjectId> =
            if let Some(id) = query.strip_prefix('@').and_then(|id| id.parse::<SnapshotObjectId>().ok()) {
                candidates.filter(|node| node.id == id).map(|node| node.id).collect()
            } else if config.is_regex {
                let pattern = RegexBuilder::new(query)
                    .case_insensitive(!config.case_sensitive)
                    .build()
                    .map_err(|e| Error::invalid_query(e.to_string()))?;
                candidates
                    .filter(|node| pattern.is_match(&node.name))
                    .map(|node| node.id)
                    .collect()
            } else if config.case_sensitive {
                candidates
                    .filter(|node| node.name.contains(query))
                    .map(|node| node.id)
                    .collect()
            } else {
                let needle = query.to_lowercase();
                candidates
                    .filter(|node| node.name.to_lowercase().contains(&needle))
                    .map(|node| node.id)
                    .collect()
            };
        ids.sort_unstable();
        Ok(ids)
    }

    pub fn statistics(&self) -> Statistics {
        let mut statistics = Statistics {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            ..Statistics::default()
        };
        for node in &self.nodes {
            statistics.total_size += node.self_size;
            *statistics.by_type.entry(node.node_type.clone()).or_default() += node.self_size;
        }
        statistics
    }

    pub const fn samples(&self) -> Option<&Samples> {
        self.samples.as_ref()
    }
}

/// Merge-walk two id-sorted class summaries.
fn diff_class(name: &str, before: &AggregateForDiff, after: &AggregateForDiff) -> DiffForClass {
    let rows = |summary: &AggregateForDiff| {
        summary
            .ids
            .iter()
            .copied()
            .zip(summary.indexes.iter().copied())
            .zip(summary.self_sizes.iter().copied())
            .map(|((id, index), size)| (id, index, size))
            .collect::<Vec<_>>()
    };

    let mut diff = DiffForClass {
        name: name.to_string(),
        ..DiffForClass::default()
    };
    for pair in rows(before)
        .into_iter()
        .merge_join_by(rows(after), |a, b| a.0.cmp(&b.0))
    {
        match pair {
            EitherOrBoth::Left((_, index, size)) => {
                diff.removed_count += 1;
                diff.removed_size += size;
                diff.deleted_indexes.push(index);
            }
            EitherOrBoth::Right((_, index, size)) => {
                diff.added_count += 1;
                diff.added_size += size;
                diff.added_indexes.push(index);
            }
            EitherOrBoth::Both(..) => {}
        }
    }
    diff
}

fn provider(items: Vec<Item>) -> Result<Dispatch> {
    Ok(Dispatch::Object(Box::new(WorkerProvider::new(items))))
}

impl WorkerObject for InMemorySnapshot {
    fn class_name(&self) -> &'static str {
        "HeapSnapshot"
    }

    fn call(&mut self, method: &str, args: &Payload, _ctx: &mut CallContext) -> Result<Dispatch> {
        match method {
            methods::UID => value(&self.uid),
            methods::NODE_COUNT => value(&self.nodes.len()),
            methods::AGGREGATES_WITH_FILTER => {
                let (filter,): (NodeFilter,) = arguments(args)?;
                value(&self.aggregates_with_filter(&filter))
            }
            methods::AGGREGATES_FOR_DIFF => value(&self.aggregates_for_diff()),
            methods::CALCULATE_SNAPSHOT_DIFF => {
                let (base_uid, base): (u64, BTreeMap<String, AggregateForDiff>) = arguments(args)?;
                value(&self.calculate_snapshot_diff(base_uid, &base))
            }
            methods::CREATE_EDGES_PROVIDER => {
                let (node_index,): (usize,) = arguments(args)?;
                provider(self.edges_of(node_index)?)
            }
            methods::CREATE_RETAINING_EDGES_PROVIDER => {
                let (node_index,): (usize,) = arguments(args)?;
                provider(self.retainers_of(node_index)?)
            }
            methods::CREATE_NODES_PROVIDER_FOR_CLASS => {
                let (class_name, filter): (String, NodeFilter) = arguments(args)?;
                provider(self.instances_of(&class_name, &filter))
            }
            methods::CREATE_NODES_PROVIDER => {
                let (filter,): (NodeFilter,) = arguments(args)?;
                provider(self.nodes_matching(&filter))
            }
            methods::CREATE_ADDED_NODES_PROVIDER => {
                let (base_uid, class_name): (u64, String) = arguments(args)?;
                provider(self.added_nodes(base_uid, &class_name)?)
            }
            methods::CREATE_DELETED_NODES_PROVIDER => {
                let (node_indexes,): (Vec<usize>,) = arguments(args)?;
                provider(self.nodes_at(&node_indexes)?)
            }
            methods::SEARCH => {
                let (config, filter): (SearchConfig, NodeFilter) = arguments(args)?;
                value(&self.search(&config, &filter)?)
            }
            methods::GET_STATISTICS => value(&self.statistics()),
            methods::GET_SAMPLES => value(&self.samples()),
            _ => Err(Error::unknown_method(self.class_name(), method)),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn parse(json: &str) -> InMemorySnapshot {
        InMemorySnapshot::from_document(serde_json::from_str(json).unwrap()).unwrap()
    }

    /// root -> a(A) -> b(B) -[weak]-> c(A); d(B) unreachable.
    fn sample() -> InMemorySnapshot {
        parse(
            r#"{"nodes": [
                {"id": 1, "name": "(root)", "type": "synthetic", "self_size": 0,
                 "edges": [{"name": "a", "type": "property", "to": 3}]},
                {"id": 3, "name": "A", "type": "object", "self_size": 10, "retained_size": 40,
                 "trace_node_id": 7,
                 "edges": [{"name": 0, "type": "element", "to": 5}]},
                {"id": 5, "name": "B", "type": "object", "self_size": 20,
                 "edges": [{"name": "c", "type": "weak", "to": 7}]},
                {"id": 7, "name": "A", "type": "object", "self_size": 30},
                {"id": 9, "name": "hello", "type": "string", "self_size": 8}
            ]}"#,
        )
    }

    #[test]
    fn test_distances_skip_weak_edges() {
        let snapshot = sample();
        let distances: Vec<u32> = snapshot.nodes.iter().map(|n| n.distance).collect();
        assert_eq!(distances, vec![0, 1, 2, UNREACHABLE, UNREACHABLE]);
    }

    #[test]
    fn test_aggregates_group_by_class() {
        let snapshot = sample();
        let aggregates = snapshot.aggregates_with_filter(&NodeFilter::all());
        assert_eq!(aggregates.keys().collect::<Vec<_>>(), vec!["(string)", "A", "B"]);

        let a = &aggregates["A"];
        assert_eq!((a.count, a.self_size, a.max_retained_size, a.distance), (2, 40, 40, 1));

        let allocated = snapshot.aggregates_with_filter(&NodeFilter::allocation(7));
        assert_eq!(allocated.len(), 1);
        assert_eq!(allocated["A"].count, 1);
    }

    #[test]
    fn test_edges_and_retainers() {
        let snapshot = sample();
        let edges = snapshot.edges_of(1).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].name(), "0");
        assert_eq!(edges[0].object_id(), Some(5));

        let retainers = snapshot.retainers_of(1).unwrap();
        assert_eq!(retainers[0].object_id(), Some(1));
        assert!(matches!(snapshot.edges_of(42), Err(Error::NodeNotFound { .. })));
        let past_end = snapshot.node_count();
        assert!(matches!(
            snapshot.retainers_of(past_end),
            Err(Error::NodeNotFound { node_id }) if node_id == past_end as u64
        ));
    }

    #[test]
    fn test_diff_merges_by_object_id() {
        let base = sample();
        let mut target = parse(
            r#"{"nodes": [
                {"id": 1, "name": "(root)", "type": "synthetic", "self_size": 0},
                {"id": 3, "name": "A", "type": "object", "self_size": 10},
                {"id": 11, "name": "A", "type": "object", "self_size": 12},
                {"id": 13, "name": "C", "type": "object", "self_size": 14},
                {"id": 9, "name": "hello", "type": "string", "self_size": 8}
            ]}"#,
        );

        let diffs = target.calculate_snapshot_diff(base.uid(), &base.aggregates_for_diff());
        assert_eq!(diffs.keys().collect::<Vec<_>>(), vec!["A", "B", "C"]);

        let a = &diffs["A"];
        assert_eq!((a.added_count, a.removed_count), (1, 1));
        assert_eq!((a.added_size, a.removed_size), (12, 30));
        assert_eq!(a.deleted_indexes, vec![3]);

        let b = &diffs["B"];
        assert_eq!((b.added_count, b.removed_count), (0, 1));

        let added = target.added_nodes(base.uid(), "A").unwrap();
        assert_eq!(added.iter().filter_map(Item::object_id).collect::<Vec<_>>(), vec![11]);
        let removed = base.nodes_at(&a.deleted_indexes).unwrap();
        assert_eq!(removed[0].object_id(), Some(7));

        assert!(target.added_nodes(9999, "A").is_err());
    }

    #[test]
    fn test_search_modes() {
        let snapshot = sample();
        let search = |query: &str, case_sensitive: bool, is_regex: bool| {
            let config = SearchConfig {
                query: query.to_string(),
                case_sensitive,
                is_regex,
            };
            snapshot.search(&config, &NodeFilter::all())
        };

        assert_eq!(search("a", false, false).unwrap(), vec![3, 7]);
        assert_eq!(search("a", true, false).unwrap(), Vec::<u64>::new());
        assert_eq!(search("^(A|B)$", true, true).unwrap(), vec![3, 5, 7]);
        assert_eq!(search("@5", false, false).unwrap(), vec![5]);
        assert!(matches!(search("(", false, true), Err(Error::InvalidQuery { .. })));
    }

    #[test]
    fn test_statistics_by_type() {
        let statistics = sample().statistics();
        assert_eq!(statistics.node_count, 5);
        assert_eq!(statistics.edge_count, 3);
        assert_eq!(statistics.total_size, 68);
        assert_eq!(statistics.by_type["string"], 8);
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let document = serde_json::from_str(
            r#"{"nodes": [{"id": 1, "name": "r", "type": "synthetic", "self_size": 0,
                "edges": [{"name": "x", "type": "property", "to": 2}]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            InMemorySnapshot::from_document(document),
            Err(Error::SnapshotParse { .. })
        ));
    }
}
