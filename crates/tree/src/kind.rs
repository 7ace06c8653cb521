//! The closed set of tree node kinds.
//!
//! A kind knows where its children come from (`create_provider`), how a
//! served item becomes a child (`create_child`), how a column maps to a
//! comparator, and which stable identity a node keeps across re-sorts.

use std::fmt;
use std::sync::Arc;

use heapscope_core::{
    Aggregate, ChildrenProvider, Comparator, DiffAggregate, DiffSide, EdgeRecord, Error, Item,
    LocalProvider, NodeFilter, NodeRecord, Result, SnapshotObjectId, SnapshotSource, SortField,
};
use heapscope_diff::DiffEngine;

/// Which snapshot an object node lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Target,
    Base,
}

impl From<DiffSide> for Origin {
    fn from(side: DiffSide) -> Self {
        match side {
            DiffSide::Added => Self::Target,
            DiffSide::Removed => Self::Base,
        }
    }
}

/// Identity of a node that survives re-sorting. Never a position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChildIdentity {
    Class(String),
    Object(SnapshotObjectId),
    Edge(usize),
    Allocation(u32),
}

/// The edge a child was reached through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeLabel {
    pub name: String,
    pub edge_type: String,
    pub edge_index: usize,
}

impl EdgeLabel {
    fn of(edge: &EdgeRecord) -> Self {
        Self {
            name: edge.name.clone(),
            edge_type: edge.edge_type.clone(),
            edge_index: edge.edge_index,
        }
    }
}

/// Snapshots and filter a grid's providers are created from.
#[derive(Clone)]
pub struct GridSources {
    pub target: Arc<dyn SnapshotSource>,
    pub base: Option<Arc<dyn SnapshotSource>>,
    pub diff: Option<Arc<DiffEngine>>,
    pub filter: NodeFilter,
}

impl GridSources {
    pub fn new(target: Arc<dyn SnapshotSource>) -> Self {
        Self {
            target,
            base: None,
            diff: None,
            filter: NodeFilter::all(),
        }
    }

    #[must_use]
    pub fn with_base(mut self, base: Arc<dyn SnapshotSource>) -> Self {
        self.base = Some(base);
        self
    }

    #[must_use]
    pub fn with_diff(mut self, diff: Arc<DiffEngine>) -> Self {
        self.diff = Some(diff);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: NodeFilter) -> Self {
        self.filter = filter;
        self
    }

    fn snapshot(&self, origin: Origin) -> Result<&Arc<dyn SnapshotSource>> {
        match origin {
            Origin::Target => Ok(&self.target),
            Origin::Base => self
                .base
                .as_ref()
                .ok_or_else(|| Error::invalid_request("no base snapshot attached")),
        }
    }

    fn diff(&self) -> Result<&Arc<DiffEngine>> {
        self.diff
            .as_ref()
            .ok_or_else(|| Error::invalid_request("no diff attached"))
    }
}

impl fmt::Debug for GridSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridSources")
            .field("base", &self.base.is_some())
            .field("diff", &self.diff.is_some())
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Root listing the target's classes.
    Summary,
    /// One class; children are its instances.
    Constructor { aggregate: Aggregate },
    /// A heap object; children are its outgoing edges.
    Object {
        node: NodeRecord,
        edge: Option<EdgeLabel>,
        origin: Origin,
    },
    /// A heap object; children are the edges retaining it.
    Retaining {
        node: NodeRecord,
        edge: Option<EdgeLabel>,
        origin: Origin,
    },
    /// Root listing the classes that changed between two snapshots.
    DiffSummary,
    /// One changed class; children are its added then removed objects.
    Diff { row: DiffAggregate },
    /// An allocation site; children are the objects allocated there.
    Allocation { trace_node_id: u32, name: String },
}

impl NodeKind {
    pub async fn create_provider(&self, sources: &GridSources) -> Result<Arc<dyn ChildrenProvider>> {
        match self {
            Self::Summary => {
                let aggregates = sources.target.aggregates_with_filter(&sources.filter).await?;
                let items = aggregates.into_values().map(Item::Class).collect();
                Ok(Arc::new(LocalProvider::new(items)))
            }
            Self::Constructor { aggregate } => sources
                .target
                .create_nodes_provider_for_class(&aggregate.name, &sources.filter),
            Self::Object { node, origin, .. } => sources
                .snapshot(*origin)?
                .create_edges_provider(node.node_index),
            Self::Retaining { node, origin, .. } => sources
                .snapshot(*origin)?
                .create_retaining_edges_provider(node.node_index),
            Self::DiffSummary => Ok(Arc::new(sources.diff()?.summary_provider())),
            Self::Diff { row } => match sources.diff()?.provider_for(row.name())? {
                Some(provider) => Ok(Arc::new(provider)),
                None => Ok(Arc::new(LocalProvider::new(Vec::new()))),
            },
            Self::Allocation { trace_node_id, .. } => sources
                .target
                .create_nodes_provider(&NodeFilter::allocation(*trace_node_id)),
        }
    }

    /// Kind of the child built from a served item.
    pub fn create_child(&self, item: Item) -> Result<Self> {
        match (self, item) {
            (Self::Summary, Item::Class(aggregate)) => Ok(Self::Constructor { aggregate }),
            (Self::Constructor { .. } | Self::Allocation { .. }, Item::Node(node)) => Ok(Self::Object {
                node,
                edge: None,
                origin: Origin::Target,
            }),
            (Self::Object { origin, .. }, Item::Edge(edge)) => Ok(Self::Object {
                edge: Some(EdgeLabel::of(&edge)),
                node: edge.node,
                origin: *origin,
            }),
            (Self::Retaining { origin, .. }, Item::Edge(edge)) => Ok(Self::Retaining {
                edge: Some(EdgeLabel::of(&edge)),
                node: edge.node,
                origin: *origin,
            }),
            (Self::DiffSummary, Item::DiffClass(row)) => Ok(Self::Diff { row }),
            (Self::Diff { .. }, Item::DiffNode { side, node }) => Ok(Self::Object {
                node,
                edge: None,
                origin: side.into(),
            }),
            (kind, item) => Err(Error::invalid_request(format!(
                "{} node cannot hold {:?}",
                kind.kind_name(),
                item.name()
            ))),
        }
    }

    /// Comparator for sorting this node's children by `column`.
    pub fn comparator(&self, column: SortField, ascending: bool) -> Comparator {
        match self {
            Self::Summary | Self::DiffSummary => {
                Comparator::new(column, ascending, SortField::Name, true)
            }
            Self::Object { .. } | Self::Retaining { .. } => {
                let primary = if column == SortField::Name {
                    SortField::EdgeName
                } else {
                    column
                };
                let secondary = if primary == SortField::EdgeName {
                    SortField::Id
                } else {
                    SortField::EdgeName
                };
                Comparator::new(primary, ascending, secondary, true)
            }
            Self::Constructor { .. } | Self::Diff { .. } | Self::Allocation { .. } => {
                Comparator::new(column, ascending, SortField::Id, true)
            }
        }
    }

    /// Identity of the child an item would become.
    pub fn child_identity(&self, item: Item) -> Option<ChildIdentity> {
        self.create_child(item).ok().and_then(|child| child.identity())
    }

    pub fn identity(&self) -> Option<ChildIdentity> {
        match self {
            Self::Summary | Self::DiffSummary => None,
            Self::Constructor { aggregate } => Some(ChildIdentity::Class(aggregate.name.clone())),
            Self::Diff { row } => Some(ChildIdentity::Class(row.name().to_string())),
            Self::Object { node, edge, .. } | Self::Retaining { node, edge, .. } => Some(match edge {
                Some(edge) => ChildIdentity::Edge(edge.edge_index),
                None => ChildIdentity::Object(node.id),
            }),
            Self::Allocation { trace_node_id, .. } => Some(ChildIdentity::Allocation(*trace_node_id)),
        }
    }

    /// The heap object this node stands for, used to detect cycles.
    pub fn remote_object(&self) -> Option<(Origin, SnapshotObjectId)> {
        match self {
            Self::Object { node, origin, .. } | Self::Retaining { node, origin, .. } => {
                Some((*origin, node.id))
            }
            _ => None,
        }
    }

    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Constructor { .. } => "constructor",
            Self::Object { .. } => "object",
            Self::Retaining { .. } => "retaining",
            Self::DiffSummary => "diff summary",
            Self::Diff { .. } => "diff",
            Self::Allocation { .. } => "allocation",
        }
    }

    /// One-line description for text output.
    pub fn label(&self) -> String {
        match self {
            Self::Summary => "Summary".to_string(),
            Self::DiffSummary => "Comparison".to_string(),
            Self::Constructor { aggregate } => format!(
                "{} x{} self={} retained<={}",
                aggregate.name, aggregate.count, aggregate.self_size, aggregate.max_retained_size
            ),
            Self::Object { node, edge, origin } | Self::Retaining { node, edge, origin } => {
                let marker = match origin {
                    Origin::Target => "",
                    Origin::Base => "[removed] ",
                };
                match edge {
                    Some(edge) => format!("{marker}{} :: {} @{}", edge.name, node.name, node.id),
                    None => format!("{marker}{} @{} self={}", node.name, node.id, node.self_size),
                }
            }
            Self::Diff { row } => format!(
                "{} +{} -{} ({:+}) size {:+}",
                row.name(),
                row.added_count(),
                row.removed_count(),
                row.count_delta(),
                row.size_delta()
            ),
            Self::Allocation { name, trace_node_id } => format!("{name} #{trace_node_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn record(id: u64, name: &str) -> NodeRecord {
        NodeRecord {
            id,
            name: name.to_string(),
            node_type: "object".to_string(),
            node_index: id as usize,
            self_size: 8,
            retained_size: 8,
            distance: 1,
        }
    }

    fn edge(index: usize, name: &str, to: NodeRecord) -> Item {
        Item::Edge(EdgeRecord {
            name: name.to_string(),
            edge_type: "property".to_string(),
            edge_index: index,
            node: to,
        })
    }

    #[test]
    fn test_object_children_are_objects_reached_by_edge() {
        let parent = NodeKind::Object {
            node: record(1, "Root"),
            edge: None,
            origin: Origin::Base,
        };
        let child = parent.create_child(edge(4, "next", record(2, "Link"))).unwrap();
        assert_eq!(child.identity(), Some(ChildIdentity::Edge(4)));
        assert_eq!(child.remote_object(), Some((Origin::Base, 2)));
        assert_eq!(child.label(), "[removed] next :: Link @2");
    }

    #[test]
    fn test_diff_children_take_their_side() {
        let parent = NodeKind::Diff {
            row: DiffAggregate::new("Link".to_string(), 1, 1, 8, 8, vec![0]),
        };
        let removed = parent
            .create_child(Item::DiffNode {
                side: DiffSide::Removed,
                node: record(9, "Link"),
            })
            .unwrap();
        assert_eq!(removed.remote_object(), Some((Origin::Base, 9)));
        assert_eq!(removed.identity(), Some(ChildIdentity::Object(9)));
    }

    #[test]
    fn test_mismatched_item_is_rejected() {
        let result = NodeKind::Summary.create_child(Item::Node(record(1, "Link")));
        assert!(matches!(result, Err(Error::InvalidRequest { .. })));
        assert_eq!(NodeKind::Summary.child_identity(Item::Node(record(1, "Link"))), None);
    }

    #[test]
    fn test_edge_lists_sort_name_column_by_edge_name() {
        let kind = NodeKind::Retaining {
            node: record(1, "Root"),
            edge: None,
            origin: Origin::Target,
        };
        let comparator = kind.comparator(SortField::Name, false);
        assert_eq!(comparator.field1, SortField::EdgeName);
        assert_eq!(comparator.field2, SortField::Id);

        let by_size = kind.comparator(SortField::RetainedSize, true);
        assert_eq!(by_size.field2, SortField::EdgeName);
    }
}
