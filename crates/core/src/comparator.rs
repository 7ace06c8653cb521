//! Two-key comparator applied by `sort_and_rewind`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::model::Item;

/// A sortable attribute of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortField {
    /// Object or class name.
    Name,
    /// Edge name; element indexes compare numerically.
    EdgeName,
    Id,
    Distance,
    Count,
    SelfSize,
    RetainedSize,
    AddedCount,
    RemovedCount,
    CountDelta,
    AddedSize,
    RemovedSize,
    SizeDelta,
}

/// Primary key with direction, secondary key with direction as tiebreak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Comparator {
    pub field1: SortField,
    pub ascending1: bool,
    pub field2: SortField,
    pub ascending2: bool,
}

impl Comparator {
    pub const fn new(field1: SortField, ascending1: bool, field2: SortField, ascending2: bool) -> Self {
        Self {
            field1,
            ascending1,
            field2,
            ascending2,
        }
    }

    /// Compare two items under this comparator.
    pub fn compare(&self, a: &Item, b: &Item) -> Ordering {
        directed(compare_field(self.field1, a, b), self.ascending1)
            .then_with(|| directed(compare_field(self.field2, a, b), self.ascending2))
    }
}

fn directed(ordering: Ordering, ascending: bool) -> Ordering {
    if ascending { ordering } else { ordering.reverse() }
}

enum SortKey<'a> {
    Text(&'a str),
    Number(i128),
    Missing,
}

fn compare_field(field: SortField, a: &Item, b: &Item) -> Ordering {
    match (sort_key(field, a), sort_key(field, b)) {
        (SortKey::Text(x), SortKey::Text(y)) if field == SortField::EdgeName => {
            compare_edge_names(x, y)
        }
        (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
        (SortKey::Number(x), SortKey::Number(y)) => x.cmp(&y),
        (SortKey::Missing, SortKey::Missing) => Ordering::Equal,
        (SortKey::Missing, _) => Ordering::Greater,
        (_, SortKey::Missing) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Element edges are named by index; `[2]` must sort before `[10]`.
fn compare_edge_names(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn sort_key(field: SortField, item: &Item) -> SortKey<'_> {
    match item {
        Item::Class(aggregate) => match field {
            SortField::Name | SortField::EdgeName => SortKey::Text(&aggregate.name),
            SortField::Count => SortKey::Number(aggregate.count.into()),
            SortField::SelfSize => SortKey::Number(aggregate.self_size.into()),
            SortField::RetainedSize => SortKey::Number(aggregate.max_retained_size.into()),
            SortField::Distance => SortKey::Number(aggregate.distance.into()),
            _ => SortKey::Missing,
        },
        Item::DiffClass(diff) => match field {
            SortField::Name | SortField::EdgeName => SortKey::Text(diff.name()),
            SortField::AddedCount => SortKey::Number(diff.added_count().into()),
            SortField::RemovedCount => SortKey::Number(diff.removed_count().into()),
            SortField::CountDelta => SortKey::Number(diff.count_delta().into()),
            SortField::AddedSize => SortKey::Number(diff.added_size().into()),
            SortField::RemovedSize => SortKey::Number(diff.removed_size().into()),
            SortField::SizeDelta => SortKey::Number(diff.size_delta().into()),
            _ => SortKey::Missing,
        },
        Item::Edge(edge) if field == SortField::EdgeName => SortKey::Text(&edge.name),
        _ => match item.node() {
            Some(node) => match field {
                SortField::Name | SortField::EdgeName => SortKey::Text(&node.name),
                SortField::Id => SortKey::Number(node.id.into()),
                SortField::Distance => SortKey::Number(node.distance.into()),
                SortField::SelfSize => SortKey::Number(node.self_size.into()),
                SortField::RetainedSize => SortKey::Number(node.retained_size.into()),
                _ => SortKey::Missing,
            },
            None => SortKey::Missing,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeRecord, NodeRecord};

    fn node(id: u64, name: &str, self_size: u64) -> NodeRecord {
        NodeRecord {
            id,
            name: name.to_string(),
            node_type: "object".to_string(),
            node_index: 0,
            self_size,
            retained_size: self_size,
            distance: 2,
        }
    }

    fn edge(name: &str) -> Item {
        Item::Edge(EdgeRecord {
            name: name.to_string(),
            edge_type: "element".to_string(),
            edge_index: 0,
            node: node(1, "Array", 8),
        })
    }

    #[test]
    fn test_primary_then_secondary_key() {
        let cmp = Comparator::new(SortField::SelfSize, false, SortField::Id, true);
        let a = Item::Node(node(2, "A", 100));
        let b = Item::Node(node(1, "B", 100));
        let c = Item::Node(node(3, "C", 200));

        let mut items = vec![a.clone(), b.clone(), c.clone()];
        items.sort_by(|x, y| cmp.compare(x, y));
        assert_eq!(items, vec![c, b, a]);
    }

    #[test]
    fn test_edge_names_compare_numerically() {
        let cmp = Comparator::new(SortField::EdgeName, true, SortField::RetainedSize, false);
        let mut items = vec![edge("10"), edge("next"), edge("2")];
        items.sort_by(|x, y| cmp.compare(x, y));
        let names: Vec<&str> = items.iter().map(Item::name).collect();
        assert_eq!(names, vec!["2", "10", "next"]);
    }
}
