//! Sparse, windowed child list of one tree node.
//!
//! A node with `total` children holds only the ranges it has retrieved. The
//! gaps between them are shown as one placeholder slot each. Retrieved
//! ranges never overlap and are never left adjacent: a merge that closes a
//! gap joins its neighbours and the placeholder disappears.

use heapscope_core::{Error, Result};
use itertools::Either;

/// One slot of the child list as shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot<'a, T> {
    /// A retrieved child at `position` in the provider's order.
    Item { position: usize, value: &'a T },
    /// Positions `[from, to)` not retrieved yet.
    Placeholder { from: usize, to: usize },
}

/// A contiguous run of positions that has been retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievedRange {
    pub from: usize,
    pub to: usize,
}

/// What activating a placeholder should fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderAction {
    /// One page from the placeholder's start.
    NextPage,
    /// One page ending at the placeholder's end.
    PreviousPage,
    /// The whole placeholder.
    All,
}

#[derive(Debug, Clone)]
enum Segment<T> {
    Gap { from: usize, to: usize },
    Run { from: usize, items: Vec<T> },
}

impl<T> Segment<T> {
    const fn from(&self) -> usize {
        match self {
            Self::Gap { from, .. } | Self::Run { from, .. } => *from,
        }
    }

    fn to(&self) -> usize {
        match self {
            Self::Gap { to, .. } => *to,
            Self::Run { from, items } => from + items.len(),
        }
    }
}

/// Retrieved children plus placeholders, in position order.
#[derive(Debug, Clone)]
pub struct RangeWindow<T> {
    total: Option<usize>,
    segments: Vec<Segment<T>>,
}

impl<T> Default for RangeWindow<T> {
    fn default() -> Self {
        Self {
            total: None,
            segments: Vec::new(),
        }
    }
}

impl<T> RangeWindow<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total child count, known once the first range has been merged.
    pub const fn total_length(&self) -> Option<usize> {
        self.total
    }

    pub const fn is_populated(&self) -> bool {
        self.total.is_some()
    }

    /// Merge the items for `[start, end)` of a list of `total` children.
    ///
    /// Only positions not already retrieved are taken from `items`; `make`
    /// is called once for each of them, in position order. Returns how many
    /// positions were newly filled.
    pub fn merge<I>(
        &mut self,
        start: usize,
        end: usize,
        total: usize,
        items: Vec<I>,
        mut make: impl FnMut(usize, I) -> Result<T>,
    ) -> Result<usize> {
        if start > end || end > total || items.len() != end - start {
            return Err(Error::invalid_range(
                start,
                end,
                total,
                format!("cannot merge {} items", items.len()),
            ));
        }
        let fresh = self.total.is_none();
        match self.total {
            None => {
                self.total = Some(total);
                if total > 0 {
                    self.segments.push(Segment::Gap { from: 0, to: total });
                }
            }
            Some(expected) if expected != total => {
                return Err(Error::TotalLengthMismatch {
                    expected,
                    actual: total,
                });
            }
            Some(_) => {}
        }

        let fills = self.missing(start, end);
        let runs = match build_runs(&fills, start, items, &mut make) {
            Ok(runs) => runs,
            Err(e) => {
                if fresh {
                    self.total = None;
                    self.segments.clear();
                }
                return Err(e);
            }
        };
        let filled = fills.iter().map(|(lo, hi)| hi - lo).sum();

        let mut runs = runs.into_iter().peekable();
        let mut merged: Vec<Segment<T>> = Vec::with_capacity(self.segments.len() + 2 * fills.len());
        for segment in std::mem::take(&mut self.segments) {
            let (from, to) = match segment {
                Segment::Gap { from, to } => (from, to),
                run @ Segment::Run { .. } => {
                    push_coalesced(&mut merged, run);
                    continue;
                }
            };
            let mut cursor = from;
            while let Some(run) = runs.next_if(|run| run.from() < to) {
                push_coalesced(&mut merged, Segment::Gap { from: cursor, to: run.from() });
                cursor = run.to();
                push_coalesced(&mut merged, run);
            }
            push_coalesced(&mut merged, Segment::Gap { from: cursor, to });
        }

        self.segments = merged;
        Ok(filled)
    }

    /// Sub-ranges of `[from, to)` that are not retrieved yet, clamped to the
    /// total. Everything is missing before the first merge.
    pub fn missing(&self, from: usize, to: usize) -> Vec<(usize, usize)> {
        let Some(total) = self.total else {
            return if from < to { vec![(from, to)] } else { Vec::new() };
        };
        let to = to.min(total);
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Gap { from: gap_from, to: gap_to } => {
                    let (lo, hi) = ((*gap_from).max(from), (*gap_to).min(to));
                    (lo < hi).then_some((lo, hi))
                }
                Segment::Run { .. } => None,
            })
            .collect()
    }

    /// Range to fetch when the placeholder at child `slot` is activated, or
    /// `None` when that slot is not a placeholder.
    pub fn placeholder_request(
        &self,
        slot: usize,
        action: PlaceholderAction,
        page_size: usize,
    ) -> Option<(usize, usize)> {
        match self.slot(slot)? {
            Slot::Placeholder { from, to } => Some(match action {
                PlaceholderAction::NextPage => (from, to.min(from.saturating_add(page_size))),
                PlaceholderAction::PreviousPage => (to.saturating_sub(page_size).max(from), to),
                PlaceholderAction::All => (from, to),
            }),
            Slot::Item { .. } => None,
        }
    }

    /// Every slot in position order.
    pub fn slots(&self) -> impl Iterator<Item = Slot<'_, T>> {
        self.segments.iter().flat_map(|segment| match segment {
            Segment::Gap { from, to } => Either::Left(std::iter::once(Slot::Placeholder {
                from: *from,
                to: *to,
            })),
            Segment::Run { from, items } => {
                Either::Right(items.iter().enumerate().map(move |(offset, value)| Slot::Item {
                    position: from + offset,
                    value,
                }))
            }
        })
    }

    /// Slot at child index `index`.
    pub fn slot(&self, index: usize) -> Option<Slot<'_, T>> {
        self.slots().nth(index)
    }

    pub fn slot_count(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Gap { .. } => 1,
                Segment::Run { items, .. } => items.len(),
            })
            .sum()
    }

    /// Retrieved children in position order.
    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Run { items, .. } => Some(items),
                Segment::Gap { .. } => None,
            })
            .flatten()
    }

    /// Child retrieved at `position`.
    pub fn get(&self, position: usize) -> Option<&T> {
        self.segments.iter().find_map(|segment| match segment {
            Segment::Run { from, items } if position >= *from => items.get(position - from),
            _ => None,
        })
    }

    pub fn retrieved_ranges(&self) -> Vec<RetrievedRange> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Run { from, items } => Some(RetrievedRange {
                    from: *from,
                    to: from + items.len(),
                }),
                Segment::Gap { .. } => None,
            })
            .collect()
    }

    pub fn placeholder_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Gap { .. }))
            .count()
    }

    /// Number of retrieved children.
    pub fn retrieved_count(&self) -> usize {
        self.items().count()
    }

    /// Drop every child and forget the total, returning the children.
    pub fn clear(&mut self) -> Vec<T> {
        self.total = None;
        std::mem::take(&mut self.segments)
            .into_iter()
            .flat_map(|segment| match segment {
                Segment::Run { items, .. } => items,
                Segment::Gap { .. } => Vec::new(),
            })
            .collect()
    }
}

fn build_runs<I, T>(
    fills: &[(usize, usize)],
    start: usize,
    items: Vec<I>,
    make: &mut impl FnMut(usize, I) -> Result<T>,
) -> Result<Vec<Segment<T>>> {
    let mut incoming: Vec<Option<I>> = items.into_iter().map(Some).collect();
    fills
        .iter()
        .map(|&(lo, hi)| {
            let items = (lo..hi)
                .map(|position| {
                    let item = incoming
                        .get_mut(position - start)
                        .and_then(Option::take)
                        .ok_or_else(|| Error::invalid_request("merge position outside the range"))?;
                    make(position, item)
                })
                .collect::<Result<Vec<T>>>()?;
            Ok(Segment::Run { from: lo, items })
        })
        .collect()
}

fn push_coalesced<T>(segments: &mut Vec<Segment<T>>, segment: Segment<T>) {
    match segment {
        Segment::Gap { from, to } if from == to => {}
        Segment::Gap { from: next, to: end } => match segments.last_mut() {
            Some(Segment::Gap { to, .. }) if *to == next => *to = end,
            _ => segments.push(Segment::Gap { from: next, to: end }),
        },
        Segment::Run { from: next, items: more } => match segments.last_mut() {
            Some(Segment::Run { from, items }) if *from + items.len() == next => items.extend(more),
            _ => segments.push(Segment::Run { from: next, items: more }),
        },
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    fn fill(window: &mut RangeWindow<usize>, start: usize, end: usize, total: usize) -> usize {
        window
            .merge(start, end, total, (start..end).collect(), |_, item| Ok(item))
            .unwrap()
    }

    fn ranges(window: &RangeWindow<usize>) -> Vec<(usize, usize)> {
        window
            .retrieved_ranges()
            .into_iter()
            .map(|range| (range.from, range.to))
            .collect()
    }

    fn shown(window: &RangeWindow<usize>) -> Vec<String> {
        window
            .slots()
            .map(|slot| match slot {
                Slot::Item { value, .. } => value.to_string(),
                Slot::Placeholder { from, to } => format!("[{from},{to})"),
            })
            .collect()
    }

    #[test]
    fn test_first_population_adds_surrounding_placeholders() {
        let mut window = RangeWindow::new();
        assert_eq!(fill(&mut window, 3, 5, 8), 2);
        assert_eq!(shown(&window), vec!["[0,3)", "3", "4", "[5,8)"]);
        assert_eq!(window.total_length(), Some(8));
    }

    #[test]
    fn test_first_population_from_zero_has_trailing_placeholder_only() {
        let mut window = RangeWindow::new();
        fill(&mut window, 0, 2, 4);
        assert_eq!(shown(&window), vec!["0", "1", "[2,4)"]);
    }

    #[test]
    fn test_adjacent_ranges_merge() {
        let mut window = RangeWindow::new();
        fill(&mut window, 10, 20, 50);
        fill(&mut window, 20, 30, 50);
        assert_eq!(ranges(&window), vec![(10, 30)]);
        assert_eq!(window.placeholder_count(), 2);
    }

    #[test]
    fn test_closing_a_gap_removes_its_placeholder() {
        let mut window = RangeWindow::new();
        fill(&mut window, 0, 100, 1000);
        fill(&mut window, 900, 1000, 1000);
        assert_eq!(window.missing(0, 1000), vec![(100, 900)]);
        fill(&mut window, 100, 900, 1000);
        assert_eq!(ranges(&window), vec![(0, 1000)]);
        assert_eq!(window.placeholder_count(), 0);
        assert_eq!(window.slot_count(), 1000);
    }

    #[test]
    fn test_interior_gap_consumed_exactly_vanishes() {
        let mut window = RangeWindow::new();
        fill(&mut window, 0, 2, 10);
        fill(&mut window, 4, 6, 10);
        assert_eq!(shown(&window), vec!["0", "1", "[2,4)", "4", "5", "[6,10)"]);

        fill(&mut window, 2, 4, 10);
        assert_eq!(shown(&window), vec!["0", "1", "2", "3", "4", "5", "[6,10)"]);
        assert_eq!(ranges(&window), vec![(0, 6)]);
    }

    #[test]
    fn test_overlapping_merge_keeps_existing_children() {
        let mut window = RangeWindow::new();
        window
            .merge(2, 4, 6, vec![20, 30], |_, item| Ok(item))
            .unwrap();
        let filled = window
            .merge(0, 6, 6, vec![0, 1, 2, 3, 4, 5], |_, item| Ok(item))
            .unwrap();
        assert_eq!(filled, 4);
        assert_eq!(window.items().copied().collect::<Vec<_>>(), vec![0, 1, 20, 30, 4, 5]);
        assert_eq!(window.get(3), Some(&30));
    }

    #[test]
    fn test_total_mismatch_is_rejected() {
        let mut window = RangeWindow::new();
        fill(&mut window, 0, 2, 10);
        let result = window.merge(2, 4, 11, vec![2, 3], |_, item| Ok(item));
        assert_eq!(
            result,
            Err(Error::TotalLengthMismatch {
                expected: 10,
                actual: 11
            })
        );
        assert_eq!(ranges(&window), vec![(0, 2)]);
    }

    #[test]
    fn test_fully_covered_request_is_not_missing() {
        let mut window = RangeWindow::new();
        assert_eq!(window.missing(0, 5), vec![(0, 5)]);
        fill(&mut window, 0, 5, 20);
        assert!(window.missing(0, 5).is_empty());
        assert!(window.missing(2, 4).is_empty());
        assert_eq!(window.missing(3, 40), vec![(5, 20)]);
    }

    #[test]
    fn test_placeholder_requests() {
        let mut window = RangeWindow::new();
        fill(&mut window, 0, 2, 100);
        assert_eq!(window.placeholder_request(0, PlaceholderAction::All, 10), None);
        assert_eq!(
            window.placeholder_request(2, PlaceholderAction::NextPage, 10),
            Some((2, 12))
        );
        assert_eq!(
            window.placeholder_request(2, PlaceholderAction::PreviousPage, 10),
            Some((90, 100))
        );
        assert_eq!(
            window.placeholder_request(2, PlaceholderAction::All, 10),
            Some((2, 100))
        );
        assert_eq!(window.placeholder_request(3, PlaceholderAction::All, 10), None);
    }

    #[test]
    fn test_empty_list_has_no_slots() {
        let mut window: RangeWindow<usize> = RangeWindow::new();
        fill(&mut window, 0, 0, 0);
        assert!(window.is_populated());
        assert_eq!(window.slot_count(), 0);
    }

    #[test]
    fn test_clear_returns_children() {
        let mut window = RangeWindow::new();
        fill(&mut window, 1, 3, 5);
        assert_eq!(window.clear(), vec![1, 2]);
        assert!(!window.is_populated());
        assert_eq!(window.slot_count(), 0);
    }

    fn arbitrary_ranges() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
        (1usize..200).prop_flat_map(|total| {
            let range = (0..=total, 0..=total).prop_map(|(a, b)| (a.min(b), a.max(b)));
            (Just(total), prop::collection::vec(range, 1..12))
        })
    }

    proptest! {
        #[test]
        fn prop_ranges_and_placeholders_cover_total((total, requests) in arbitrary_ranges()) {
            let mut window = RangeWindow::new();
            for (start, end) in requests {
                fill(&mut window, start, end, total);

                let mut covered = 0;
                let mut previous_end: Option<usize> = None;
                let mut previous_was_run = false;
                for slot in window.slots() {
                    match slot {
                        Slot::Placeholder { from, to } => {
                            prop_assert!(from < to);
                            prop_assert_eq!(previous_end.unwrap_or(0), from);
                            prop_assert!(previous_end.is_none() || previous_was_run);
                            covered += to - from;
                            previous_end = Some(to);
                            previous_was_run = false;
                        }
                        Slot::Item { position, value } => {
                            prop_assert_eq!(previous_end.unwrap_or(0), position);
                            prop_assert_eq!(*value, position);
                            covered += 1;
                            previous_end = Some(position + 1);
                            previous_was_run = true;
                        }
                    }
                }
                prop_assert_eq!(covered, total);

                let runs = window.retrieved_ranges();
                for pair in runs.windows(2) {
                    prop_assert!(pair[0].to < pair[1].from);
                }
            }
        }
    }
}
