//! Maps a scroll position onto the rows that must be materialized.
//!
//! Each row is `row_height` pixels and an unretrieved placeholder stands in
//! for all of its positions, so the total height is known before anything
//! below the fold is fetched. A refresh lays the tree out top-down, fetches
//! what the band needs, then lays it out again for display.

use heapscope_core::{ExplorerConfig, Result};
use tracing::{debug, trace, warn};

use crate::grid::HeapGrid;
use crate::tree::{HeapTree, NodeId};
use crate::window::Slot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Node(NodeId),
    /// Unretrieved positions `[from, to)` at child `slot` of `parent`.
    Placeholder {
        parent: NodeId,
        slot: usize,
        from: usize,
        to: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportRow {
    pub kind: RowKind,
    pub depth: usize,
    /// Pixel offset of the row's top from the top of the whole list.
    pub offset: u64,
    pub height: u64,
}

/// Rows attached for one scroll position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewportFrame {
    pub rows: Vec<ViewportRow>,
    /// Height of everything above the first attached row.
    pub top_padding: u64,
    /// Height of everything below the last attached row.
    pub bottom_padding: u64,
    pub total_height: u64,
    band: (u64, u64),
}

impl ViewportFrame {
    /// Pixel band this frame was materialized for.
    pub const fn band(&self) -> (u64, u64) {
        self.band
    }

    fn covers(&self, top: u64, bottom: u64) -> bool {
        self.band.0 <= top && bottom <= self.band.1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fetch {
    Expand(NodeId),
    Populate { node: NodeId, from: usize, to: usize },
}

#[derive(Debug)]
pub struct Viewport {
    row_height: u64,
    guard_zone: u64,
    hysteresis: u64,
    last: Option<ViewportFrame>,
}

impl Viewport {
    pub fn new(config: &ExplorerConfig) -> Self {
        Self {
            row_height: u64::from(config.row_height.max(1)),
            guard_zone: u64::from(config.guard_zone),
            hysteresis: u64::from(config.hysteresis),
            last: None,
        }
    }

    /// Frame for a viewport of `height` pixels scrolled to `scroll_top`.
    ///
    /// Without `force`, a previous frame whose band still covers the
    /// viewport plus its guard zone is returned as is and nothing is
    /// fetched. Pass `force` after the tree changed shape. A branch whose
    /// provider fails is logged and left out of the frame.
    pub async fn refresh(
        &mut self,
        grid: &HeapGrid,
        scroll_top: u64,
        height: u64,
        force: bool,
    ) -> Result<ViewportFrame> {
        let needed = (
            scroll_top.saturating_sub(self.guard_zone),
            scroll_top.saturating_add(height).saturating_add(self.guard_zone),
        );
        let cached = self
            .last
            .as_ref()
            .filter(|frame| !force && frame.covers(needed.0, needed.1));
        if let Some(frame) = cached {
            trace!(scroll_top, height, "Viewport already covered");
            return Ok(frame.clone());
        }

        let band = (
            needed.0.saturating_sub(self.hysteresis),
            needed.1.saturating_add(self.hysteresis),
        );
        let fetches = {
            let tree = grid.read().await;
            self.layout(&tree, band).1
        };
        debug!(fetches = fetches.len(), ?band, "Refreshing viewport");
        for fetch in fetches {
            let outcome = match fetch {
                Fetch::Expand(node) => grid.expand(node).await,
                Fetch::Populate { node, from, to } => grid.populate_range(node, from, to).await.map(|_| ()),
            };
            if let Err(e) = outcome {
                warn!(?fetch, error = %e, "Branch could not be populated");
            }
        }

        let frame = {
            let tree = grid.read().await;
            self.layout(&tree, band).0
        };
        self.last = Some(frame.clone());
        Ok(frame)
    }

    /// Forget the cached frame so the next refresh rebuilds it.
    pub fn invalidate(&mut self) {
        self.last = None;
    }

    fn layout(&self, tree: &HeapTree, band: (u64, u64)) -> (ViewportFrame, Vec<Fetch>) {
        let mut layout = Layout {
            tree,
            row_height: self.row_height,
            band,
            rows: Vec::new(),
            fetches: Vec::new(),
        };
        let total_height = layout.walk(tree.root(), 0, 0);
        let top_padding = layout.rows.first().map_or(0, |row| row.offset);
        let bottom_padding = layout
            .rows
            .last()
            .map_or(total_height, |row| total_height.saturating_sub(row.offset + row.height));
        let frame = ViewportFrame {
            rows: layout.rows,
            top_padding,
            bottom_padding,
            total_height,
            band,
        };
        (frame, layout.fetches)
    }
}

struct Layout<'a> {
    tree: &'a HeapTree,
    row_height: u64,
    band: (u64, u64),
    rows: Vec<ViewportRow>,
    fetches: Vec<Fetch>,
}

impl Layout<'_> {
    fn intersects(&self, offset: u64, height: u64) -> bool {
        offset < self.band.1 && offset + height > self.band.0
    }

    /// Height of the children of `id` when shown.
    fn children_height(&self, id: NodeId) -> u64 {
        let Some(node) = self.tree.get(id) else {
            return 0;
        };
        if !node.is_expanded() {
            return 0;
        }
        node.children()
            .slots()
            .map(|slot| match slot {
                Slot::Placeholder { from, to } => (to - from) as u64 * self.row_height,
                Slot::Item { value, .. } => self.row_height + self.children_height(*value),
            })
            .sum()
    }

    /// Lay out the children of `id` starting at `offset`; returns the
    /// offset just past them.
    fn walk(&mut self, id: NodeId, depth: usize, mut offset: u64) -> u64 {
        let tree = self.tree;
        let Some(node) = tree.get(id) else {
            return offset;
        };
        if !node.is_expanded() || node.is_cycle() {
            return offset;
        }
        if !node.children().is_populated() {
            if self.intersects(offset, self.row_height) {
                self.fetches.push(Fetch::Expand(id));
            }
            return offset;
        }

        for (slot_index, slot) in node.children().slots().enumerate() {
            match slot {
                Slot::Placeholder { from, to } => {
                    let height = (to - from) as u64 * self.row_height;
                    if self.intersects(offset, height) {
                        self.rows.push(ViewportRow {
                            kind: RowKind::Placeholder {
                                parent: id,
                                slot: slot_index,
                                from,
                                to,
                            },
                            depth,
                            offset,
                            height,
                        });
                        let first = self.band.0.saturating_sub(offset) / self.row_height;
                        let last = (self.band.1.min(offset + height) - offset).div_ceil(self.row_height);
                        let (lo, hi) = (from + first as usize, (from + last as usize).min(to));
                        if lo < hi {
                            self.fetches.push(Fetch::Populate { node: id, from: lo, to: hi });
                        }
                    }
                    offset += height;
                }
                Slot::Item { value, .. } => {
                    let child = *value;
                    let height = self.row_height + self.children_height(child);
                    if self.intersects(offset, height) {
                        if self.intersects(offset, self.row_height) {
                            self.rows.push(ViewportRow {
                                kind: RowKind::Node(child),
                                depth,
                                offset,
                                height: self.row_height,
                            });
                        }
                        self.walk(child, depth + 1, offset + self.row_height);
                    }
                    offset += height;
                }
            }
        }
        offset
    }
}
