//! CLI command handlers.
//!
//! Every handler starts a worker session, loads what it needs, prints and
//! releases the worker objects it created.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use heapscope_core::{ExplorerConfig, NodeFilter, SearchConfig, SnapshotSource, SortField};
use heapscope_diff::DiffEngine;
use heapscope_tree::{GridSources, HeapGrid, NodeId, NodeKind, Slot};
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::{Cli, Commands};
use crate::report::{self, BrowseRow};
use crate::session::Session;

/// Execute a CLI command.
pub async fn execute_command(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let json = cli.json;

    match cli.command {
        Commands::Summary { snapshot, limit } => cmd_summary(config, &snapshot, limit, json).await,
        Commands::Browse {
            snapshot,
            class,
            from,
            to,
        } => cmd_browse(config, &snapshot, &class, from, to, json).await,
        Commands::Diff { base, target } => cmd_diff(config, &base, &target, json).await,
        Commands::Stats { snapshot } => cmd_stats(config, &snapshot, json).await,
        Commands::Search {
            snapshot,
            query,
            regex,
            case_sensitive,
        } => {
            let search = SearchConfig {
                query,
                case_sensitive,
                is_regex: regex,
            };
            cmd_search(config, &snapshot, search, json).await
        }
    }
}

/// Config from `path`, or the defaults.
pub fn load_config(path: Option<&Path>) -> Result<ExplorerConfig> {
    match path {
        Some(path) => ExplorerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(ExplorerConfig::default()),
    }
}

async fn cmd_summary(config: ExplorerConfig, path: &Path, limit: usize, json: bool) -> Result<()> {
    let session = Session::start(config);
    let snapshot = session.load(path).await?;
    let aggregates = snapshot.aggregates_with_filter(&NodeFilter::all()).await?;
    snapshot.dispose()?;
    session.shutdown();

    let total = aggregates.len();
    let mut classes: Vec<_> = aggregates.into_values().collect();
    classes.sort_by(|a, b| {
        b.max_retained_size
            .cmp(&a.max_retained_size)
            .then_with(|| a.name.cmp(&b.name))
    });
    classes.truncate(limit);
    info!(classes = total, shown = classes.len(), "Summary ready");

    if json {
        print_json(&classes)
    } else {
        print!("{}", report::render_summary(&classes, total));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct BrowseOutput<'a> {
    class: &'a str,
    total: usize,
    rows: Vec<BrowseRow>,
}

async fn cmd_browse(
    config: ExplorerConfig,
    path: &Path,
    class: &str,
    from: usize,
    to: Option<usize>,
    json: bool,
) -> Result<()> {
    let session = Session::start(config.clone());
    let snapshot = Arc::new(session.load(path).await?);
    let grid = HeapGrid::summary(GridSources::new(snapshot.clone()), config);

    let result = browse_class(&grid, class, from, to).await;
    grid.dispose().await;
    snapshot.dispose()?;
    session.shutdown();
    let (total, rows) = result?;

    if json {
        print_json(&BrowseOutput { class, total, rows })
    } else {
        print!("{}", report::render_browse(class, total, &rows));
        Ok(())
    }
}

/// Retrieve `[from, to)` of the instances of `class` in a summary grid and
/// describe the resulting children, placeholders included. `to` defaults
/// to one page past `from`.
pub async fn browse_class(
    grid: &HeapGrid,
    class: &str,
    from: usize,
    to: Option<usize>,
) -> Result<(usize, Vec<BrowseRow>)> {
    let root = grid.root();
    grid.expand(root).await?;
    let classes = children_total(grid, root).await?;
    if classes > 0 {
        grid.populate_range(root, 0, classes).await?;
    }

    let Some(node) = find_class(grid, root, class).await? else {
        bail!("No class named {class:?} in the snapshot");
    };
    grid.expand(node).await?;
    let total = children_total(grid, node).await?;
    let end = to.unwrap_or(from + grid.config().page_size).min(total);
    if from < end {
        let requests = grid.populate_range(node, from, end).await?;
        debug!(from, end, requests, "Browse window populated");
    }

    let tree = grid.read().await;
    let rows = tree
        .node(node)?
        .children()
        .slots()
        .map(|slot| match slot {
            Slot::Item { position, value } => Ok(BrowseRow::Object {
                position,
                label: tree.node(*value)?.kind().label(),
            }),
            Slot::Placeholder { from, to } => Ok(BrowseRow::Placeholder { from, to }),
        })
        .collect::<heapscope_core::Result<Vec<_>>>()?;
    Ok((total, rows))
}

async fn children_total(grid: &HeapGrid, id: NodeId) -> Result<usize> {
    let tree = grid.read().await;
    Ok(tree.node(id)?.children().total_length().unwrap_or(0))
}

async fn find_class(grid: &HeapGrid, root: NodeId, class: &str) -> Result<Option<NodeId>> {
    let tree = grid.read().await;
    let found = tree.node(root)?.children().items().copied().find(|id| {
        matches!(
            tree.get(*id).map(|node| node.kind()),
            Some(NodeKind::Constructor { aggregate }) if aggregate.name == class
        )
    });
    Ok(found)
}

#[derive(Debug, Serialize)]
struct DiffOutput {
    classes: Vec<heapscope_core::DiffAggregate>,
    totals: heapscope_diff::DiffTotals,
}

async fn cmd_diff(config: ExplorerConfig, base: &Path, target: &Path, json: bool) -> Result<()> {
    let session = Session::start(config);
    let base = Arc::new(session.load(base).await?);
    let target = Arc::new(session.load(target).await?);

    let engine = DiffEngine::compute(base.clone(), target.clone()).await;
    base.dispose()?;
    target.dispose()?;
    session.shutdown();
    let engine = engine?;

    let output = DiffOutput {
        classes: engine.sorted_by(SortField::SizeDelta, false),
        totals: engine.totals(),
    };
    info!(classes = output.classes.len(), "Diff ready");

    if json {
        print_json(&output)
    } else {
        print!("{}", report::render_diff(&output.classes, &output.totals));
        Ok(())
    }
}

async fn cmd_stats(config: ExplorerConfig, path: &Path, json: bool) -> Result<()> {
    let session = Session::start(config);
    let snapshot = session.load(path).await?;
    let stats = snapshot.statistics().await;
    snapshot.dispose()?;
    session.shutdown();
    let stats = stats?;

    if json {
        print_json(&stats)
    } else {
        print!("{}", report::render_stats(&stats));
        Ok(())
    }
}

async fn cmd_search(config: ExplorerConfig, path: &Path, search: SearchConfig, json: bool) -> Result<()> {
    let session = Session::start(config);
    let snapshot = session.load(path).await?;
    let ids = snapshot.search(&search, &NodeFilter::all()).await;
    snapshot.dispose()?;
    session.shutdown();
    let ids = ids?;

    if json {
        print_json(&ids)
    } else {
        print!("{}", report::render_search(&search.query, &ids));
        Ok(())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}
