//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// heapscope - heap snapshot explorer
#[derive(Parser, Debug)]
#[command(name = "heapscope")]
#[command(version)]
#[command(about = "Browse and compare heap snapshots held by a background worker")]
#[command(
    long_about = "heapscope loads heap snapshots into a worker and browses them one window at a time, so only the rows being looked at ever leave the worker."
)]
pub struct Cli {
    /// Explorer configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Per-class counts and sizes
    Summary {
        /// Snapshot file
        snapshot: PathBuf,

        /// Show at most this many classes
        #[arg(short, long, default_value_t = 25)]
        limit: usize,
    },

    /// List instances of one class through the windowed tree
    Browse {
        /// Snapshot file
        snapshot: PathBuf,

        /// Class to list
        #[arg(short, long)]
        class: String,

        /// First position to retrieve
        #[arg(long, default_value_t = 0)]
        from: usize,

        /// End of the retrieved window (defaults to one page)
        #[arg(long)]
        to: Option<usize>,
    },

    /// Per-class changes between two snapshots
    Diff {
        /// Earlier snapshot
        base: PathBuf,

        /// Later snapshot
        target: PathBuf,
    },

    /// Size breakdown by node type
    Stats {
        /// Snapshot file
        snapshot: PathBuf,
    },

    /// Find objects by name, or by `@id`
    Search {
        /// Snapshot file
        snapshot: PathBuf,

        /// Substring, regex or `@id`
        query: String,

        /// Treat the query as a regular expression
        #[arg(long, default_value_t = false)]
        regex: bool,

        /// Match case exactly
        #[arg(long, default_value_t = false)]
        case_sensitive: bool,
    },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["heapscope", "stats", "heap.json", "--json"]).unwrap();
        assert!(cli.json);
        assert!(cli.config.is_none());
        assert!(matches!(cli.command, Commands::Stats { .. }));
    }

    #[test]
    fn test_browse_window_arguments() {
        let cli = Cli::try_parse_from([
            "heapscope", "--config", "explorer.toml", "browse", "heap.json", "--class", "Point",
            "--from", "200",
        ])
        .unwrap();
        match cli.command {
            Commands::Browse { class, from, to, .. } => {
                assert_eq!(class, "Point");
                assert_eq!(from, 200);
                assert_eq!(to, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.config, Some(PathBuf::from("explorer.toml")));
    }

    #[test]
    fn test_browse_requires_class() {
        assert!(Cli::try_parse_from(["heapscope", "browse", "heap.json"]).is_err());
    }
}
