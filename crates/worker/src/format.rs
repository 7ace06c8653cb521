//! JSON snapshot document accepted by the loader.
//!
//! ```json
//! {
//!   "nodes": [
//!     { "id": 1, "name": "(root)", "type": "synthetic", "self_size": 0,
//!       "edges": [ { "name": "window", "type": "property", "to": 3 } ] },
//!     { "id": 3, "name": "Window", "type": "object", "self_size": 64,
//!       "retained_size": 512, "trace_node_id": 7, "edges": [] }
//!   ],
//!   "samples": { "timestamps": [0, 1000], "last_assigned_ids": [3, 9], "sizes": [64, 128] }
//! }
//! ```
//!
//! The first node is the root. Edge targets are object ids.

use heapscope_core::Samples;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SnapshotDocument {
    pub nodes: Vec<NodeEntry>,
    #[serde(default)]
    pub samples: Option<Samples>,
}

#[derive(Debug, Deserialize)]
pub struct NodeEntry {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub self_size: u64,
    /// Defaults to the self size when the producer did not compute it.
    #[serde(default)]
    pub retained_size: Option<u64>,
    #[serde(default)]
    pub trace_node_id: Option<u32>,
    #[serde(default)]
    pub edges: Vec<EdgeEntry>,
}

#[derive(Debug, Deserialize)]
pub struct EdgeEntry {
    pub name: EdgeName,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub to: u64,
}

/// Property edges carry names, element edges carry indexes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EdgeName {
    Index(u64),
    Text(String),
}

impl EdgeName {
    pub fn into_string(self) -> String {
        match self {
            Self::Index(index) => index.to_string(),
            Self::Text(text) => text,
        }
    }
}
