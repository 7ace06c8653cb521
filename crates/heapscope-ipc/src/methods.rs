//! Names of the classes and methods the worker exposes.

/// Class constructed by `create`.
pub const SNAPSHOT_LOADER: &str = "HeapSnapshotLoader";

// Loader
pub const WRITE: &str = "write";
pub const CLOSE: &str = "close";
pub const BUILD_SNAPSHOT: &str = "buildSnapshot";

// Snapshot
pub const UID: &str = "uid";
pub const NODE_COUNT: &str = "nodeCount";
pub const AGGREGATES_WITH_FILTER: &str = "aggregatesWithFilter";
pub const AGGREGATES_FOR_DIFF: &str = "aggregatesForDiff";
pub const CALCULATE_SNAPSHOT_DIFF: &str = "calculateSnapshotDiff";
pub const CREATE_EDGES_PROVIDER: &str = "createEdgesProvider";
pub const CREATE_RETAINING_EDGES_PROVIDER: &str = "createRetainingEdgesProvider";
pub const CREATE_NODES_PROVIDER_FOR_CLASS: &str = "createNodesProviderForClass";
pub const CREATE_NODES_PROVIDER: &str = "createNodesProvider";
pub const CREATE_ADDED_NODES_PROVIDER: &str = "createAddedNodesProvider";
pub const CREATE_DELETED_NODES_PROVIDER: &str = "createDeletedNodesProvider";
pub const SEARCH: &str = "search";
pub const GET_STATISTICS: &str = "getStatistics";
pub const GET_SAMPLES: &str = "getSamples";

// Children provider
pub const SORT_AND_REWIND: &str = "sortAndRewind";
pub const SERIALIZE_ITEMS_RANGE: &str = "serializeItemsRange";
pub const IS_EMPTY: &str = "isEmpty";
pub const NODE_POSITION: &str = "nodePosition";

/// Event emitted while a snapshot is being built.
pub const PROGRESS_EVENT: &str = "progress";
