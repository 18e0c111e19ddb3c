pub mod detail_cache;
pub mod snapshot_store;

pub use detail_cache::DetailCache;
pub use snapshot_store::{PollError, Snapshot, SnapshotStore, StoreStatus};
