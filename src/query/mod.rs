//! Market list query pipeline: filter → search → stable sort over one snapshot.

pub mod compare;
pub mod filter;
pub mod pipeline;
pub mod search;
pub mod spec;

pub use compare::compare;
pub use filter::matches;
pub use pipeline::{run, run_params, QueryResult};
pub use search::matches_search;
pub use spec::{QueryParams, QuerySpec, SortKey, SortOrder};
