// Domain models: counter trees, snapshot files, aggregate reports

mod counter_tree;
mod report;
mod snapshot;

pub use counter_tree::{CounterTree, CounterValue, ValueKind};
pub use report::AggregateReport;
pub use snapshot::{LAST_FLUSH_TAG, ROLLUP_TAG, Snapshot};
