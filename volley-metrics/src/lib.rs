pub mod aggregator;
pub mod outcome;
pub mod percentile;
pub mod stats;

pub use aggregator::{MetricsAggregator, RequestMetrics, RunMetrics};
pub use outcome::RequestOutcome;
pub use percentile::{PercentileMode, Percentiles};
pub use stats::RunningStats;
