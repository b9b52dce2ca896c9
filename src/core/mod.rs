mod allocation;
mod engine;
mod error;
mod fleet;
mod metrics;
mod range;
mod returns;
mod rng;
mod types;

pub use allocation::{AllocationEntry, AllocationSet, MAX_ALLOCATION_ENTRIES};
pub use engine::{simulate, simulate_all};
pub use error::{EngineError, Result};
pub use fleet::{aggregate, filter_global_metrics, summarize_fleet};
pub use metrics::{
    ANNUALIZED_FEE_RATE, FeeRatePolicy, PERIODIC_FEE_RATE, annualized_return_percent,
    filter_metrics, filter_series, metrics_series, roi_percent, summarize,
};
pub use range::{DateRange, Dated, within_range};
pub use returns::{HistoricalReturns, ReturnProvider, sample_tracks};
pub use rng::{RandomSource, SeededRandom};
pub use types::{
    AggregatedMetrics, ClientProfile, ExpenseCategory, ExpenseMode, FleetSummary,
    GlobalMetricsPoint, MetricsPoint, MonthlyDataPoint, SimulationResult,
};
