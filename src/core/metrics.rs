use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::{EngineError, Result};
use super::range::{DateRange, within_range};
use super::types::{AggregatedMetrics, MetricsPoint, MonthlyDataPoint, SimulationResult};

pub const PERIODIC_FEE_RATE: f64 = 0.005;
pub const ANNUALIZED_FEE_RATE: f64 = 0.02;

const DAYS_PER_YEAR: f64 = 365.25;

/// Which management-fee rate a caller is quoting.
///
/// Dashboards have used both the periodic and the annualized figure; callers
/// pick one explicitly instead of relying on a hidden constant.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeeRatePolicy {
    #[default]
    Periodic,
    Annualized,
    Custom(f64),
}

impl FeeRatePolicy {
    pub fn custom(rate: f64) -> Result<Self> {
        if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
            return Err(EngineError::InvalidFeeRate(format!(
                "custom rate must be between 0 and 1, got {rate}"
            )));
        }
        Ok(FeeRatePolicy::Custom(rate))
    }

    pub fn rate(self) -> f64 {
        match self {
            FeeRatePolicy::Periodic => PERIODIC_FEE_RATE,
            FeeRatePolicy::Annualized => ANNUALIZED_FEE_RATE,
            FeeRatePolicy::Custom(rate) => rate,
        }
    }

    pub fn fee_on(self, cumulative_investment: f64) -> f64 {
        cumulative_investment * self.rate()
    }
}

impl FromStr for FeeRatePolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "periodic" => Ok(FeeRatePolicy::Periodic),
            "annualized" | "annual" => Ok(FeeRatePolicy::Annualized),
            other => other
                .parse::<f64>()
                .map_err(|_| {
                    EngineError::InvalidFeeRate(format!(
                        "'{s}' is not periodic, annualized, or a numeric rate"
                    ))
                })
                .and_then(FeeRatePolicy::custom),
        }
    }
}

impl fmt::Display for FeeRatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeRatePolicy::Periodic => f.write_str("periodic"),
            FeeRatePolicy::Annualized => f.write_str("annualized"),
            FeeRatePolicy::Custom(rate) => write!(f, "{rate}"),
        }
    }
}

/// Scalar summary of one simulated series, as of `as_of`.
///
/// A pure reduction: the same inputs always give the same metrics.
pub fn summarize(result: &SimulationResult, fee: FeeRatePolicy, as_of: NaiveDate) -> AggregatedMetrics {
    let Some(last) = result.series.last() else {
        return AggregatedMetrics {
            total_investment: 0.0,
            portfolio_value: 0.0,
            total_profit: 0.0,
            latest_monthly_investment: 0.0,
            management_fee: 0.0,
            roi_percent: f64::NAN,
            annualized_return_percent: 0.0,
        };
    };

    let total_investment = last.cumulative_investment;
    let total_profit = last.cumulative_profit;
    let years = years_between(result.start_date, as_of);

    AggregatedMetrics {
        total_investment,
        portfolio_value: last.portfolio_value,
        total_profit,
        latest_monthly_investment: last.investment,
        management_fee: fee.fee_on(total_investment),
        roi_percent: roi_percent(total_profit, total_investment),
        annualized_return_percent: annualized_return_percent(total_profit, total_investment, years),
    }
}

/// `NaN` when nothing has been invested.
pub fn roi_percent(total_profit: f64, total_investment: f64) -> f64 {
    if total_investment == 0.0 {
        return f64::NAN;
    }
    total_profit / total_investment * 100.0
}

/// Compound annual growth of the invested total; `0` without an investment base
/// or elapsed time.
pub fn annualized_return_percent(total_profit: f64, total_investment: f64, years: f64) -> f64 {
    if total_investment == 0.0 || !years.is_finite() || years <= 0.0 {
        return 0.0;
    }
    let growth = 1.0 + total_profit / total_investment;
    if growth < 0.0 {
        return -100.0;
    }
    (growth.powf(1.0 / years) - 1.0) * 100.0
}

fn years_between(start: NaiveDate, end: NaiveDate) -> f64 {
    (end - start).num_days() as f64 / DAYS_PER_YEAR
}

/// Per-period running metrics over the whole series.
pub fn metrics_series(result: &SimulationResult, fee: FeeRatePolicy) -> Vec<MetricsPoint> {
    result
        .series
        .iter()
        .map(|point| MetricsPoint {
            period_index: point.period_index,
            date: point.date,
            cumulative_investment: point.cumulative_investment,
            portfolio_value: point.portfolio_value,
            cumulative_profit: point.cumulative_profit,
            management_fee: fee.fee_on(point.cumulative_investment),
            roi_percent: roi_percent(point.cumulative_profit, point.cumulative_investment),
        })
        .collect()
}

/// Periods of a series that fall inside `range`.
///
/// Cumulative values keep their full-history meaning; a filtered view never
/// restarts the running totals at the cutoff.
pub fn filter_series(
    series: &[MonthlyDataPoint],
    range: DateRange,
    now: NaiveDate,
) -> &[MonthlyDataPoint] {
    within_range(series, range, now)
}

pub fn filter_metrics(points: &[MetricsPoint], range: DateRange, now: NaiveDate) -> &[MetricsPoint] {
    within_range(points, range, now)
}
