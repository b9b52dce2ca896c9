use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::allocation::AllocationSet;
use super::range::Dated;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseCategory {
    pub category: String,
    pub amount: f64,
}

/// How a profile's monthly expense is obtained.
///
/// `Fixed` is the live-client mode: the expense is the sum of the distribution.
/// `Demo` draws a bounded value per period from an injected random source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ExpenseMode {
    #[default]
    Fixed,
    Demo { min: f64, max: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub profession: String,
    #[serde(default)]
    pub monthly_income: Option<f64>,
    #[serde(default)]
    pub monthly_expense_distribution: Vec<ExpenseCategory>,
    #[serde(default)]
    pub expense_mode: ExpenseMode,
    /// Share of the monthly expense invested, in percent within (0, 100].
    pub investment_percentage: f64,
    pub allocations: AllocationSet,
    pub start_date: NaiveDate,
}

impl ClientProfile {
    pub fn fixed_monthly_expense(&self) -> f64 {
        self.monthly_expense_distribution
            .iter()
            .map(|c| c.amount)
            .sum()
    }
}

/// One simulated month. `cumulative_profit == portfolio_value - cumulative_investment`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyDataPoint {
    pub period_index: u32,
    pub date: NaiveDate,
    pub expense: f64,
    pub investment: f64,
    pub blended_return: f64,
    pub portfolio_value: f64,
    pub cumulative_investment: f64,
    pub cumulative_profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub client_id: String,
    pub start_date: NaiveDate,
    pub series: Vec<MonthlyDataPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMetrics {
    pub total_investment: f64,
    pub portfolio_value: f64,
    pub total_profit: f64,
    pub latest_monthly_investment: f64,
    pub management_fee: f64,
    /// `NaN` (JSON `null`) when nothing has been invested.
    pub roi_percent: f64,
    pub annualized_return_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPoint {
    pub period_index: u32,
    pub date: NaiveDate,
    pub cumulative_investment: f64,
    pub portfolio_value: f64,
    pub cumulative_profit: f64,
    pub management_fee: f64,
    pub roi_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalMetricsPoint {
    pub date: NaiveDate,
    pub total_managed_funds: f64,
    pub cumulative_investment: f64,
    pub cumulative_profit: f64,
    pub management_fees: f64,
    pub total_clients: u32,
}

impl GlobalMetricsPoint {
    pub fn zero(date: NaiveDate) -> Self {
        Self {
            date,
            total_managed_funds: 0.0,
            cumulative_investment: 0.0,
            cumulative_profit: 0.0,
            management_fees: 0.0,
            total_clients: 0,
        }
    }

    pub(crate) fn absorb(&mut self, other: &GlobalMetricsPoint) {
        self.total_managed_funds += other.total_managed_funds;
        self.cumulative_investment += other.cumulative_investment;
        self.cumulative_profit += other.cumulative_profit;
        self.management_fees += other.management_fees;
        self.total_clients += other.total_clients;
    }
}

impl Dated for MonthlyDataPoint {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl Dated for MetricsPoint {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl Dated for GlobalMetricsPoint {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// Latest fleet-wide totals of an aggregated sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSummary {
    pub latest: GlobalMetricsPoint,
    pub roi_percent: f64,
}
