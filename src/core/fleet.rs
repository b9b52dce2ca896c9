use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use log::debug;

use super::metrics::FeeRatePolicy;
use super::range::DateRange;
use super::types::{FleetSummary, GlobalMetricsPoint, SimulationResult};

/// Combines per-client series into one dated sequence of fleet totals.
///
/// Points are bucketed by calendar month so clients with different start days
/// line up. The range keeps whole months: a month is reported when it starts on
/// or after the month holding the cutoff, so its totals do not depend on the
/// range token. A client without a point in a month contributes nothing to it;
/// several points of one client in the same month are summed and the client is
/// counted once.
pub fn aggregate(
    clients: &[SimulationResult],
    range: DateRange,
    now: NaiveDate,
    fee: FeeRatePolicy,
) -> Vec<GlobalMetricsPoint> {
    let first_month = month_start(range.cutoff(now));
    let mut fleet: BTreeMap<NaiveDate, GlobalMetricsPoint> = BTreeMap::new();

    for client in clients {
        for (month, contribution) in client_contributions(client, first_month, fee) {
            fleet
                .entry(month)
                .or_insert_with(|| GlobalMetricsPoint::zero(month))
                .absorb(&contribution);
        }
    }

    debug!(
        "aggregated {} clients into {} reporting dates (range {range})",
        clients.len(),
        fleet.len()
    );

    fleet.into_values().collect()
}

fn client_contributions(
    client: &SimulationResult,
    first_month: NaiveDate,
    fee: FeeRatePolicy,
) -> BTreeMap<NaiveDate, GlobalMetricsPoint> {
    let mut by_month: BTreeMap<NaiveDate, GlobalMetricsPoint> = BTreeMap::new();

    for point in &client.series {
        let month = month_start(point.date);
        if month < first_month {
            continue;
        }
        let slot = by_month
            .entry(month)
            .or_insert_with(|| GlobalMetricsPoint::zero(month));
        slot.total_managed_funds += point.portfolio_value;
        slot.cumulative_investment += point.cumulative_investment;
        slot.cumulative_profit += point.cumulative_profit;
        slot.management_fees += fee.fee_on(point.cumulative_investment);
        slot.total_clients = 1;
    }

    by_month
}

/// Applies the range filter to records read from a pre-aggregated store,
/// sorting them by date and summing records that share a date.
pub fn filter_global_metrics(
    records: &[GlobalMetricsPoint],
    range: DateRange,
    now: NaiveDate,
) -> Vec<GlobalMetricsPoint> {
    let mut by_date: BTreeMap<NaiveDate, GlobalMetricsPoint> = BTreeMap::new();
    for record in records.iter().filter(|r| range.includes(r.date, now)) {
        by_date
            .entry(record.date)
            .or_insert_with(|| GlobalMetricsPoint::zero(record.date))
            .absorb(record);
    }
    by_date.into_values().collect()
}

/// Latest totals of an ascending sequence; an empty fleet reports zeros dated `as_of`.
pub fn summarize_fleet(points: &[GlobalMetricsPoint], as_of: NaiveDate) -> FleetSummary {
    let latest = points
        .last()
        .copied()
        .unwrap_or_else(|| GlobalMetricsPoint::zero(as_of));
    let roi_percent = if latest.cumulative_investment == 0.0 {
        0.0
    } else {
        latest.cumulative_profit / latest.cumulative_investment * 100.0
    };
    FleetSummary {
        latest,
        roi_percent,
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}
