use chrono::{Datelike, Months, NaiveDate};
use log::{debug, warn};

use super::error::{EngineError, Result};
use super::returns::ReturnProvider;
use super::rng::RandomSource;
use super::types::{ClientProfile, ExpenseMode, MonthlyDataPoint, SimulationResult};

#[derive(Debug, Clone, Copy, Default)]
struct GrowthState {
    portfolio_value: f64,
    cumulative_investment: f64,
}

impl GrowthState {
    /// Contributions join the portfolio before the period's return is applied.
    fn advance(&mut self, investment: f64, blended_return: f64) {
        self.portfolio_value = (self.portfolio_value + investment) * (1.0 + blended_return);
        self.cumulative_investment += investment;
    }

    fn cumulative_profit(&self) -> f64 {
        self.portfolio_value - self.cumulative_investment
    }
}

/// Simulates one client month by month from its start date up to, but not
/// including, the calendar month of `now`.
///
/// The series depends only on the profile, the return table, the random source
/// keys and the number of elapsed months, so a later `now` extends an earlier
/// result without changing its existing periods.
///
/// `random` is only consulted for demo profiles; passing `None` for a demo
/// profile is rejected up front.
pub fn simulate<P: ReturnProvider + ?Sized>(
    profile: &ClientProfile,
    provider: &P,
    random: Option<&dyn RandomSource>,
    now: NaiveDate,
) -> Result<SimulationResult> {
    validate_profile(profile, random.is_some(), now)?;
    profile.allocations.ensure_tracks_known(provider)?;

    let periods = elapsed_months(profile.start_date, now);
    if periods == 0 {
        warn!(
            "client {} starts in the current month; no completed periods to simulate",
            profile.id
        );
    }

    let mut state = GrowthState::default();
    let mut series = Vec::with_capacity(periods as usize);
    for period_index in 1..=periods {
        let date = period_date(profile.start_date, period_index)?;
        let expense = period_expense(profile, random, period_index);
        let investment = expense * profile.investment_percentage / 100.0;
        let blended_return = profile.allocations.blend(period_index, provider)?;

        state.advance(investment, blended_return);

        series.push(MonthlyDataPoint {
            period_index,
            date,
            expense,
            investment,
            blended_return,
            portfolio_value: state.portfolio_value,
            cumulative_investment: state.cumulative_investment,
            cumulative_profit: state.cumulative_profit(),
        });
    }

    debug!(
        "simulated client {}: {} periods, portfolio value {:.2}",
        profile.id,
        series.len(),
        state.portfolio_value
    );

    Ok(SimulationResult {
        client_id: profile.id.clone(),
        start_date: profile.start_date,
        series,
    })
}

/// Simulates every profile, failing on the first invalid one.
pub fn simulate_all<P: ReturnProvider + ?Sized>(
    profiles: &[ClientProfile],
    provider: &P,
    random: Option<&dyn RandomSource>,
    now: NaiveDate,
) -> Result<Vec<SimulationResult>> {
    profiles
        .iter()
        .map(|profile| simulate(profile, provider, random, now))
        .collect()
}

fn validate_profile(profile: &ClientProfile, has_random: bool, now: NaiveDate) -> Result<()> {
    if profile.id.trim().is_empty() {
        return Err(EngineError::InvalidProfile("id must not be empty".to_string()));
    }

    if profile.start_date > now {
        return Err(EngineError::InvalidProfile(format!(
            "start date {} is in the future (now {now})",
            profile.start_date
        )));
    }

    let pct = profile.investment_percentage;
    if !pct.is_finite() || pct <= 0.0 || pct > 100.0 {
        return Err(EngineError::InvalidProfile(format!(
            "investment percentage must be in (0, 100], got {pct}"
        )));
    }

    if let Some(income) = profile.monthly_income {
        if !income.is_finite() || income < 0.0 {
            return Err(EngineError::InvalidProfile(
                "monthly income must be >= 0".to_string(),
            ));
        }
    }

    match profile.expense_mode {
        ExpenseMode::Fixed => {
            if let Some(bad) = profile
                .monthly_expense_distribution
                .iter()
                .find(|c| !c.amount.is_finite() || c.amount < 0.0)
            {
                return Err(EngineError::InvalidProfile(format!(
                    "expense '{}' must be >= 0",
                    bad.category
                )));
            }
        }
        ExpenseMode::Demo { min, max } => {
            if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
                return Err(EngineError::InvalidProfile(format!(
                    "demo expense range [{min}, {max}] is invalid"
                )));
            }
            if !has_random {
                return Err(EngineError::InvalidProfile(
                    "demo profiles require a seeded random source".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn period_expense(
    profile: &ClientProfile,
    random: Option<&dyn RandomSource>,
    period_index: u32,
) -> f64 {
    match (profile.expense_mode, random) {
        (ExpenseMode::Demo { min, max }, Some(random)) => {
            min + (max - min) * random.unit(&profile.id, period_index)
        }
        _ => profile.fixed_monthly_expense(),
    }
}

/// Completed calendar months between `start` and `now`, excluding the month of `now`.
fn elapsed_months(start: NaiveDate, now: NaiveDate) -> u32 {
    let months = (now.year() as i64 - start.year() as i64) * 12 + now.month0() as i64
        - start.month0() as i64;
    months.max(0) as u32
}

fn period_date(start: NaiveDate, period_index: u32) -> Result<NaiveDate> {
    start
        .checked_add_months(Months::new(period_index - 1))
        .ok_or_else(|| {
            EngineError::InvalidProfile(format!(
                "period {period_index} after {start} is out of the supported date range"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::allocation::{AllocationEntry, AllocationSet};
    use crate::core::returns::{HistoricalReturns, sample_tracks};
    use crate::core::rng::SeededRandom;
    use crate::core::types::ExpenseCategory;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    struct NeverCalled;

    impl RandomSource for NeverCalled {
        fn unit(&self, _client_id: &str, _period_index: u32) -> f64 {
            panic!("live profiles must not draw random expenses");
        }
    }

    fn sample_profile() -> ClientProfile {
        ClientProfile {
            id: "client-1".to_string(),
            name: "Dana Levi".to_string(),
            profession: "Engineer".to_string(),
            monthly_income: Some(18_000.0),
            monthly_expense_distribution: vec![
                ExpenseCategory {
                    category: "housing".to_string(),
                    amount: 1_500.0,
                },
                ExpenseCategory {
                    category: "groceries".to_string(),
                    amount: 500.0,
                },
            ],
            expense_mode: ExpenseMode::Fixed,
            investment_percentage: 50.0,
            allocations: AllocationSet::new(vec![
                AllocationEntry::new("SPY500", 60.0),
                AllocationEntry::new("NASDAQ", 40.0),
            ])
            .expect("valid allocation"),
            start_date: date(2022, 1, 10),
        }
    }

    fn demo_profile() -> ClientProfile {
        let mut profile = sample_profile();
        profile.id = "demo-7".to_string();
        profile.expense_mode = ExpenseMode::Demo {
            min: 2_000.0,
            max: 8_000.0,
        };
        profile
    }

    #[test]
    fn oracle_first_period_matches_hand_calculation() {
        let table = HistoricalReturns::new()
            .with_track("SPY500", vec![0.02])
            .and_then(|t| t.with_track("NASDAQ", vec![0.03]))
            .expect("valid table");
        let mut profile = sample_profile();
        profile.start_date = date(2024, 1, 15);

        let result =
            simulate(&profile, &table, None, date(2024, 2, 10)).expect("valid simulation");

        assert_eq!(result.series.len(), 1);
        let point = result.series[0];
        assert_eq!(point.period_index, 1);
        assert_eq!(point.date, date(2024, 1, 15));
        assert_approx(point.investment, 1_000.0);
        assert_approx(point.blended_return, 0.024);
        assert_approx(point.portfolio_value, 1_024.0);
        assert_approx(point.cumulative_investment, 1_000.0);
        assert_approx(point.cumulative_profit, 24.0);
    }

    #[test]
    fn oracle_second_period_compounds_previous_value() {
        let table = HistoricalReturns::new()
            .with_track("SPY500", vec![0.10, -0.05])
            .expect("valid table");
        let mut profile = sample_profile();
        profile.allocations = AllocationSet::single("SPY500");
        profile.start_date = date(2024, 1, 1);

        let result =
            simulate(&profile, &table, None, date(2024, 3, 1)).expect("valid simulation");

        assert_eq!(result.series.len(), 2);
        assert_approx(result.series[0].portfolio_value, 1_100.0);
        assert_approx(result.series[1].portfolio_value, (1_100.0 + 1_000.0) * 0.95);
        assert_approx(result.series[1].cumulative_investment, 2_000.0);
        assert_approx(result.series[1].cumulative_profit, -5.0);
        assert_eq!(result.series[1].date, date(2024, 2, 1));
    }

    #[test]
    fn current_month_start_yields_empty_series() {
        let mut profile = sample_profile();
        profile.start_date = date(2024, 6, 1);

        let result =
            simulate(&profile, &sample_tracks(), None, date(2024, 6, 28)).expect("valid");
        assert!(result.series.is_empty());
    }

    #[test]
    fn periods_stop_before_the_current_month() {
        let profile = sample_profile();
        let result =
            simulate(&profile, &sample_tracks(), None, date(2024, 1, 1)).expect("valid");

        assert_eq!(result.series.len(), 24);
        assert_eq!(result.series.last().map(|p| p.date), Some(date(2023, 12, 10)));
    }

    #[test]
    fn month_end_start_dates_clamp_forward() {
        let mut profile = sample_profile();
        profile.start_date = date(2024, 1, 31);

        let result =
            simulate(&profile, &sample_tracks(), None, date(2024, 4, 2)).expect("valid");
        let dates = result.series.iter().map(|p| p.date).collect::<Vec<_>>();
        assert_eq!(dates, vec![date(2024, 1, 31), date(2024, 2, 29), date(2024, 3, 31)]);
    }

    #[test]
    fn simulate_rejects_future_start_date() {
        let mut profile = sample_profile();
        profile.start_date = date(2030, 1, 1);

        let err = simulate(&profile, &sample_tracks(), None, date(2024, 1, 1))
            .expect_err("future start must fail");
        assert!(matches!(err, EngineError::InvalidProfile(msg) if msg.contains("future")));
    }

    #[test]
    fn simulate_rejects_investment_percentage_out_of_range() {
        for pct in [0.0, -5.0, 100.5, f64::NAN] {
            let mut profile = sample_profile();
            profile.investment_percentage = pct;
            let err = simulate(&profile, &sample_tracks(), None, date(2024, 1, 1));
            assert!(
                matches!(err, Err(EngineError::InvalidProfile(_))),
                "pct {pct} must be rejected"
            );
        }
    }

    #[test]
    fn simulate_rejects_unknown_track_before_any_period() {
        let mut profile = sample_profile();
        profile.allocations = AllocationSet::single("CRYPTO");

        let err = simulate(&profile, &sample_tracks(), None, date(2024, 1, 1));
        assert_eq!(err, Err(EngineError::UnknownTrack("CRYPTO".to_string())));
    }

    #[test]
    fn demo_profile_requires_random_source() {
        let err = simulate(&demo_profile(), &sample_tracks(), None, date(2024, 1, 1));
        assert!(matches!(err, Err(EngineError::InvalidProfile(_))));
    }

    #[test]
    fn demo_profile_rejects_inverted_range() {
        let mut profile = demo_profile();
        profile.expense_mode = ExpenseMode::Demo {
            min: 5_000.0,
            max: 1_000.0,
        };
        let random = SeededRandom::new(1);
        let err = simulate(&profile, &sample_tracks(), Some(&random), date(2024, 1, 1));
        assert!(matches!(err, Err(EngineError::InvalidProfile(_))));
    }

    #[test]
    fn fixed_profile_never_touches_random_source() {
        let result = simulate(
            &sample_profile(),
            &sample_tracks(),
            Some(&NeverCalled),
            date(2024, 1, 1),
        )
        .expect("valid");
        assert!(result.series.iter().all(|p| p.expense == 2_000.0));
    }

    #[test]
    fn demo_expenses_are_bounded_and_reproducible() {
        let random = SeededRandom::new(42);
        let first = simulate(&demo_profile(), &sample_tracks(), Some(&random), date(2024, 1, 1))
            .expect("valid");
        let second = simulate(&demo_profile(), &sample_tracks(), Some(&random), date(2024, 1, 1))
            .expect("valid");

        assert_eq!(first, second);
        assert!(
            first
                .series
                .iter()
                .all(|p| (2_000.0..=8_000.0).contains(&p.expense))
        );
    }

    #[test]
    fn simulate_all_fails_fast_on_invalid_profile() {
        let mut bad = sample_profile();
        bad.investment_percentage = 0.0;
        let profiles = vec![sample_profile(), bad];

        let err = simulate_all(&profiles, &sample_tracks(), None, date(2024, 1, 1));
        assert!(matches!(err, Err(EngineError::InvalidProfile(_))));
    }

    #[test]
    fn elapsed_months_counts_calendar_boundaries() {
        assert_eq!(elapsed_months(date(2024, 1, 31), date(2024, 2, 1)), 1);
        assert_eq!(elapsed_months(date(2023, 11, 1), date(2024, 2, 28)), 3);
        assert_eq!(elapsed_months(date(2024, 5, 1), date(2024, 2, 28)), 0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_series_invariants_hold_every_period(
            seed in 0_u64..1_000,
            spy_pct in 0_u32..=100,
            invest_pct in 1_u32..=100,
            months in 1_u32..120,
        ) {
            let mut profile = demo_profile();
            profile.investment_percentage = invest_pct as f64;
            profile.allocations = AllocationSet::new(vec![
                AllocationEntry::new("SPY500", spy_pct as f64),
                AllocationEntry::new("BONDS", (100 - spy_pct) as f64),
            ])
            .expect("valid allocation");
            profile.start_date = date(2015, 3, 1);
            let now = date(2015, 3, 1)
                .checked_add_months(Months::new(months))
                .expect("valid date");
            let random = SeededRandom::new(seed);

            let result = simulate(&profile, &sample_tracks(), Some(&random), now)
                .expect("valid simulation");
            prop_assert_eq!(result.series.len(), months as usize);

            let mut prev_value = 0.0;
            let mut prev_cumulative = 0.0;
            for (idx, point) in result.series.iter().enumerate() {
                prop_assert_eq!(point.period_index, idx as u32 + 1);
                prop_assert_eq!(
                    point.cumulative_profit,
                    point.portfolio_value - point.cumulative_investment
                );
                prop_assert_eq!(
                    point.portfolio_value,
                    (prev_value + point.investment) * (1.0 + point.blended_return)
                );
                prop_assert!(point.cumulative_investment >= prev_cumulative);
                prev_value = point.portfolio_value;
                prev_cumulative = point.cumulative_investment;
            }
        }

        #[test]
        fn prop_later_now_extends_without_rewriting(
            seed in 0_u64..1_000,
            early in 1_u32..60,
            extra in 0_u32..60,
        ) {
            let profile = demo_profile();
            let random = SeededRandom::new(seed);
            let early_now = profile
                .start_date
                .checked_add_months(Months::new(early))
                .expect("valid date");
            let late_now = early_now
                .checked_add_months(Months::new(extra))
                .expect("valid date");

            let short = simulate(&profile, &sample_tracks(), Some(&random), early_now)
                .expect("valid simulation");
            let long = simulate(&profile, &sample_tracks(), Some(&random), late_now)
                .expect("valid simulation");

            prop_assert!(long.series.len() >= short.series.len());
            prop_assert_eq!(&long.series[..short.series.len()], &short.series[..]);
        }
    }
}
