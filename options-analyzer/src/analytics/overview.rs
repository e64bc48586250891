//! Chain overview: totals, put/call ratios, most active contracts and walls.
//!
//! Ratios are 0 (not infinite) when the call-side total is 0. Contracts are
//! ranked by activity (open interest * volume), highest first, with ties
//! going to the lower strike and then to source order.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::{Chain, OptionRow};

use super::profile::StrikeProfile;

/// A contract in a top-activity list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopContract {
    pub strike: Decimal,
    pub open_interest: i64,
    pub volume: i64,
    pub implied_volatility: f64,
    pub activity: i64,
}

impl From<&OptionRow> for TopContract {
    fn from(row: &OptionRow) -> Self {
        Self {
            strike: row.strike,
            open_interest: row.open_interest,
            volume: row.volume,
            implied_volatility: row.implied_volatility,
            activity: row.activity(),
        }
    }
}

/// Aggregate view of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewResult {
    pub total_call_oi: i64,
    pub total_put_oi: i64,
    pub total_call_volume: i64,
    pub total_put_volume: i64,
    /// Put/call ratio by open interest.
    pub pcr_oi: f64,
    /// Put/call ratio by volume.
    pub pcr_volume: f64,
    pub top_calls: Vec<TopContract>,
    pub top_puts: Vec<TopContract>,
    /// Strike with the most call open interest (resistance).
    pub call_wall: Option<Decimal>,
    /// Strike with the most put open interest (support).
    pub put_wall: Option<Decimal>,
}

/// Computes [`OverviewResult`]s.
#[derive(Debug, Clone)]
pub struct OverviewAnalyzer {
    top_n: usize,
}

impl Default for OverviewAnalyzer {
    fn default() -> Self {
        Self { top_n: 5 }
    }
}

impl OverviewAnalyzer {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    pub fn analyze(&self, chain: &Chain) -> OverviewResult {
        let total_call_oi = sum_by(&chain.calls, |r| r.open_interest);
        let total_put_oi = sum_by(&chain.puts, |r| r.open_interest);
        let total_call_volume = sum_by(&chain.calls, |r| r.volume);
        let total_put_volume = sum_by(&chain.puts, |r| r.volume);

        // Walls only need open interest, so the multiplier is irrelevant here
        let profile = StrikeProfile::from_chain(chain, 1.0);

        OverviewResult {
            total_call_oi,
            total_put_oi,
            total_call_volume,
            total_put_volume,
            pcr_oi: ratio(total_put_oi, total_call_oi),
            pcr_volume: ratio(total_put_volume, total_call_volume),
            top_calls: top_by_activity(&chain.calls, self.top_n),
            top_puts: top_by_activity(&chain.puts, self.top_n),
            call_wall: profile.call_wall(),
            put_wall: profile.put_wall(),
        }
    }
}

/// Overview with the default top-5 lists.
pub fn analyze_overview(chain: &Chain) -> OverviewResult {
    OverviewAnalyzer::default().analyze(chain)
}

fn sum_by<F>(rows: &[OptionRow], field: F) -> i64
where
    F: Fn(&OptionRow) -> i64,
{
    rows.iter().fold(0i64, |acc, r| acc.saturating_add(field(r)))
}

fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

/// The `n` most active rows.
pub fn top_by_activity(rows: &[OptionRow], n: usize) -> Vec<TopContract> {
    let mut ranked: Vec<&OptionRow> = rows.iter().collect();
    // Stable sort keeps source order for identical (activity, strike)
    ranked.sort_by(|a, b| {
        b.activity()
            .cmp(&a.activity())
            .then_with(|| a.strike.cmp(&b.strike))
    });
    ranked.into_iter().take(n).map(TopContract::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::fixtures::{chain, row};
    use approx::assert_relative_eq;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn test_single_strike_scenario() {
        let chain = chain(vec![row(100, 50, 10)], vec![row(100, 30, 5)]);
        let overview = analyze_overview(&chain);

        assert_eq!(overview.total_call_oi, 50);
        assert_eq!(overview.total_put_oi, 30);
        assert_eq!(overview.total_call_volume, 10);
        assert_eq!(overview.total_put_volume, 5);
        assert_relative_eq!(overview.pcr_oi, 0.60, epsilon = 1e-12);
        assert_relative_eq!(overview.pcr_volume, 0.50, epsilon = 1e-12);
        assert_eq!(overview.call_wall, Some(d(100)));
        assert_eq!(overview.put_wall, Some(d(100)));
    }

    #[test]
    fn test_zero_call_totals_give_zero_ratios() {
        let chain = chain(vec![row(100, 0, 0)], vec![row(100, 30, 5)]);
        let overview = analyze_overview(&chain);
        assert_eq!(overview.pcr_oi, 0.0);
        assert_eq!(overview.pcr_volume, 0.0);

        let empty = analyze_overview(&chain_with_no_rows());
        assert_eq!(empty.pcr_oi, 0.0);
        assert!(empty.pcr_oi.is_finite());
        assert_eq!(empty.call_wall, None);
        assert!(empty.top_calls.is_empty());
    }

    fn chain_with_no_rows() -> Chain {
        chain(vec![], vec![])
    }

    #[test]
    fn test_top_contracts_ordering_and_tie_break() {
        let calls = vec![
            row(120, 10, 10), // 100
            row(100, 20, 10), // 200
            row(110, 10, 10), // 100
            row(90, 5, 4),    // 20
            row(95, 1, 1),    // 1
            row(130, 50, 4),  // 200
            row(140, 0, 99),  // 0
        ];
        let top = top_by_activity(&calls, 5);
        let strikes: Vec<_> = top.iter().map(|c| c.strike).collect();
        assert_eq!(strikes, vec![d(100), d(130), d(110), d(120), d(90)]);
        assert_eq!(top[0].activity, 200);
    }

    #[test]
    fn test_top_contracts_shorter_than_n() {
        let top = top_by_activity(&[row(100, 1, 1)], 5);
        assert_eq!(top.len(), 1);
    }

    #[test]
    fn test_walls_in_union_and_asymmetric() {
        let chain = chain(
            vec![row(100, 10, 0), row(105, 40, 0)],
            vec![row(80, 70, 0), row(90, 20, 0)],
        );
        let overview = analyze_overview(&chain);
        let strikes = chain.strikes();
        assert_eq!(overview.call_wall, Some(d(105)));
        assert_eq!(overview.put_wall, Some(d(80)));
        assert!(strikes.contains(&overview.call_wall.unwrap()));
        assert!(strikes.contains(&overview.put_wall.unwrap()));
    }

    #[test]
    fn test_overview_is_idempotent() {
        let chain = chain(vec![row(100, 50, 10), row(110, 9, 3)], vec![row(95, 30, 5)]);
        let analyzer = OverviewAnalyzer::new(3);
        assert_eq!(analyzer.analyze(&chain), analyzer.analyze(&chain));
    }
}
