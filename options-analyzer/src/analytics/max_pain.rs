//! Max pain: the settlement price that minimises option writers' payout.
//!
//! For every candidate strike P (the sorted union of call and put strikes):
//! - call loss = sum over calls with K < P of (P - K) * OI
//! - put loss  = sum over puts with K > P of (K - P) * OI
//!
//! The candidate with the smallest total wins; on ties the lowest strike.
//! Arithmetic is exact (`Decimal`), so ties are real ties. Losses beyond
//! `Decimal::MAX` saturate there.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::Chain;

/// Writer losses at one candidate settlement price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PainPoint {
    pub strike: Decimal,
    pub call_loss: Decimal,
    pub put_loss: Decimal,
    pub total_loss: Decimal,
}

/// Call-side writer loss if the underlying settles at `price`.
pub fn call_loss(chain: &Chain, price: Decimal) -> Decimal {
    chain
        .calls
        .iter()
        .filter(|r| r.strike < price)
        .map(|r| weighted_distance(price - r.strike, r.open_interest))
        .fold(Decimal::ZERO, saturating_add)
}

/// Put-side writer loss if the underlying settles at `price`.
pub fn put_loss(chain: &Chain, price: Decimal) -> Decimal {
    chain
        .puts
        .iter()
        .filter(|r| r.strike > price)
        .map(|r| weighted_distance(r.strike - price, r.open_interest))
        .fold(Decimal::ZERO, saturating_add)
}

/// Total writer loss if the underlying settles at `price`.
pub fn total_loss(chain: &Chain, price: Decimal) -> Decimal {
    saturating_add(call_loss(chain, price), put_loss(chain, price))
}

fn weighted_distance(distance: Decimal, open_interest: i64) -> Decimal {
    distance
        .checked_mul(Decimal::from(open_interest))
        .unwrap_or(Decimal::MAX)
}

fn saturating_add(a: Decimal, b: Decimal) -> Decimal {
    a.checked_add(b).unwrap_or(Decimal::MAX)
}

/// Writer losses at every candidate strike, ascending.
pub fn pain_curve(chain: &Chain) -> Vec<PainPoint> {
    chain
        .strikes()
        .into_iter()
        .map(|strike| {
            let call_loss = call_loss(chain, strike);
            let put_loss = put_loss(chain, strike);
            PainPoint {
                strike,
                call_loss,
                put_loss,
                total_loss: saturating_add(call_loss, put_loss),
            }
        })
        .collect()
}

/// Max pain strike, or 0 when the chain has no strikes.
pub fn max_pain(chain: &Chain) -> Decimal {
    min_loss_point(&pain_curve(chain))
        .map(|p| p.strike)
        .unwrap_or(Decimal::ZERO)
}

/// First point with the lowest total loss.
pub fn min_loss_point(curve: &[PainPoint]) -> Option<&PainPoint> {
    curve.iter().fold(None, |best: Option<&PainPoint>, p| match best {
        Some(b) if b.total_loss <= p.total_loss => Some(b),
        _ => Some(p),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::fixtures::{chain, row};

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn two_strike_chain() -> Chain {
        chain(
            vec![row(90, 100, 0), row(110, 10, 0)],
            vec![row(90, 5, 0), row(110, 100, 0)],
        )
    }

    #[test]
    fn test_losses_at_midpoint() {
        let chain = two_strike_chain();
        assert_eq!(call_loss(&chain, d(100)), d(1000));
        assert_eq!(put_loss(&chain, d(100)), d(1000));
        assert_eq!(total_loss(&chain, d(100)), d(2000));
    }

    #[test]
    fn test_max_pain_over_candidates() {
        let chain = two_strike_chain();
        // P=90: calls none below, puts (110-90)*100 = 2000
        // P=110: calls (110-90)*100 = 2000, puts none above
        let curve = pain_curve(&chain);
        assert_eq!(curve.len(), 2);
        assert_eq!(curve[0].total_loss, d(2000));
        assert_eq!(curve[1].total_loss, d(2000));
        // Tie: first candidate wins
        assert_eq!(max_pain(&chain), d(90));
    }

    #[test]
    fn test_max_pain_is_global_minimum() {
        let chain = chain(
            vec![row(95, 300, 0), row(100, 500, 0), row(105, 900, 0), row(110, 200, 0)],
            vec![row(90, 400, 0), row(95, 800, 0), row(100, 600, 0), row(105, 100, 0)],
        );
        let pain = max_pain(&chain);
        assert!(chain.strikes().contains(&pain));

        let min = total_loss(&chain, pain);
        for strike in chain.strikes() {
            assert!(min <= total_loss(&chain, strike));
        }
        assert_eq!(pain, d(100));
    }

    #[test]
    fn test_empty_chain_returns_zero() {
        assert_eq!(max_pain(&chain(vec![], vec![])), Decimal::ZERO);
        assert!(pain_curve(&chain(vec![], vec![])).is_empty());
    }

    #[test]
    fn test_huge_open_interest_saturates() {
        use crate::data::normalize;
        use serde_json::json;

        let chain = normalize(
            "TEST",
            &json!([]),
            &json!([
                { "strike": "10000000000", "openInterest": "9000000000000000000" },
                { "strike": "100", "openInterest": 1 }
            ]),
            chain(vec![], vec![]).expiration,
            d(100),
        )
        .unwrap();

        // (1e10 - 100) * 9e18 is past Decimal::MAX
        assert_eq!(put_loss(&chain, d(100)), Decimal::MAX);
        assert_eq!(total_loss(&chain, d(100)), Decimal::MAX);
        assert_eq!(max_pain(&chain), d(10_000_000_000));
    }

    #[test]
    fn test_fractional_strikes_exact() {
        let mut calls = vec![row(0, 10, 0)];
        calls[0].strike = Decimal::new(925, 1);
        let chain = chain(calls, vec![]);
        assert_eq!(call_loss(&chain, d(100)), Decimal::new(750, 1));
    }
}
