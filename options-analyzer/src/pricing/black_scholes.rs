//! Black-Scholes implied volatility and greeks.
//!
//! Used once, upstream of the analytics core, to fill in implied volatility,
//! delta and gamma for sources that quote only prices. The core never
//! reprices.

use std::f64::consts::PI;

use statrs::distribution::{ContinuousCDF, Normal};

use crate::data::OptionType;

/// Lower bound on time to expiry, in years.
pub const MIN_TIME_TO_EXPIRY: f64 = 0.00001;

/// Volatility search bounds.
const MIN_VOL: f64 = 0.0001;
const MAX_VOL: f64 = 10.0;

/// Black-Scholes calculator for options pricing and greeks.
#[derive(Debug, Clone, Copy)]
pub struct BlackScholes {
    /// Risk-free interest rate
    pub rate: f64,
    /// Continuous dividend yield
    pub dividend: f64,
}

impl Default for BlackScholes {
    fn default() -> Self {
        Self {
            rate: 0.045,
            dividend: 0.0,
        }
    }
}

/// Implied volatility with the greeks derived from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpliedGreeks {
    pub implied_volatility: f64,
    pub delta: f64,
    pub gamma: f64,
}

impl BlackScholes {
    pub fn new(rate: f64, dividend: f64) -> Self {
        Self { rate, dividend }
    }

    fn d1(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        let numerator =
            (spot / strike).ln() + (self.rate - self.dividend + 0.5 * vol * vol) * time;
        numerator / (vol * time.sqrt())
    }

    fn d2(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        self.d1(spot, strike, time, vol) - vol * time.sqrt()
    }

    fn norm_cdf(x: f64) -> f64 {
        match Normal::new(0.0, 1.0) {
            Ok(normal) => normal.cdf(x),
            Err(_) => f64::NAN,
        }
    }

    fn norm_pdf(x: f64) -> f64 {
        (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
    }

    /// Calculate call option price.
    pub fn call_price(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        if time <= 0.0 {
            return (spot - strike).max(0.0);
        }

        let d1 = self.d1(spot, strike, time, vol);
        let d2 = self.d2(spot, strike, time, vol);

        spot * (-self.dividend * time).exp() * Self::norm_cdf(d1)
            - strike * (-self.rate * time).exp() * Self::norm_cdf(d2)
    }

    /// Calculate put option price.
    pub fn put_price(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        if time <= 0.0 {
            return (strike - spot).max(0.0);
        }

        let d1 = self.d1(spot, strike, time, vol);
        let d2 = self.d2(spot, strike, time, vol);

        strike * (-self.rate * time).exp() * Self::norm_cdf(-d2)
            - spot * (-self.dividend * time).exp() * Self::norm_cdf(-d1)
    }

    pub fn price(&self, spot: f64, strike: f64, time: f64, vol: f64, opt_type: OptionType) -> f64 {
        match opt_type {
            OptionType::Call => self.call_price(spot, strike, time, vol),
            OptionType::Put => self.put_price(spot, strike, time, vol),
        }
    }

    /// Calculate delta (puts negative).
    pub fn delta(&self, spot: f64, strike: f64, time: f64, vol: f64, opt_type: OptionType) -> f64 {
        if time <= 0.0 {
            return match opt_type {
                OptionType::Call => {
                    if spot > strike {
                        1.0
                    } else {
                        0.0
                    }
                }
                OptionType::Put => {
                    if spot < strike {
                        -1.0
                    } else {
                        0.0
                    }
                }
            };
        }

        let d1 = self.d1(spot, strike, time, vol);
        let discount = (-self.dividend * time).exp();

        match opt_type {
            OptionType::Call => discount * Self::norm_cdf(d1),
            OptionType::Put => discount * (Self::norm_cdf(d1) - 1.0),
        }
    }

    /// Calculate gamma (same for calls and puts).
    pub fn gamma(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        if time <= 0.0 || vol <= 0.0 {
            return 0.0;
        }

        let d1 = self.d1(spot, strike, time, vol);
        let discount = (-self.dividend * time).exp();

        discount * Self::norm_pdf(d1) / (spot * vol * time.sqrt())
    }

    /// Raw vega (price change per unit of volatility).
    fn raw_vega(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        spot * (-self.dividend * time).exp()
            * Self::norm_pdf(self.d1(spot, strike, time, vol))
            * time.sqrt()
    }

    /// Calculate implied volatility from option price.
    ///
    /// Newton-Raphson from a Brenner-Subrahmanyam guess, falling back to
    /// bisection when the derivative vanishes or the iteration stalls.
    /// Returns `None` when the price is outside the no-arbitrage bounds.
    pub fn implied_vol(
        &self,
        spot: f64,
        strike: f64,
        time: f64,
        price: f64,
        opt_type: OptionType,
    ) -> Option<f64> {
        if time <= 0.0 || price <= 0.0 || spot <= 0.0 || strike <= 0.0 {
            return None;
        }

        let lower = self.price(spot, strike, time, MIN_VOL, opt_type);
        let upper = self.price(spot, strike, time, MAX_VOL, opt_type);
        if price < lower || price > upper {
            return None;
        }

        let tolerance = 1e-6;

        let mut vol = ((price / spot) * (2.0 * PI / time).sqrt()).clamp(0.01, 5.0);
        for _ in 0..100 {
            let diff = self.price(spot, strike, time, vol, opt_type) - price;
            if diff.abs() < tolerance {
                return Some(vol);
            }

            let vega = self.raw_vega(spot, strike, time, vol);
            if vega.abs() < 1e-10 {
                break;
            }

            vol = (vol - diff / vega).clamp(MIN_VOL, MAX_VOL);
        }

        // Price is monotonic in volatility, so bisection always converges.
        let (mut lo, mut hi) = (MIN_VOL, MAX_VOL);
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            let diff = self.price(spot, strike, time, mid, opt_type) - price;
            if diff.abs() < tolerance {
                return Some(mid);
            }
            if diff > 0.0 {
                hi = mid;
            } else {
                lo = mid;
            }
        }

        Some(0.5 * (lo + hi))
    }

    /// Implied volatility, delta and gamma from a quoted price.
    pub fn implied_greeks(
        &self,
        spot: f64,
        strike: f64,
        time: f64,
        price: f64,
        opt_type: OptionType,
    ) -> Option<ImpliedGreeks> {
        let time = time.max(MIN_TIME_TO_EXPIRY);
        let vol = self.implied_vol(spot, strike, time, price, opt_type)?;
        Some(ImpliedGreeks {
            implied_volatility: vol,
            delta: self.delta(spot, strike, time, vol, opt_type),
            gamma: self.gamma(spot, strike, time, vol),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_black_scholes_call_price() {
        let bs = BlackScholes::new(0.05, 0.0);
        // S=100, K=100, T=1, vol=0.20 is ~10.45
        let price = bs.call_price(100.0, 100.0, 1.0, 0.20);
        assert_relative_eq!(price, 10.4506, epsilon = 0.001);
    }

    #[test]
    fn test_put_call_parity() {
        let bs = BlackScholes::new(0.05, 0.0);
        let (spot, strike, time, vol) = (100.0, 95.0, 0.75, 0.30);

        let call = bs.call_price(spot, strike, time, vol);
        let put = bs.put_price(spot, strike, time, vol);

        let parity_rhs = spot - strike * (-bs.rate * time).exp();
        assert_relative_eq!(call - put, parity_rhs, epsilon = 1e-9);
    }

    #[test]
    fn test_delta_signs() {
        let bs = BlackScholes::default();
        let call_delta = bs.delta(100.0, 100.0, 0.5, 0.25, OptionType::Call);
        let put_delta = bs.delta(100.0, 100.0, 0.5, 0.25, OptionType::Put);

        assert!(call_delta > 0.0 && call_delta < 1.0);
        assert!(put_delta < 0.0 && put_delta > -1.0);
        assert_relative_eq!(call_delta - put_delta, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gamma_positive() {
        let bs = BlackScholes::default();
        assert!(bs.gamma(100.0, 100.0, 0.5, 0.25) > 0.0);
        assert_eq!(bs.gamma(100.0, 100.0, 0.0, 0.25), 0.0);
    }

    #[test]
    fn test_implied_vol_round_trip() {
        let bs = BlackScholes::new(0.05, 0.0);
        for &(strike, opt_type) in &[(90.0, OptionType::Put), (110.0, OptionType::Call)] {
            let price = bs.price(100.0, strike, 0.5, 0.35, opt_type);
            let iv = bs.implied_vol(100.0, strike, 0.5, price, opt_type).unwrap();
            assert_relative_eq!(iv, 0.35, epsilon = 0.001);
        }
    }

    #[test]
    fn test_implied_vol_rejects_arbitrage_price() {
        let bs = BlackScholes::new(0.05, 0.0);
        // Deep ITM call quoted below intrinsic
        assert!(bs.implied_vol(100.0, 50.0, 0.5, 10.0, OptionType::Call).is_none());
        assert!(bs.implied_vol(100.0, 100.0, 0.5, 0.0, OptionType::Call).is_none());
    }

    #[test]
    fn test_implied_greeks_floor_time() {
        let bs = BlackScholes::default();
        let greeks = bs.implied_greeks(100.0, 100.0, 0.0, 0.05, OptionType::Call);
        assert!(greeks.is_some());
    }
}
