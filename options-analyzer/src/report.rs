//! Analysis report for one chain.
//!
//! Runs every analyzer over a chain and renders the result as text for the
//! terminal or as JSON. Per-strike tables in the text form only show strikes
//! within `strike_range_pct` of spot.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analytics::{
    max_pain, pain_curve, spot_window, ExposureProfileBuilder, ExposureResult, OverviewAnalyzer,
    OverviewResult, PainPoint, StrikeProfile, TopContract, VolatilitySkew,
};
use crate::config::AnalysisConfig;
use crate::data::Chain;

const SEPARATOR: &str = "============================================================";

/// Everything computed for a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub ticker: String,
    pub expiration: NaiveDate,
    pub spot: Decimal,
    pub overview: OverviewResult,
    /// Per-strike open interest and volume.
    pub profile: StrikeProfile,
    pub max_pain: Decimal,
    pub pain_curve: Vec<PainPoint>,
    pub exposure: ExposureResult,
    pub skew: VolatilitySkew,
    /// Put IV minus call IV at the strike nearest spot.
    pub put_call_iv_spread: Option<f64>,
    /// Half-width of the text tables' strike window as a fraction of spot.
    pub strike_range_pct: f64,
}

/// One line of the exposure table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExposureRow {
    pub strike: Decimal,
    pub call_oi: i64,
    pub put_oi: i64,
    pub net_gex: f64,
    pub net_dex: f64,
    pub cumulative_gex: f64,
    pub cumulative_dex: f64,
}

impl AnalysisReport {
    pub fn build(chain: &Chain, config: &AnalysisConfig) -> Self {
        let skew = VolatilitySkew::from_chain(chain, config.atm_band_pct);
        Self {
            ticker: chain.ticker.clone(),
            expiration: chain.expiration,
            spot: chain.underlying_spot,
            overview: OverviewAnalyzer::new(config.top_n).analyze(chain),
            profile: StrikeProfile::from_chain(chain, config.contract_multiplier),
            max_pain: max_pain(chain),
            pain_curve: pain_curve(chain),
            exposure: ExposureProfileBuilder::new(config.contract_multiplier).build(chain),
            put_call_iv_spread: skew.put_call_spread_near(chain.underlying_spot),
            skew,
            strike_range_pct: config.strike_range_pct,
        }
    }

    /// Gamma flip for display.
    pub fn gamma_flip_label(&self) -> String {
        label(self.exposure.gamma_flip, "N/A")
    }

    /// One line for directory summaries.
    pub fn summary_line(&self) -> String {
        let exposure = if self.exposure.is_available() {
            format!(
                "flip {} hvl {} net GEX {:.0}",
                self.gamma_flip_label(),
                label(self.exposure.hvl_strike, "N/A"),
                self.exposure.total_net_gex()
            )
        } else {
            "greeks unavailable".to_string()
        };
        format!(
            "{} {} spot {} | PCR(OI) {:.2} | max pain {} | walls {}/{} | {}",
            self.ticker,
            self.expiration,
            self.spot,
            self.overview.pcr_oi,
            self.max_pain,
            label(self.overview.call_wall, "-"),
            label(self.overview.put_wall, "-"),
            exposure
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn in_window(&self, strike: Decimal) -> bool {
        let (min, max) = spot_window(self.spot, self.strike_range_pct);
        strike >= min && strike <= max
    }

    /// Plain-text report.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let o = &self.overview;

        line(&mut out, SEPARATOR);
        line(
            &mut out,
            format!(
                "{} options expiring {} (spot {})",
                self.ticker, self.expiration, self.spot
            ),
        );
        line(&mut out, SEPARATOR);

        line(&mut out, "\nOverview");
        line(
            &mut out,
            format!(
                "  Call OI: {:>12}   Call volume: {:>12}",
                o.total_call_oi, o.total_call_volume
            ),
        );
        line(
            &mut out,
            format!(
                "  Put OI:  {:>12}   Put volume:  {:>12}",
                o.total_put_oi, o.total_put_volume
            ),
        );
        line(
            &mut out,
            format!("  PCR (OI): {:.2}   PCR (volume): {:.2}", o.pcr_oi, o.pcr_volume),
        );
        if let Some(iv) = self.skew.atm_iv {
            line(&mut out, format!("  ATM IV: {:.1}%", iv * 100.0));
        }
        if let Some(spread) = self.put_call_iv_spread {
            line(
                &mut out,
                format!("  Put-call IV spread near spot: {:+.1} pts", spread * 100.0),
            );
        }

        line(&mut out, "\nKey levels");
        line(
            &mut out,
            format!("  Call wall (resistance): {}", label(o.call_wall, "-")),
        );
        line(&mut out, format!("  Put wall (support):     {}", label(o.put_wall, "-")));
        line(&mut out, format!("  Max pain:               {}", self.max_pain));

        render_top(&mut out, "Top calls by activity", &o.top_calls);
        render_top(&mut out, "Top puts by activity", &o.top_puts);

        self.render_volume_profile(&mut out);
        self.render_pain_curve(&mut out);
        self.render_skew(&mut out);

        line(&mut out, "\nExposure");
        match self.exposure.require() {
            Ok(exposure) => self.render_exposure(&mut out, exposure),
            Err(e) => line(&mut out, format!("  Greeks unavailable ({})", e)),
        }

        out
    }

    fn window_note(&self, out: &mut String) {
        line(
            out,
            format!(
                "  No strikes within {:.0}% of spot",
                self.strike_range_pct * 100.0
            ),
        );
    }

    fn render_volume_profile(&self, out: &mut String) {
        line(out, "\nOpen interest and volume by strike");
        let window = self.profile.around_spot(self.spot, self.strike_range_pct);
        if window.is_empty() {
            self.window_note(out);
            return;
        }

        line(
            out,
            format!(
                "  {:>10} {:>10} {:>10} {:>10} {:>10}",
                "Strike", "Call OI", "Put OI", "Call vol", "Put vol"
            ),
        );
        for (strike, level) in window.iter() {
            line(
                out,
                format!(
                    "  {:>10} {:>10} {:>10} {:>10} {:>10}",
                    strike, level.call_oi, level.put_oi, level.call_volume, level.put_volume
                ),
            );
        }
    }

    fn render_pain_curve(&self, out: &mut String) {
        line(out, "\nWriter losses by settlement price");
        let points: Vec<&PainPoint> = self
            .pain_curve
            .iter()
            .filter(|p| self.in_window(p.strike))
            .collect();
        if points.is_empty() {
            self.window_note(out);
            return;
        }

        line(
            out,
            format!(
                "  {:>10} {:>16} {:>16} {:>16}",
                "Strike", "Call loss", "Put loss", "Total"
            ),
        );
        for p in points {
            let marker = if p.strike == self.max_pain { "  <- max pain" } else { "" };
            line(
                out,
                format!(
                    "  {:>10} {:>16} {:>16} {:>16}{}",
                    p.strike, p.call_loss, p.put_loss, p.total_loss, marker
                ),
            );
        }
    }

    fn render_skew(&self, out: &mut String) {
        line(out, "\nImplied volatility by strike");

        let mut by_strike: BTreeMap<Decimal, (Option<f64>, Option<f64>)> = BTreeMap::new();
        for p in self.skew.calls.iter().filter(|p| self.in_window(p.strike)) {
            by_strike.entry(p.strike).or_default().0 = Some(p.implied_volatility);
        }
        for p in self.skew.puts.iter().filter(|p| self.in_window(p.strike)) {
            by_strike.entry(p.strike).or_default().1 = Some(p.implied_volatility);
        }
        if by_strike.is_empty() {
            line(out, "  No implied volatility quoted near spot");
            return;
        }

        line(out, format!("  {:>10} {:>10} {:>10}", "Strike", "Call IV", "Put IV"));
        for (strike, (call, put)) in by_strike {
            line(
                out,
                format!("  {:>10} {:>10} {:>10}", strike, iv_label(call), iv_label(put)),
            );
        }
    }

    fn render_exposure(&self, out: &mut String, e: &ExposureResult) {
        line(out, format!("  Gamma flip: {}", self.gamma_flip_label()));
        line(out, format!("  HVL:        {}", label(e.hvl_strike, "N/A")));
        line(out, format!("  Net GEX:    {:.0}", e.total_net_gex()));
        line(out, format!("  Net DEX:    {:.0}", e.total_net_dex()));

        let rows = self.exposure_window();
        if rows.is_empty() {
            self.window_note(out);
            return;
        }

        line(
            out,
            format!(
                "\n  {:>10} {:>10} {:>10} {:>14} {:>14} {:>16} {:>16}",
                "Strike", "Call OI", "Put OI", "Net GEX", "Net DEX", "Cum GEX", "Cum DEX"
            ),
        );
        for row in rows {
            line(
                out,
                format!(
                    "  {:>10} {:>10} {:>10} {:>14.0} {:>14.0} {:>16.0} {:>16.0}",
                    row.strike,
                    row.call_oi,
                    row.put_oi,
                    row.net_gex,
                    row.net_dex,
                    row.cumulative_gex,
                    row.cumulative_dex
                ),
            );
        }
    }

    /// Exposure rows within the strike window around spot.
    ///
    /// Cumulative values run over the whole chain, not just the window.
    pub fn exposure_window(&self) -> Vec<ExposureRow> {
        let e = &self.exposure;
        let cumulative: BTreeMap<Decimal, (f64, f64)> = e
            .profile
            .strikes()
            .zip(e.cumulative_gex.iter().copied().zip(e.cumulative_dex.iter().copied()))
            .collect();

        e.profile
            .around_spot(self.spot, self.strike_range_pct)
            .iter()
            .map(|(strike, level)| {
                let (cumulative_gex, cumulative_dex) =
                    cumulative.get(&strike).copied().unwrap_or_default();
                ExposureRow {
                    strike,
                    call_oi: level.call_oi,
                    put_oi: level.put_oi,
                    net_gex: level.net_gex(),
                    net_dex: level.net_dex(),
                    cumulative_gex,
                    cumulative_dex,
                }
            })
            .collect()
    }
}

fn line(out: &mut String, text: impl AsRef<str>) {
    out.push_str(text.as_ref());
    out.push('\n');
}

fn label(strike: Option<Decimal>, missing: &str) -> String {
    strike
        .map(|s| s.to_string())
        .unwrap_or_else(|| missing.to_string())
}

fn iv_label(iv: Option<f64>) -> String {
    iv.map(|v| format!("{:.1}%", v * 100.0))
        .unwrap_or_else(|| "-".to_string())
}

fn render_top(out: &mut String, title: &str, rows: &[TopContract]) {
    line(out, format!("\n{}", title));
    if rows.is_empty() {
        line(out, "  (none)");
        return;
    }
    line(
        out,
        format!(
            "  {:>10} {:>10} {:>10} {:>8} {:>12}",
            "Strike", "OI", "Volume", "IV", "Activity"
        ),
    );
    for c in rows {
        line(
            out,
            format!(
                "  {:>10} {:>10} {:>10} {:>7.1}% {:>12}",
                c.strike,
                c.open_interest,
                c.volume,
                c.implied_volatility * 100.0,
                c.activity
            ),
        );
    }
}
