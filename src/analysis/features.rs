//! Derived in-play features computed from the stored time series.
//!
//! Trailing-window features compare the latest entry with a baseline: the
//! latest entry at least `window` minutes older, or the earliest entry when
//! the series is shorter than the window.

use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::state::TimeSeriesStore;
use crate::types::{MarketFamily, MarketType, MatchSnapshot, MatchStats, OddsQuote, Side};

/// Attacking-threat score of one side:
/// `shots + 3·on_target + 0.7·corners + 0.1·dangerous_attacks`.
pub fn api_score(stats: &MatchStats, side: Side) -> f64 {
    let on_target = f64::from(stats.on_target.side(side));
    let shots = on_target + f64::from(stats.off_target.side(side));
    let corners = f64::from(stats.corners.side(side));
    let dangerous = f64::from(stats.dangerous_attacks.side(side));
    shots + 3.0 * on_target + 0.7 * corners + 0.1 * dangerous
}

fn combined_api(stats: &MatchStats) -> f64 {
    api_score(stats, Side::Home) + api_score(stats, Side::Away)
}

fn total_shots(stats: &MatchStats) -> u32 {
    stats.on_target.home + stats.on_target.away + stats.off_target.home + stats.off_target.away
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ApiPoint {
    pub minute: u32,
    pub home: f64,
    pub away: f64,
}

pub fn api_chart(history: &[(u32, MatchStats)]) -> Vec<ApiPoint> {
    history
        .iter()
        .map(|(minute, stats)| ApiPoint {
            minute: *minute,
            home: api_score(stats, Side::Home),
            away: api_score(stats, Side::Away),
        })
        .collect()
}

/// Index of the baseline entry for a series of ascending minutes.
fn baseline<T>(series: &[(u32, T)], window: u32) -> Option<usize> {
    let (latest, _) = series.last()?;
    let cutoff = latest.checked_sub(window);
    let idx = cutoff
        .and_then(|c| series.iter().rposition(|(m, _)| *m <= c))
        .unwrap_or(0);
    Some(idx)
}

/// Change of combined API score over the trailing window.
pub fn momentum(history: &[(u32, MatchStats)], window: u32) -> f64 {
    match (baseline(history, window), history.last()) {
        (Some(b), Some((_, latest))) => combined_api(latest) - combined_api(&history[b].1),
        _ => 0.0,
    }
}

/// Shots added by both sides over the trailing window.
pub fn shot_cluster(history: &[(u32, MatchStats)], window: u32) -> u32 {
    match (baseline(history, window), history.last()) {
        (Some(b), Some((_, latest))) => total_shots(latest).saturating_sub(total_shots(&history[b].1)),
        _ => 0,
    }
}

/// Shortening of the Over price across the trailing window, ×100. Never negative.
pub fn pressure(over_under: &[OddsQuote], window: u32) -> f64 {
    let overs: Vec<(u32, f64)> = over_under
        .iter()
        .filter_map(|q| {
            let price = q.price_for(MarketType::Over)?.to_f64()?;
            Some((q.minute, price))
        })
        .collect();
    match (baseline(&overs, window), overs.last()) {
        (Some(b), Some((_, latest))) => ((overs[b].1 - latest) * 100.0).max(0.0),
        _ => 0.0,
    }
}

/// Everything the advisory oracle sees about one match at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    pub match_id: String,
    pub minute: u32,
    pub home_name: String,
    pub away_name: String,
    pub home_score: u32,
    pub away_score: u32,
    pub stats: MatchStats,
    pub home_api: f64,
    pub away_api: f64,
    pub momentum: f64,
    pub shot_cluster: u32,
    pub pressure: f64,
    pub latest_over_under: Option<OddsQuote>,
    pub latest_handicap: Option<OddsQuote>,
}

impl FeatureVector {
    pub fn build(snapshot: &MatchSnapshot, store: &TimeSeriesStore, window: u32) -> Self {
        let history = store.stats_history(&snapshot.id);
        let over_under = store.history(&snapshot.id, MarketFamily::OverUnder);
        Self {
            match_id: snapshot.id.clone(),
            minute: snapshot.minute,
            home_name: snapshot.home_name.clone(),
            away_name: snapshot.away_name.clone(),
            home_score: snapshot.score.home,
            away_score: snapshot.score.away,
            stats: snapshot.stats,
            home_api: api_score(&snapshot.stats, Side::Home),
            away_api: api_score(&snapshot.stats, Side::Away),
            momentum: momentum(&history, window),
            shot_cluster: shot_cluster(&history, window),
            pressure: pressure(&over_under, window),
            latest_over_under: over_under.last().copied(),
            latest_handicap: store.latest(&snapshot.id, MarketFamily::Handicap),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::types::{MarketPrices, StatPair};

    fn stats(on: u32, off: u32, corners: u32, dangerous: u32) -> MatchStats {
        MatchStats {
            on_target: StatPair::new(on, 0),
            off_target: StatPair::new(off, 0),
            corners: StatPair::new(corners, 0),
            dangerous_attacks: StatPair::new(dangerous, 0),
            ..MatchStats::default()
        }
    }

    fn over(minute: u32, price: rust_decimal::Decimal) -> OddsQuote {
        OddsQuote {
            minute,
            handicap_line: dec!(2.5),
            prices: MarketPrices::OverUnder { over: Some(price), under: None },
        }
    }

    #[test]
    fn api_score_weights() {
        // shots 9 + 3·5 + 0.7·3 + 0.1·35
        let s = stats(5, 4, 3, 35);
        assert!((api_score(&s, Side::Home) - 29.6).abs() < 1e-9);
        assert_eq!(api_score(&s, Side::Away), 0.0);
    }

    #[test]
    fn momentum_and_shots_use_trailing_window() {
        let history = vec![
            (10, stats(1, 1, 0, 0)),
            (14, stats(2, 1, 0, 0)),
            (15, stats(2, 2, 0, 0)),
            (20, stats(4, 3, 0, 0)),
        ];
        // Baseline is minute 15 (latest ≤ 20 - 5).
        assert_eq!(shot_cluster(&history, 5), 3);
        let expected = api_score(&history[3].1, Side::Home) - api_score(&history[2].1, Side::Home);
        assert!((momentum(&history, 5) - expected).abs() < 1e-9);
    }

    #[test]
    fn short_series_falls_back_to_first_entry() {
        let history = vec![(3, stats(0, 0, 0, 0)), (4, stats(1, 0, 0, 0))];
        assert_eq!(shot_cluster(&history, 5), 1);
        assert_eq!(momentum(&[], 5), 0.0);
        assert_eq!(shot_cluster(&[], 5), 0);
    }

    #[test]
    fn pressure_counts_only_shortening() {
        let quotes = vec![over(50, dec!(2.00)), over(55, dec!(1.80))];
        assert!((pressure(&quotes, 5) - 20.0).abs() < 1e-9);

        let drifting = vec![over(50, dec!(1.80)), over(55, dec!(2.00))];
        assert_eq!(pressure(&drifting, 5), 0.0);
        assert_eq!(pressure(&[], 5), 0.0);
    }

    #[test]
    fn chart_follows_history_order() {
        let chart = api_chart(&[(5, stats(1, 0, 0, 0)), (9, stats(2, 0, 0, 0))]);
        assert_eq!(chart.iter().map(|p| p.minute).collect::<Vec<_>>(), vec![5, 9]);
        assert_eq!(chart[1].home, 8.0);
    }
}
