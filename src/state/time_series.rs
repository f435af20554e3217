use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::types::{MarketFamily, MatchStats, OddsQuote};

// ---------------------------------------------------------------------------
// MatchTimeSeries
// ---------------------------------------------------------------------------

/// Per-match history keyed by match minute. `BTreeMap` keys give both the
/// one-entry-per-minute rule and ascending iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchTimeSeries {
    pub stats: BTreeMap<u32, MatchStats>,
    pub over_under: BTreeMap<u32, OddsQuote>,
    pub handicap: BTreeMap<u32, OddsQuote>,
}

impl MatchTimeSeries {
    fn odds(&self, family: MarketFamily) -> &BTreeMap<u32, OddsQuote> {
        match family {
            MarketFamily::OverUnder => &self.over_under,
            MarketFamily::Handicap => &self.handicap,
        }
    }

    fn odds_mut(&mut self, family: MarketFamily) -> &mut BTreeMap<u32, OddsQuote> {
        match family {
            MarketFamily::OverUnder => &mut self.over_under,
            MarketFamily::Handicap => &mut self.handicap,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeSeriesStore
// ---------------------------------------------------------------------------

/// match_id → history. Each match lives in its own DashMap shard entry, so
/// writers for unrelated matches never wait on each other.
#[derive(Default)]
pub struct TimeSeriesStore {
    series: DashMap<String, MatchTimeSeries>,
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert: a later write for the same minute replaces the earlier one.
    pub fn record_stats(&self, match_id: &str, minute: u32, stats: MatchStats) {
        self.series
            .entry(match_id.to_string())
            .or_default()
            .stats
            .insert(minute, stats);
    }

    /// Upsert keyed by `quote.minute` inside the given family.
    pub fn record_odds(&self, match_id: &str, family: MarketFamily, quote: OddsQuote) {
        self.series
            .entry(match_id.to_string())
            .or_default()
            .odds_mut(family)
            .insert(quote.minute, quote);
    }

    /// Odds history for one family, ascending by minute.
    pub fn history(&self, match_id: &str, family: MarketFamily) -> Vec<OddsQuote> {
        self.series
            .get(match_id)
            .map(|s| s.odds(family).values().copied().collect())
            .unwrap_or_default()
    }

    /// Stats history, ascending by minute.
    pub fn stats_history(&self, match_id: &str) -> Vec<(u32, MatchStats)> {
        self.series
            .get(match_id)
            .map(|s| s.stats.iter().map(|(m, st)| (*m, *st)).collect())
            .unwrap_or_default()
    }

    /// Highest-minute quote of a family, if any.
    pub fn latest(&self, match_id: &str, family: MarketFamily) -> Option<OddsQuote> {
        let series = self.series.get(match_id)?;
        series.odds(family).values().next_back().copied()
    }

    /// Owned copy of a match's full history, for persistence.
    pub fn snapshot(&self, match_id: &str) -> Option<MatchTimeSeries> {
        self.series.get(match_id).map(|s| s.clone())
    }

    /// Seed a match from persisted state. Entries already recorded in memory win.
    pub fn restore(&self, match_id: &str, persisted: MatchTimeSeries) {
        let mut entry = self.series.entry(match_id.to_string()).or_default();
        for (minute, stats) in persisted.stats {
            entry.stats.entry(minute).or_insert(stats);
        }
        for (minute, quote) in persisted.over_under {
            entry.over_under.entry(minute).or_insert(quote);
        }
        for (minute, quote) in persisted.handicap {
            entry.handicap.entry(minute).or_insert(quote);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::types::{MarketPrices, StatPair};

    fn stats(corners_home: u32) -> MatchStats {
        MatchStats {
            corners: StatPair::new(corners_home, 0),
            ..MatchStats::default()
        }
    }

    fn ou_quote(minute: u32, over: rust_decimal::Decimal) -> OddsQuote {
        OddsQuote {
            minute,
            handicap_line: dec!(2.5),
            prices: MarketPrices::OverUnder { over: Some(over), under: Some(dec!(1.9)) },
        }
    }

    #[test]
    fn same_minute_write_replaces() {
        let store = TimeSeriesStore::new();
        store.record_stats("m1", 30, stats(1));
        store.record_stats("m1", 30, stats(4));

        let history = store.stats_history("m1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], (30, stats(4)));
    }

    #[test]
    fn history_is_ascending_regardless_of_write_order() {
        let store = TimeSeriesStore::new();
        store.record_stats("m1", 10, stats(1));
        store.record_stats("m1", 5, stats(2));
        store.record_stats("m1", 7, stats(3));

        let minutes: Vec<u32> = store.stats_history("m1").iter().map(|(m, _)| *m).collect();
        assert_eq!(minutes, vec![5, 7, 10]);
    }

    #[test]
    fn odds_families_are_independent_and_ordered() {
        let store = TimeSeriesStore::new();
        store.record_odds("m1", MarketFamily::OverUnder, ou_quote(40, dec!(1.8)));
        store.record_odds("m1", MarketFamily::OverUnder, ou_quote(12, dec!(2.1)));
        store.record_odds("m1", MarketFamily::OverUnder, ou_quote(40, dec!(1.75)));

        let ou = store.history("m1", MarketFamily::OverUnder);
        assert_eq!(ou.iter().map(|q| q.minute).collect::<Vec<_>>(), vec![12, 40]);
        assert_eq!(ou[1].price_for(crate::types::MarketType::Over), Some(dec!(1.75)));
        assert!(store.history("m1", MarketFamily::Handicap).is_empty());
    }

    #[test]
    fn latest_is_max_minute_or_none() {
        let store = TimeSeriesStore::new();
        assert!(store.latest("m1", MarketFamily::OverUnder).is_none());
        assert!(store.stats_history("m1").is_empty());

        store.record_odds("m1", MarketFamily::OverUnder, ou_quote(55, dec!(1.7)));
        store.record_odds("m1", MarketFamily::OverUnder, ou_quote(20, dec!(2.0)));
        assert_eq!(store.latest("m1", MarketFamily::OverUnder).unwrap().minute, 55);

        store.record_stats("m1", 3, stats(0));
        store.record_stats("m1", 9, stats(2));
        assert_eq!(store.stats_history("m1").last().unwrap().0, 9);
    }

    #[test]
    fn matches_are_partitioned() {
        let store = TimeSeriesStore::new();
        store.record_stats("m1", 10, stats(1));
        store.record_stats("m2", 20, stats(2));
        assert_eq!(store.stats_history("m1").len(), 1);
        assert_eq!(store.stats_history("m2")[0].0, 20);
    }

    #[test]
    fn restore_keeps_fresher_in_memory_entries() {
        let store = TimeSeriesStore::new();
        store.record_stats("m1", 10, stats(9));

        let mut persisted = MatchTimeSeries::default();
        persisted.stats.insert(5, stats(1));
        persisted.stats.insert(10, stats(2));
        store.restore("m1", persisted);

        let history = store.stats_history("m1");
        assert_eq!(history, vec![(5, stats(1)), (10, stats(9))]);
    }

    #[test]
    fn snapshot_survives_json() {
        let store = TimeSeriesStore::new();
        store.record_stats("m1", 10, stats(3));
        store.record_odds("m1", MarketFamily::OverUnder, ou_quote(10, dec!(1.85)));

        let snap = store.snapshot("m1").unwrap();
        let bytes = serde_json::to_vec(&snap).unwrap();
        let back: MatchTimeSeries = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, snap);
    }
}
