use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::DEMO_CREDENTIAL;
use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Opaque provider token. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_demo(&self) -> bool {
        self.0 == DEMO_CREDENTIAL
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_demo() {
            write!(f, "Credential(DEMO_MODE)")
        } else {
            write!(f, "Credential(***)")
        }
    }
}

// ---------------------------------------------------------------------------
// Score
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }
}

impl FromStr for Score {
    type Err = ValidationError;

    /// Accepts exactly `"<int>-<int>"` (surrounding whitespace allowed).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidScoreFormat(s.to_string());
        let (home, away) = s.trim().split_once('-').ok_or_else(invalid)?;
        let (home, away) = (home.trim(), away.trim());
        let is_count = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
        if !is_count(home) || !is_count(away) {
            return Err(invalid());
        }
        Ok(Self {
            home: home.parse().map_err(|_| invalid())?,
            away: away.parse().map_err(|_| invalid())?,
        })
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}

impl Serialize for Score {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Match statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatPair {
    pub home: u32,
    pub away: u32,
}

impl StatPair {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    pub fn side(&self, side: Side) -> u32 {
        match side {
            Side::Home => self.home,
            Side::Away => self.away,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

/// The seven in-play counters. Missing counters are zero, never absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchStats {
    pub attacks: StatPair,
    pub dangerous_attacks: StatPair,
    pub on_target: StatPair,
    pub off_target: StatPair,
    pub corners: StatPair,
    pub yellow_cards: StatPair,
    pub red_cards: StatPair,
}

/// One match as seen at one polling instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub id: String,
    pub league_name: String,
    pub home_name: String,
    pub away_name: String,
    pub score: Score,
    pub minute: u32,
    pub stats: MatchStats,
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketFamily {
    /// Goal line: OVER / UNDER.
    OverUnder,
    /// Asian handicap: HOME / AWAY.
    Handicap,
}

impl MarketFamily {
    /// Key of this family inside the upstream `results.odds` object.
    pub fn upstream_key(&self) -> &'static str {
        match self {
            MarketFamily::OverUnder => "1_3",
            MarketFamily::Handicap => "1_2",
        }
    }
}

impl std::fmt::Display for MarketFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketFamily::OverUnder => write!(f, "over_under"),
            MarketFamily::Handicap => write!(f, "handicap"),
        }
    }
}

/// Prices are decimal odds >= 1.0; `None` means the side is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum MarketPrices {
    OverUnder {
        over: Option<Decimal>,
        under: Option<Decimal>,
    },
    Handicap {
        home: Option<Decimal>,
        away: Option<Decimal>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OddsQuote {
    pub minute: u32,
    pub handicap_line: Decimal,
    pub prices: MarketPrices,
}

impl OddsQuote {
    /// Price for one side of this quote's market, if that side belongs to this family.
    pub fn price_for(&self, market: MarketType) -> Option<Decimal> {
        match (self.prices, market) {
            (MarketPrices::OverUnder { over, .. }, MarketType::Over) => over,
            (MarketPrices::OverUnder { under, .. }, MarketType::Under) => under,
            (MarketPrices::Handicap { home, .. }, MarketType::Home) => home,
            (MarketPrices::Handicap { away, .. }, MarketType::Away) => away,
            _ => None,
        }
    }
}

/// Both market families for one match, each ascending by upstream add time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OddsMarketSet {
    pub over_under: Vec<OddsQuote>,
    pub handicap: Vec<OddsQuote>,
}

impl OddsMarketSet {
    pub fn family(&self, family: MarketFamily) -> &[OddsQuote] {
        match family {
            MarketFamily::OverUnder => &self.over_under,
            MarketFamily::Handicap => &self.handicap,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.over_under.is_empty() && self.handicap.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Wagers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketType {
    Home,
    Away,
    Over,
    Under,
}

impl MarketType {
    pub fn family(&self) -> MarketFamily {
        match self {
            MarketType::Home | MarketType::Away => MarketFamily::Handicap,
            MarketType::Over | MarketType::Under => MarketFamily::OverUnder,
        }
    }
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarketType::Home => "HOME",
            MarketType::Away => "AWAY",
            MarketType::Over => "OVER",
            MarketType::Under => "UNDER",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WagerStatus {
    Pending,
    Won,
    HalfWon,
    Push,
    HalfLost,
    Lost,
}

impl std::fmt::Display for WagerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WagerStatus::Pending => "PENDING",
            WagerStatus::Won => "WON",
            WagerStatus::HalfWon => "HALF_WON",
            WagerStatus::Push => "PUSH",
            WagerStatus::HalfLost => "HALF_LOST",
            WagerStatus::Lost => "LOST",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub id: String,
    pub match_id: String,
    pub market_type: MarketType,
    pub handicap_line: Decimal,
    pub price_at_placement: Decimal,
    pub stake: Decimal,
    pub score_at_placement: Score,
    pub status: WagerStatus,
    /// Zero while pending.
    pub profit: Decimal,
    /// Set only on settlement.
    pub final_score: Option<Score>,
    pub placed_at: DateTime<Utc>,
}

impl Wager {
    pub fn is_pending(&self) -> bool {
        self.status == WagerStatus::Pending && self.final_score.is_none()
    }
}
