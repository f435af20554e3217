use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{FetchError, ProviderError};
use crate::types::{
    MarketFamily, MarketPrices, MatchSnapshot, MatchStats, OddsMarketSet, OddsQuote, Score,
    StatPair,
};

// ---------------------------------------------------------------------------
// Raw shapes
// ---------------------------------------------------------------------------

/// Top-level envelope shared by both upstream endpoints.
/// `results` stays untyped so that one odd entry cannot sink the whole payload.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    success: Option<Value>,
    results: Option<Value>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTimer {
    tm: Option<Value>,
}

/// One live event from the in-play listing. Every field is optional upstream.
#[derive(Debug, Deserialize)]
struct RawEvent {
    id: Option<Value>,
    league: Option<RawNamed>,
    home: Option<RawNamed>,
    away: Option<RawNamed>,
    /// Score as "H-A".
    ss: Option<String>,
    /// Elapsed minute as a string; `timer.tm` is preferred when present.
    time: Option<Value>,
    timer: Option<RawTimer>,
    /// stat name → [home, away], usually strings.
    stats: Option<HashMap<String, Vec<Value>>>,
}

/// One quote inside `results.odds["1_2" | "1_3"]`.
#[derive(Debug, Deserialize)]
struct RawQuote {
    handicap: Option<Value>,
    time_str: Option<Value>,
    add_time: Option<Value>,
    over_od: Option<Value>,
    under_od: Option<Value>,
    home_od: Option<Value>,
    away_od: Option<Value>,
}

/// Only a JSON object is an envelope. A derived struct would also accept an
/// array positionally, so the shape is checked on a `Value` first.
fn read_envelope(body: &[u8], what: &str) -> Result<RawEnvelope, FetchError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| FetchError::InvalidPayload(format!("{what} envelope: {e}")))?;
    if !value.is_object() {
        return Err(FetchError::InvalidPayload(format!("{what} envelope is not a JSON object")));
    }
    serde_json::from_value(value)
        .map_err(|e| FetchError::InvalidPayload(format!("{what} envelope: {e}")))
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Parse an in-play listing body into snapshots.
///
/// A success flag other than `1` / `"1"` is `UpstreamRejected`. Individual
/// events that cannot be read (no id, malformed score) are skipped.
pub fn parse_listing(body: &[u8]) -> Result<Vec<MatchSnapshot>, ProviderError> {
    let envelope = read_envelope(body, "listing")?;

    if flag(envelope.success.as_ref()) != Some(1) {
        let message = envelope
            .error
            .as_ref()
            .and_then(value_to_string)
            .unwrap_or_else(|| "upstream reported failure".to_string());
        return Err(ProviderError::UpstreamRejected(message));
    }

    let events = match envelope.results {
        Some(Value::Array(events)) => events,
        _ => return Ok(Vec::new()),
    };

    let mut out = Vec::with_capacity(events.len());
    for raw in events {
        let event = match serde_json::from_value::<RawEvent>(raw) {
            Ok(e) => e,
            Err(e) => {
                warn!("[PROVIDER] skipping unreadable event: {e}");
                continue;
            }
        };
        if let Some(snapshot) = event.into_snapshot() {
            out.push(snapshot);
        }
    }
    Ok(out)
}

impl RawEvent {
    fn into_snapshot(self) -> Option<MatchSnapshot> {
        let Some(id) = self.id.as_ref().and_then(value_to_string).filter(|s| !s.is_empty()) else {
            warn!("[PROVIDER] skipping event without id");
            return None;
        };

        let score = match self.ss.as_deref().map(str::trim) {
            None | Some("") => Score::default(),
            Some(raw) => match raw.parse::<Score>() {
                Ok(s) => s,
                Err(e) => {
                    warn!(match_id = %id, "[PROVIDER] skipping event: {e}");
                    return None;
                }
            },
        };

        let minute = self
            .timer
            .as_ref()
            .and_then(|t| t.tm.as_ref())
            .and_then(parse_count)
            .or_else(|| self.time.as_ref().and_then(parse_count))
            .unwrap_or(0);

        let stats = self.stats.as_ref().map(parse_stats).unwrap_or_default();

        Some(MatchSnapshot {
            id,
            league_name: name_of(self.league),
            home_name: name_of(self.home),
            away_name: name_of(self.away),
            score,
            minute,
            stats,
        })
    }
}

fn name_of(named: Option<RawNamed>) -> String {
    named.and_then(|n| n.name).unwrap_or_default()
}

fn parse_stats(raw: &HashMap<String, Vec<Value>>) -> MatchStats {
    let pair = |key: &str| -> StatPair {
        match raw.get(key).map(Vec::as_slice) {
            Some([home, away]) => StatPair::new(
                parse_count(home).unwrap_or(0),
                parse_count(away).unwrap_or(0),
            ),
            _ => StatPair::default(),
        }
    };
    MatchStats {
        attacks: pair("attacks"),
        dangerous_attacks: pair("dangerous_attacks"),
        on_target: pair("on_target"),
        off_target: pair("off_target"),
        corners: pair("corners"),
        yellow_cards: pair("yellowcards"),
        red_cards: pair("redcards"),
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// Parse an odds body. `Ok(None)` when upstream flags failure or carries no
/// usable quotes; absence of odds is a normal state.
pub fn parse_odds(body: &[u8]) -> Result<Option<OddsMarketSet>, ProviderError> {
    let envelope = read_envelope(body, "odds")?;

    if flag(envelope.success.as_ref()) == Some(0) {
        let message = envelope.error.as_ref().and_then(value_to_string).unwrap_or_default();
        warn!("[PROVIDER] odds request flagged as failed upstream: {message}");
        return Ok(None);
    }

    let Some(odds) = envelope
        .results
        .as_ref()
        .and_then(|r| r.get("odds"))
        .and_then(Value::as_object)
    else {
        return Ok(None);
    };

    let family = |f: MarketFamily| -> Vec<OddsQuote> {
        match odds.get(f.upstream_key()) {
            Some(Value::Array(quotes)) => parse_family(f, quotes),
            _ => Vec::new(),
        }
    };

    let set = OddsMarketSet {
        over_under: family(MarketFamily::OverUnder),
        handicap: family(MarketFamily::Handicap),
    };
    Ok((!set.is_empty()).then_some(set))
}

/// Quotes of one family, ascending by upstream `add_time` so that, within a
/// single payload, the most recent quote for a minute is written last.
fn parse_family(family: MarketFamily, quotes: &[Value]) -> Vec<OddsQuote> {
    let mut timed: Vec<(i64, OddsQuote)> = quotes
        .iter()
        .filter_map(|v| serde_json::from_value::<RawQuote>(v.clone()).ok())
        .filter_map(|q| {
            let minute = q.time_str.as_ref().and_then(parse_count)?;
            let added = q.add_time.as_ref().and_then(parse_i64).unwrap_or(0);
            let prices = match family {
                MarketFamily::OverUnder => MarketPrices::OverUnder {
                    over: parse_price(q.over_od.as_ref()),
                    under: parse_price(q.under_od.as_ref()),
                },
                MarketFamily::Handicap => MarketPrices::Handicap {
                    home: parse_price(q.home_od.as_ref()),
                    away: parse_price(q.away_od.as_ref()),
                },
            };
            Some((
                added,
                OddsQuote {
                    minute,
                    handicap_line: parse_handicap(q.handicap.as_ref()),
                    prices,
                },
            ))
        })
        .collect();
    timed.sort_by_key(|(added, _)| *added);
    timed.into_iter().map(|(_, q)| q).collect()
}

// ---------------------------------------------------------------------------
// Defensive scalar parsing
// ---------------------------------------------------------------------------

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `success` arrives as `1`, `"1"`, `0` or `"0"`.
fn flag(v: Option<&Value>) -> Option<i64> {
    match v? {
        Value::Bool(b) => Some(i64::from(*b)),
        other => parse_i64(other),
    }
}

fn parse_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-negative counter. Fractional input is truncated.
fn parse_count(v: &Value) -> Option<u32> {
    let raw = value_to_string(v)?;
    if let Ok(n) = raw.parse::<u32>() {
        return Some(n);
    }
    let f = raw.parse::<f64>().ok().filter(|f| f.is_finite() && *f >= 0.0)?;
    Some(f.trunc().min(f64::from(u32::MAX)) as u32)
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    let raw = raw.strip_prefix('+').unwrap_or(raw);
    Decimal::from_str(raw).ok()
}

/// Decimal odds; anything missing, unparseable or below 1.0 is absent.
fn parse_price(v: Option<&Value>) -> Option<Decimal> {
    let raw = value_to_string(v?)?;
    parse_decimal(&raw).filter(|p| *p >= Decimal::ONE)
}

/// Handicap line. A split line such as `"2.0,2.5"` is the quarter line between
/// its halves; missing or unreadable is `0`.
pub fn parse_handicap(v: Option<&Value>) -> Decimal {
    let Some(raw) = v.and_then(value_to_string) else {
        return Decimal::ZERO;
    };
    let parts: Option<Vec<Decimal>> = raw.split(',').map(parse_decimal).collect();
    match parts.as_deref() {
        Some([single]) => *single,
        Some([a, b]) => (*a + *b) / Decimal::TWO,
        _ => Decimal::ZERO,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
