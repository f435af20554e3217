pub mod demo;
pub mod messages;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::api::health::HealthState;
use crate::clock::Clock;
use crate::config::{Config, EDGE_CACHE_TTL_SECS, EXCLUDED_LEAGUE_MARKER, INPLAY_URL, ODDS_URL};
use crate::error::{FetchError, ProviderError};
use crate::fetcher::transport::redact;
use crate::fetcher::RateLimitedFetcher;
use crate::state::{cache_key, EdgeCache};
use crate::types::{Credential, MatchSnapshot, OddsMarketSet};

/// Typed read access to live match data. The refresh scheduler and the HTTP
/// layer depend on this rather than on [`ProviderClient`] directly.
#[async_trait]
pub trait MatchFeed: Send + Sync {
    async fn list_live_events(
        &self,
        credential: &Credential,
    ) -> Result<Vec<MatchSnapshot>, ProviderError>;

    async fn event_detail(
        &self,
        credential: &Credential,
        match_id: &str,
    ) -> Result<Option<MatchSnapshot>, ProviderError>;

    async fn event_odds(
        &self,
        credential: &Credential,
        match_id: &str,
    ) -> Result<Option<OddsMarketSet>, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub inplay_url: String,
    pub odds_url: String,
    pub sport_id: u32,
    pub cache_ttl: Duration,
    /// Lower-cased league exclusion substring.
    pub excluded_league_marker: String,
}

impl ProviderSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            inplay_url: cfg.inplay_url.clone(),
            odds_url: cfg.odds_url.clone(),
            sport_id: cfg.sport_id,
            cache_ttl: cfg.edge_cache_ttl,
            excluded_league_marker: cfg.excluded_league_marker.to_lowercase(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            inplay_url: INPLAY_URL.to_string(),
            odds_url: ODDS_URL.to_string(),
            sport_id: 1,
            cache_ttl: Duration::from_secs(EDGE_CACHE_TTL_SECS),
            excluded_league_marker: EXCLUDED_LEAGUE_MARKER.to_string(),
        }
    }
}

/// Upstream client: EdgeCache → RateLimitedFetcher → EdgeCache.put, then parse.
pub struct ProviderClient {
    settings: ProviderSettings,
    fetcher: Arc<RateLimitedFetcher>,
    cache: Arc<EdgeCache>,
    clock: Arc<dyn Clock>,
    health: Arc<HealthState>,
}

impl ProviderClient {
    pub fn new(
        settings: ProviderSettings,
        fetcher: Arc<RateLimitedFetcher>,
        cache: Arc<EdgeCache>,
        clock: Arc<dyn Clock>,
        health: Arc<HealthState>,
    ) -> Self {
        Self { settings, fetcher, cache, clock, health }
    }

    /// Cached GET. A hit consumes no rate-limit spacing.
    async fn get_cached(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError> {
        let key = cache_key(url);
        if let Some(hit) = self.cache.get(&key) {
            self.health.inc_cache_hits();
            debug!("[CACHE] hit {}", redact(url));
            return Ok(Some(hit));
        }
        self.health.inc_cache_misses();

        let body = self.fetcher.fetch(url).await?;
        if let Some(bytes) = &body {
            self.cache.put(&key, bytes.clone(), self.settings.cache_ttl);
        }
        Ok(body)
    }

    fn listing_url(&self, credential: &Credential) -> String {
        format!(
            "{}?sport_id={}&token={}",
            self.settings.inplay_url,
            self.settings.sport_id,
            encode(credential.as_str())
        )
    }

    fn odds_url(&self, credential: &Credential, match_id: &str) -> String {
        format!(
            "{}?token={}&event_id={}",
            self.settings.odds_url,
            encode(credential.as_str()),
            encode(match_id)
        )
    }

    fn is_excluded(&self, event: &MatchSnapshot) -> bool {
        let marker = &self.settings.excluded_league_marker;
        !marker.is_empty() && event.league_name.to_lowercase().contains(marker.as_str())
    }

    /// Listing with excluded leagues removed, from demo data or upstream.
    async fn filtered_listing(
        &self,
        credential: &Credential,
        demo_delay: Duration,
    ) -> Result<Vec<MatchSnapshot>, ProviderError> {
        let events = if credential.is_demo() {
            self.clock.sleep(demo_delay).await;
            messages::parse_listing(demo::LISTING.as_bytes())?
        } else {
            let url = self.listing_url(credential);
            match self.get_cached(&url).await? {
                Some(body) => messages::parse_listing(&body)?,
                None => {
                    warn!("[PROVIDER] empty listing response; treating as no live events");
                    Vec::new()
                }
            }
        };

        let total = events.len();
        let kept: Vec<MatchSnapshot> = events.into_iter().filter(|e| !self.is_excluded(e)).collect();
        if kept.len() < total {
            debug!(
                excluded = total - kept.len(),
                "[PROVIDER] dropped {} simulated-league events",
                total - kept.len()
            );
        }
        Ok(kept)
    }
}

#[async_trait]
impl MatchFeed for ProviderClient {
    async fn list_live_events(
        &self,
        credential: &Credential,
    ) -> Result<Vec<MatchSnapshot>, ProviderError> {
        if credential.is_empty() {
            return Ok(Vec::new());
        }
        let events = self.filtered_listing(credential, demo::LIST_DELAY).await?;
        info!(count = events.len(), "[PROVIDER] {} live events", events.len());
        Ok(events)
    }

    async fn event_detail(
        &self,
        credential: &Credential,
        match_id: &str,
    ) -> Result<Option<MatchSnapshot>, ProviderError> {
        if credential.is_empty() || match_id.is_empty() {
            return Ok(None);
        }
        // No single-event endpoint upstream: look the match up in the listing.
        let events = self.filtered_listing(credential, demo::DETAIL_DELAY).await?;
        Ok(events.into_iter().find(|e| e.id == match_id))
    }

    async fn event_odds(
        &self,
        credential: &Credential,
        match_id: &str,
    ) -> Result<Option<OddsMarketSet>, ProviderError> {
        if credential.is_empty() || match_id.is_empty() {
            return Ok(None);
        }
        if credential.is_demo() {
            self.clock.sleep(demo::ODDS_DELAY).await;
            return messages::parse_odds(demo::ODDS.as_bytes());
        }

        let url = self.odds_url(credential, match_id);
        match self.get_cached(&url).await? {
            Some(body) => messages::parse_odds(&body),
            None => {
                debug!(match_id, "[PROVIDER] empty odds response");
                Ok(None)
            }
        }
    }
}

fn encode(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::latency::LatencyStats;
    use crate::clock::manual::ManualClock;
    use crate::fetcher::testing::ScriptedTransport;
    use crate::fetcher::{RateGate, RawResponse, RetryPolicy, Transport};

    struct Harness {
        client: ProviderClient,
        transport: Arc<ScriptedTransport>,
        clock: Arc<ManualClock>,
        health: Arc<HealthState>,
    }

    fn harness(transport: ScriptedTransport) -> Harness {
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(transport);
        let health = Arc::new(HealthState::new());
        let fetcher = Arc::new(RateLimitedFetcher::new(
            transport.clone() as Arc<dyn Transport>,
            Arc::new(RateGate::new(Duration::ZERO, clock.clone())),
            clock.clone(),
            RetryPolicy { max_retries: 3, base_delay: Duration::from_secs(2) },
            health.clone(),
            Arc::new(LatencyStats::new()),
        ));
        let client = ProviderClient::new(
            ProviderSettings::default(),
            fetcher,
            Arc::new(EdgeCache::new(clock.clone())),
            clock.clone(),
            health.clone(),
        );
        Harness { client, transport, clock, health }
    }

    fn listing_body() -> RawResponse {
        let body = json!({
            "success": 1,
            "results": [
                { "id": "10", "league": { "name": "Premier League" }, "ss": "0-0", "time": "5" },
                { "id": "11", "league": { "name": "Esoccer Battle - 8 mins play" }, "ss": "1-0" },
                { "id": "12", "league": { "name": "ESOCCER GT Leagues" }, "ss": "2-2" },
                { "id": "13", "league": { "name": "eSoccer Liga Pro" }, "ss": "0-1" }
            ]
        });
        RawResponse::new(200, serde_json::to_vec(&body).unwrap())
    }

    fn token() -> Credential {
        Credential::new("tok")
    }

    #[tokio::test]
    async fn listing_excludes_marker_in_any_case() {
        let h = harness(ScriptedTransport::always(listing_body()));
        let events = h.client.list_live_events(&token()).await.unwrap();
        assert_eq!(events.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["10"]);
    }

    #[tokio::test]
    async fn identical_requests_within_ttl_hit_upstream_once() {
        let h = harness(ScriptedTransport::always(listing_body()));

        h.client.list_live_events(&token()).await.unwrap();
        h.client.list_live_events(&token()).await.unwrap();
        assert_eq!(h.transport.call_count(), 1);
        assert_eq!(h.health.cache_hits(), 1);

        h.clock.advance(Duration::from_secs(EDGE_CACHE_TTL_SECS + 1));
        h.client.list_live_events(&token()).await.unwrap();
        assert_eq!(h.transport.call_count(), 2);
    }

    #[tokio::test]
    async fn detail_reuses_cached_listing() {
        let h = harness(ScriptedTransport::always(listing_body()));

        let found = h.client.event_detail(&token(), "10").await.unwrap().unwrap();
        assert_eq!(found.minute, 5);
        assert_eq!(h.client.event_detail(&token(), "11").await.unwrap(), None);
        assert_eq!(h.client.event_detail(&token(), "99").await.unwrap(), None);
        assert_eq!(h.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn upstream_failure_flag_is_rejected() {
        let h = harness(ScriptedTransport::always(RawResponse::new(
            200,
            r#"{"success":0,"error":"TOKEN_INVALID"}"#,
        )));
        let err = h.client.list_live_events(&token()).await.unwrap_err();
        assert!(matches!(err, ProviderError::UpstreamRejected(ref m) if m == "TOKEN_INVALID"));
    }

    #[tokio::test]
    async fn odds_absence_is_not_an_error() {
        let h = harness(ScriptedTransport::new(vec![
            Ok(RawResponse::new(200, r#"{"success":"0","error":"no odds"}"#)),
            Ok(RawResponse::new(200, "")),
        ]));
        assert_eq!(h.client.event_odds(&token(), "10").await.unwrap(), None);
        h.clock.advance(Duration::from_secs(EDGE_CACHE_TTL_SECS + 1));
        assert_eq!(h.client.event_odds(&token(), "10").await.unwrap(), None);
    }

    #[tokio::test]
    async fn forbidden_propagates_from_fetcher() {
        let h = harness(ScriptedTransport::always(RawResponse::new(403, "")));
        let err = h.client.event_detail(&token(), "10").await.unwrap_err();
        assert!(matches!(err, ProviderError::Fetch(FetchError::Forbidden)));
    }

    #[tokio::test]
    async fn demo_mode_never_touches_upstream() {
        let h = harness(ScriptedTransport::always(RawResponse::new(500, "")));
        let demo = Credential::new(crate::config::DEMO_CREDENTIAL);

        let events = h.client.list_live_events(&demo).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| !e.league_name.to_lowercase().contains("esoccer")));

        let detail = h.client.event_detail(&demo, "2").await.unwrap().unwrap();
        assert_eq!(detail.home_name, "Real Madrid");
        assert_eq!(h.client.event_detail(&demo, "3").await.unwrap(), None);

        let odds = h.client.event_odds(&demo, "1").await.unwrap().unwrap();
        assert_eq!(odds.over_under.len(), 1);

        assert_eq!(h.transport.call_count(), 0);
        assert_eq!(
            h.clock.sleeps(),
            vec![demo::LIST_DELAY, demo::DETAIL_DELAY, demo::DETAIL_DELAY, demo::ODDS_DELAY]
        );
    }

    #[tokio::test]
    async fn empty_credential_makes_no_calls() {
        let h = harness(ScriptedTransport::always(listing_body()));
        let empty = Credential::new("");
        assert!(h.client.list_live_events(&empty).await.unwrap().is_empty());
        assert_eq!(h.client.event_detail(&empty, "10").await.unwrap(), None);
        assert_eq!(h.client.event_odds(&empty, "10").await.unwrap(), None);
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn credential_is_encoded_into_query() {
        let h = harness(ScriptedTransport::always(listing_body()));
        h.client.event_odds(&Credential::new("a b&c"), "42").await.unwrap();
        let urls = h.transport.urls();
        assert!(urls[0].ends_with("?token=a+b%26c&event_id=42"), "{}", urls[0]);
    }
}
