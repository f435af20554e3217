use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{wager_key, wagers_key, KvStore};
use crate::error::ValidationError;
use crate::ledger::settlement;
use crate::state::TimeSeriesStore;
use crate::types::{MarketType, Score, Wager, WagerStatus};

const QUARTER: Decimal = Decimal::from_parts(25, 0, 0, false, 2);

/// Wagers of one match. `loaded` flips once the persisted copy has been read.
#[derive(Default)]
struct Book {
    loaded: bool,
    wagers: Vec<Wager>,
}

/// Per-match wager collections with validation, settlement and persistence.
///
/// Each match has its own async lock, so placement and settlement on the same
/// match are serialised while unrelated matches proceed independently. Every
/// mutation is applied in memory first and then saved under `wagers:<match_id>`;
/// a failed save is logged and does not roll the mutation back. Each wager also
/// gets a `wager:<wager_id>` entry naming its match, so a wager can be settled
/// or deleted before anything has loaded its book.
pub struct WagerLedger {
    kv: Arc<dyn KvStore>,
    books: DashMap<String, Arc<Mutex<Book>>>,
    /// wager_id → match_id, for every wager in a loaded book.
    index: DashMap<String, String>,
}

impl WagerLedger {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            books: DashMap::new(),
            index: DashMap::new(),
        }
    }

    /// Lock a match's book, loading it from persistence on first access.
    async fn open(&self, match_id: &str) -> OwnedMutexGuard<Book> {
        let book = self.books.entry(match_id.to_string()).or_default().clone();
        let mut guard = book.lock_owned().await;
        if !guard.loaded {
            guard.wagers = self.load_persisted(match_id).await;
            for w in &guard.wagers {
                self.index.insert(w.id.clone(), match_id.to_string());
            }
            guard.loaded = true;
        }
        guard
    }

    async fn load_persisted(&self, match_id: &str) -> Vec<Wager> {
        let bytes = match self.kv.load(&wagers_key(match_id)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(match_id, "[LEDGER] load failed, starting empty: {e}");
                return Vec::new();
            }
        };
        match serde_json::from_slice::<Vec<Wager>>(&bytes) {
            Ok(wagers) => {
                info!(match_id, count = wagers.len(), "[LEDGER] loaded {} wagers", wagers.len());
                wagers
            }
            Err(e) => {
                warn!(match_id, "[LEDGER] persisted wagers unreadable, starting empty: {e}");
                Vec::new()
            }
        }
    }

    async fn persist(&self, match_id: &str, wagers: &[Wager]) {
        let bytes = match serde_json::to_vec(wagers) {
            Ok(b) => b,
            Err(e) => {
                warn!(match_id, "[LEDGER] could not encode wagers: {e}");
                return;
            }
        };
        if let Err(e) = self.kv.save(&wagers_key(match_id), &bytes).await {
            warn!(match_id, "[LEDGER] save failed (in-memory state kept): {e}");
        }
    }

    /// Make sure a match's book is in memory so its wager ids can be settled.
    pub async fn load(&self, match_id: &str) {
        drop(self.open(match_id).await);
    }

    pub async fn place(
        &self,
        match_id: &str,
        market_type: MarketType,
        handicap_line: Decimal,
        price: Decimal,
        stake: Decimal,
        score_at_placement: &str,
    ) -> Result<Wager, ValidationError> {
        if stake <= Decimal::ZERO {
            return Err(ValidationError::InvalidStake);
        }
        if price <= Decimal::ONE {
            return Err(ValidationError::InvalidPrice);
        }
        if !(handicap_line / QUARTER).fract().is_zero() {
            return Err(ValidationError::InvalidHandicapLine);
        }
        let score_at_placement: Score = score_at_placement.parse()?;

        let wager = Wager {
            id: Uuid::new_v4().to_string(),
            match_id: match_id.to_string(),
            market_type,
            handicap_line,
            price_at_placement: price,
            stake,
            score_at_placement,
            status: WagerStatus::Pending,
            profit: Decimal::ZERO,
            final_score: None,
            placed_at: Utc::now(),
        };

        let mut book = self.open(match_id).await;
        book.wagers.push(wager.clone());
        self.index.insert(wager.id.clone(), match_id.to_string());
        self.persist(match_id, &book.wagers).await;
        if let Err(e) = self.kv.save(&wager_key(&wager.id), match_id.as_bytes()).await {
            warn!(match_id, wager_id = %wager.id, "[LEDGER] could not save wager owner: {e}");
        }

        info!(
            match_id,
            wager_id = %wager.id,
            market = %market_type,
            line = %handicap_line,
            price = %price,
            stake = %stake,
            "[LEDGER] placed {market_type} {handicap_line} @{price} stake {stake} at {score_at_placement}",
        );
        Ok(wager)
    }

    /// Place at the latest quote stored for the wager's market family.
    ///
    /// The handicap family is quoted from the home side, so an AWAY wager takes
    /// the negated line.
    pub async fn place_at_market(
        &self,
        match_id: &str,
        market_type: MarketType,
        stake: Decimal,
        store: &TimeSeriesStore,
        score_at_placement: &str,
    ) -> Result<Wager, ValidationError> {
        let unavailable = || ValidationError::MarketUnavailable(match_id.to_string());
        let quote = store.latest(match_id, market_type.family()).ok_or_else(unavailable)?;
        let price = quote.price_for(market_type).ok_or_else(unavailable)?;
        let line = match market_type {
            MarketType::Away => -quote.handicap_line,
            _ => quote.handicap_line,
        };
        self.place(match_id, market_type, line, price, stake, score_at_placement).await
    }

    pub async fn settle(&self, wager_id: &str, final_score: &str) -> Result<Wager, ValidationError> {
        let final_score: Score = final_score.parse()?;
        let match_id = self.match_of(wager_id).await?;

        let mut book = self.open(&match_id).await;
        let wager = book
            .wagers
            .iter_mut()
            .find(|w| w.id == wager_id)
            .ok_or_else(|| ValidationError::WagerNotFound(wager_id.to_string()))?;
        if !wager.is_pending() {
            return Err(ValidationError::AlreadySettled(wager_id.to_string()));
        }

        let outcome = settlement::settle(wager, final_score);
        wager.status = outcome.status;
        wager.profit = outcome.profit;
        wager.final_score = Some(final_score);
        let settled = wager.clone();

        self.persist(&match_id, &book.wagers).await;
        info!(
            match_id = %match_id,
            wager_id,
            status = %settled.status,
            profit = %settled.profit,
            "[LEDGER] settled {} at {final_score}: {} ({})",
            settled.market_type,
            settled.status,
            settled.profit,
        );
        Ok(settled)
    }

    /// Remove a wager whatever its status.
    pub async fn delete(&self, wager_id: &str) -> Result<Wager, ValidationError> {
        let match_id = self.match_of(wager_id).await?;
        let mut book = self.open(&match_id).await;
        let pos = book
            .wagers
            .iter()
            .position(|w| w.id == wager_id)
            .ok_or_else(|| ValidationError::WagerNotFound(wager_id.to_string()))?;
        let removed = book.wagers.remove(pos);
        self.index.remove(wager_id);
        self.persist(&match_id, &book.wagers).await;
        if let Err(e) = self.kv.remove(&wager_key(wager_id)).await {
            warn!(match_id = %match_id, wager_id, "[LEDGER] could not drop wager owner: {e}");
        }
        info!(match_id = %match_id, wager_id, "[LEDGER] deleted wager");
        Ok(removed)
    }

    /// Sum of profit over settled wagers; pending wagers never count.
    pub async fn total_profit(&self, match_id: &str) -> Decimal {
        let book = self.open(match_id).await;
        book.wagers
            .iter()
            .filter(|w| w.status != WagerStatus::Pending)
            .map(|w| w.profit)
            .sum()
    }

    /// A match's wagers, newest first.
    pub async fn wagers(&self, match_id: &str) -> Vec<Wager> {
        let book = self.open(match_id).await;
        let mut out: Vec<Wager> = book.wagers.iter().rev().cloned().collect();
        out.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        out
    }

    /// Match a loaded wager belongs to.
    fn match_id_of(&self, wager_id: &str) -> Option<String> {
        self.index.get(wager_id).map(|m| m.clone())
    }

    /// Owning match of a wager, falling back to the persisted owner entry when
    /// its book has not been loaded yet.
    async fn match_of(&self, wager_id: &str) -> Result<String, ValidationError> {
        if let Some(match_id) = self.match_id_of(wager_id) {
            return Ok(match_id);
        }
        let not_found = || ValidationError::WagerNotFound(wager_id.to_string());
        let owner = match self.kv.load(&wager_key(wager_id)).await {
            Ok(Some(bytes)) => String::from_utf8(bytes).map_err(|_| not_found())?,
            Ok(None) => return Err(not_found()),
            Err(e) => {
                warn!(wager_id, "[LEDGER] owner lookup failed: {e}");
                return Err(not_found());
            }
        };
        drop(self.open(&owner).await);
        self.match_id_of(wager_id).ok_or_else(not_found)
    }
}
