use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::db::{history_key, KvStore};
use crate::error::Result;
use crate::state::MatchTimeSeries;

/// Full history of one match, queued for persistence after a refresh cycle.
#[derive(Debug)]
pub struct HistoryFlush {
    pub match_id: String,
    pub series: MatchTimeSeries,
}

/// Receives history snapshots from the refresh scheduler and persists them.
/// Runs as a dedicated background task and never blocks a refresh cycle.
pub struct HistoryWriter {
    kv: Arc<dyn KvStore>,
    rx: mpsc::Receiver<HistoryFlush>,
}

impl HistoryWriter {
    pub fn new(kv: Arc<dyn KvStore>, rx: mpsc::Receiver<HistoryFlush>) -> Self {
        Self { kv, rx }
    }

    pub async fn run(mut self) {
        while let Some(flush) = self.rx.recv().await {
            if let Err(e) = self.write(&flush).await {
                error!(match_id = %flush.match_id, "[DB] history write failed: {e}");
            }
        }
        debug!("[DB] history writer channel closed");
    }

    async fn write(&self, flush: &HistoryFlush) -> Result<()> {
        let bytes = serde_json::to_vec(&flush.series)?;
        self.kv.save(&history_key(&flush.match_id), &bytes).await
    }
}
