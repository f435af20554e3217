pub mod kv_store;
pub mod models;
pub mod writer;

use async_trait::async_trait;

use crate::error::Result;

pub use kv_store::SqliteKvStore;
pub use writer::{HistoryFlush, HistoryWriter};

/// Durable key-scoped blobs. The engine only ever reads a whole value and
/// writes a whole value; the storage engine behind it is interchangeable.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn save(&self, key: &str, value: &[u8]) -> Result<()>;
    /// Drop a key; removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

pub fn wagers_key(match_id: &str) -> String {
    format!("wagers:{match_id}")
}

/// Owning match of a single wager, so it can be found before its book is loaded.
pub fn wager_key(wager_id: &str) -> String {
    format!("wager:{wager_id}")
}

pub fn history_key(match_id: &str) -> String {
    format!("history:{match_id}")
}
