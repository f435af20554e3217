pub mod edge_cache;
pub mod time_series;

pub use edge_cache::{cache_key, EdgeCache};
pub use time_series::{MatchTimeSeries, TimeSeriesStore};
