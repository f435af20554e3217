pub mod gate;
pub mod transport;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::clock::Clock;
use crate::error::{FetchError, NetworkHint};

pub use gate::RateGate;
#[cfg(test)]
pub use transport::RawResponse;
pub use transport::{ReqwestTransport, Transport, TransportError};

use transport::redact;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first 429; the request is attempted at most `max_retries + 1` times.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry_index))
    }
}

/// Rate-limited, retrying GET against the upstream provider.
///
/// Every attempt (retries included) passes the shared [`RateGate`] first.
/// 429 is retried with exponential backoff, 403 fails immediately, an empty
/// 2xx body is `Ok(None)` and a non-empty body that is not JSON is
/// `FetchError::InvalidPayload`.
pub struct RateLimitedFetcher {
    transport: Arc<dyn Transport>,
    gate: Arc<RateGate>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
}

impl RateLimitedFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        gate: Arc<RateGate>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
    ) -> Self {
        Self { transport, gate, clock, retry, health, latency }
    }

    pub async fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError> {
        let mut retries = 0u32;

        loop {
            let waited = self.gate.acquire().await;
            if !waited.is_zero() {
                debug!(
                    wait_ms = waited.as_millis() as u64,
                    "[FETCH] spacing gate held request for {:.1}s",
                    waited.as_secs_f64()
                );
            }

            self.health.record_upstream_call(now_ms());
            let started = std::time::Instant::now();
            let result = self.transport.get(url).await;
            self.latency.record(started.elapsed());

            let resp = match result {
                Ok(r) => r,
                Err(TransportError::Timeout) => {
                    warn!("[FETCH] timeout on {}", redact(url));
                    return Err(FetchError::Timeout);
                }
                Err(TransportError::Connect(detail)) | Err(TransportError::Other(detail)) => {
                    warn!("[FETCH] transport failure on {}: {detail}", redact(url));
                    return Err(FetchError::Network { hint: self.hint(), detail });
                }
            };

            match resp.status {
                403 => {
                    warn!("[FETCH] 403 on {} (not retried)", redact(url));
                    return Err(FetchError::Forbidden);
                }
                429 if retries < self.retry.max_retries => {
                    let delay = self.retry.delay_for(retries);
                    retries += 1;
                    self.health.inc_upstream_retries();
                    warn!(
                        attempt = retries,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "[FETCH] 429 from upstream, retrying in {:.1}s ({retries}/{})",
                        delay.as_secs_f64(),
                        self.retry.max_retries,
                    );
                    self.clock.sleep(delay).await;
                    continue;
                }
                429 => {
                    self.health.inc_rate_limit_exhausted();
                    warn!("[FETCH] 429 persisted after {retries} retries on {}", redact(url));
                    return Err(FetchError::RateLimited { attempts: retries + 1 });
                }
                s if !(200..300).contains(&s) => {
                    warn!("[FETCH] upstream status {s} on {}", redact(url));
                    return Err(FetchError::Network {
                        hint: self.hint(),
                        detail: format!("upstream responded with status {s}"),
                    });
                }
                _ => {}
            }

            if resp.body.iter().all(|b| b.is_ascii_whitespace()) {
                debug!("[FETCH] empty body from {}; treating as no data", redact(url));
                return Ok(None);
            }

            serde_json::from_slice::<serde::de::IgnoredAny>(&resp.body)
                .map_err(|e| FetchError::InvalidPayload(e.to_string()))?;

            return Ok(Some(resp.body));
        }
    }

    fn hint(&self) -> NetworkHint {
        if self.transport.via_proxy() {
            NetworkHint::Intermediary
        } else {
            NetworkHint::Generic
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;

    /// Transport that replays queued responses and records every call.
    pub struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
        /// Returned once the queue is drained.
        fallback: RawResponse,
        pub calls: Mutex<Vec<(String, Instant)>>,
        pub proxy: bool,
    }

    impl ScriptedTransport {
        pub fn new(responses: Vec<Result<RawResponse, TransportError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                fallback: RawResponse::new(200, "{}"),
                calls: Mutex::new(Vec::new()),
                proxy: false,
            }
        }

        pub fn always(resp: RawResponse) -> Self {
            let mut t = Self::new(Vec::new());
            t.fallback = resp;
            t
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn call_starts(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
        }

        pub fn urls(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
            self.calls.lock().unwrap().push((url.to_string(), Instant::now()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(self.fallback.clone()))
        }

        fn via_proxy(&self) -> bool {
            self.proxy
        }
    }

    pub fn fetcher_with(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        spacing: Duration,
        retry: RetryPolicy,
    ) -> RateLimitedFetcher {
        RateLimitedFetcher::new(
            transport,
            Arc::new(RateGate::new(spacing, clock.clone())),
            clock,
            retry,
            Arc::new(HealthState::new()),
            Arc::new(LatencyStats::new()),
        )
    }
}
