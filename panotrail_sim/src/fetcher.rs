//! In-memory image fetcher with injectable faults.

use crate::context::SimContext;
use async_trait::async_trait;
use panotrail_env::{FetchError, ImageFetcher};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// JPEG start-of-image marker prefixed to every synthetic body.
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Deterministic stand-in for the HTTP fetcher.
///
/// - Bodies are derived from the URL, so the same URL always yields the same bytes
/// - URLs marked missing answer 404
/// - A seeded fraction of requests fail at the transport level
/// - Every request advances the virtual clock by a fixed latency
pub struct SimFetcher {
    context: Arc<SimContext>,
    rng: Mutex<ChaCha8Rng>,
    missing: Mutex<HashSet<String>>,
    failure_rate: f64,
    latency: Duration,
    requests: AtomicU64,
}

impl SimFetcher {
    pub fn new(context: Arc<SimContext>, seed: u64) -> Self {
        Self {
            context,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            missing: Mutex::new(HashSet::new()),
            failure_rate: 0.0,
            latency: Duration::from_millis(40),
            requests: AtomicU64::new(0),
        }
    }

    /// Sets the transport failure probability (clamped to 0.0 - 1.0).
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every request for `url` answer 404.
    pub fn mark_missing(&self, url: impl Into<String>) {
        self.missing.lock().unwrap().insert(url.into());
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// The body served for `url`.
    pub fn body_for(url: &str) -> Vec<u8> {
        let mut body = JPEG_SOI.to_vec();
        body.extend_from_slice(url.as_bytes());
        body
    }
}

#[async_trait]
impl ImageFetcher for SimFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.context.advance_time(self.latency);

        if self.missing.lock().unwrap().contains(url) {
            return Err(FetchError::status(url, 404));
        }

        let dropped = self.failure_rate > 0.0 && self.rng.lock().unwrap().gen_bool(self.failure_rate);
        if dropped {
            return Err(FetchError::transport(url, "connection reset (simulated)"));
        }

        Ok(Self::body_for(url))
    }
}
