use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Persisted bucket state. Survives process restarts so that separate runs
/// (and, best-effort, separate processes) share one request quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenState {
    tokens: u32,
    /// Unix timestamp of the last refill, in seconds
    update: f64,
}

impl TokenState {
    fn initial() -> Self {
        TokenState {
            tokens: 0,
            update: unix_now(),
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Token bucket in front of every outbound API request.
///
/// `consume` waits until a token is available rather than failing. State is
/// re-read from disk on every pass so a concurrent process draining the same
/// bucket delays us instead of tripping the server-side limit.
pub struct TokenBucket {
    path: PathBuf,
    rate: f64,
    burst: u32,
    lock: Mutex<()>,
}

impl TokenBucket {
    pub fn new(path: PathBuf, rate: f64, burst: u32) -> Self {
        TokenBucket {
            path,
            rate,
            burst,
            lock: Mutex::new(()),
        }
    }

    /// Wait for a token and take it.
    pub async fn consume(&self) {
        let _guard = self.lock.lock().await;
        loop {
            let mut state = self.refreshed();
            if state.tokens >= 1 {
                state.tokens -= 1;
                self.persist(&state);
                return;
            }
            let wait = if self.rate > 0.0 {
                let next = state.update + 1.0 / self.rate - unix_now();
                if next > 0.0 {
                    next
                } else {
                    1.0 / self.rate
                }
            } else {
                1.0
            };
            warn!("slow down cowboy: {:.2} seconds to next token", wait);
            tokio::time::sleep(Duration::from_secs_f64(wait)).await;
        }
    }

    /// Current token count after refilling from elapsed wall time.
    pub async fn tokens(&self) -> u32 {
        let _guard = self.lock.lock().await;
        self.refreshed().tokens
    }

    /// Re-read persisted state, apply the elapsed-time refill capped at the
    /// burst size, and persist the result.
    fn refreshed(&self) -> TokenState {
        let mut state = self.read();
        if state.tokens < self.burst {
            let now = unix_now();
            let elapsed = now - state.update;
            if elapsed > 0.0 {
                let new_tokens = (elapsed * self.rate) as u32;
                if new_tokens > 0 {
                    state.tokens = (state.tokens + new_tokens).min(self.burst);
                    state.update = now;
                }
            }
        } else {
            // Persisted state may predate a burst-size reduction.
            state.tokens = self.burst;
        }
        self.persist(&state);
        state
    }

    fn read(&self) -> TokenState {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_else(TokenState::initial)
    }

    fn persist(&self, state: &TokenState) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string(state) {
            Ok(body) => {
                if let Err(e) = fs::write(&self.path, body) {
                    warn!("failed to persist token bucket state: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize token bucket state: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bucket_with_state(dir: &TempDir, state: &TokenState, rate: f64, burst: u32) -> TokenBucket {
        let path = dir.path().join("tokens.json");
        fs::write(&path, serde_json::to_string(state).unwrap()).unwrap();
        TokenBucket::new(path, rate, burst)
    }

    #[tokio::test]
    async fn test_refill_capped_at_burst_after_long_idle() {
        let dir = TempDir::new().unwrap();
        let state = TokenState {
            tokens: 0,
            update: unix_now() - 100_000.0,
        };
        let bucket = bucket_with_state(&dir, &state, 1.0, 5);
        assert_eq!(bucket.tokens().await, 5);
        // A second read must not accumulate past the cap either
        assert_eq!(bucket.tokens().await, 5);
    }

    #[tokio::test]
    async fn test_consume_decrements_and_never_goes_negative() {
        let dir = TempDir::new().unwrap();
        let state = TokenState {
            tokens: 2,
            update: unix_now(),
        };
        let bucket = bucket_with_state(&dir, &state, 0.0001, 10);
        bucket.consume().await;
        assert_eq!(bucket.tokens().await, 1);
        bucket.consume().await;
        assert_eq!(bucket.tokens().await, 0);
    }

    #[tokio::test]
    async fn test_state_survives_reconstruction() {
        let dir = TempDir::new().unwrap();
        let state = TokenState {
            tokens: 3,
            update: unix_now(),
        };
        let bucket = bucket_with_state(&dir, &state, 0.0001, 10);
        bucket.consume().await;
        drop(bucket);
        let reopened = TokenBucket::new(dir.path().join("tokens.json"), 0.0001, 10);
        assert_eq!(reopened.tokens().await, 2);
    }

    #[tokio::test]
    async fn test_missing_state_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let bucket = TokenBucket::new(dir.path().join("tokens.json"), 0.0001, 10);
        assert_eq!(bucket.tokens().await, 0);
    }
}
