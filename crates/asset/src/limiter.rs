use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::AssetError;

/// Process-wide cap on connection-open requests in flight.
///
/// Callers wait for a permit rather than failing.
#[derive(Debug, Clone)]
pub struct ConnectionLimiter {
    permits: Arc<Semaphore>,
}

impl ConnectionLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AssetError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AssetError::Transport("connection limiter closed".into()))
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fourth_request_waits_for_a_release() {
        let limiter = ConnectionLimiter::new(3);
        let a = limiter.acquire().await.unwrap();
        let _b = limiter.acquire().await.unwrap();
        let _c = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);

        let waiting = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(waiting.is_err());

        drop(a);
        let d = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(d.is_ok());
    }
}
