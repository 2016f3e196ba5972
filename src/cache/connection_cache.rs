use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::connection_string::{self, redact};
use crate::Result;

/// Pool tuning handed to the database client on construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_pool_size: u32,
    pub min_pool_size: u32,
    pub max_idle_time: Duration,
    pub connect_timeout: Duration,
    pub server_selection_timeout: Duration,
    pub socket_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        let timeout = Duration::from_millis(5000);
        Self {
            max_pool_size: 10,
            min_pool_size: 1,
            max_idle_time: Duration::from_secs(30),
            connect_timeout: timeout,
            server_selection_timeout: timeout,
            socket_timeout: timeout,
        }
    }
}

/// Builds pooled handles to the external document database
#[async_trait]
pub trait Connector: Send + Sync {
    /// Cheap-to-clone handle sharing one underlying pool
    type Handle: Clone + Send + Sync + 'static;

    /// Construct a pooled handle. Must fail fast; no liveness check is implied.
    async fn connect(&self, connection_string: &str, options: &PoolOptions) -> Result<Self::Handle>;

    /// Minimal round trip proving the handle reaches the cluster
    async fn ping(&self, handle: &Self::Handle) -> Result<()>;
}

struct CachedConnection<H> {
    key: String,
    handle: H,
    verified_at: Instant,
}

/// Single-slot cache for one live database handle, keyed by connection string.
///
/// A handle only enters the cache after it answered a liveness probe. Hits are
/// not re-verified: callers that see a connectivity failure downstream call
/// [`ConnectionCache::invalidate`] so the next lookup rebuilds from scratch.
pub struct ConnectionCache<C: Connector> {
    connector: C,
    options: PoolOptions,
    slot: Mutex<Option<CachedConnection<C::Handle>>>,
}

impl<C: Connector> ConnectionCache<C> {
    pub fn new(connector: C, options: PoolOptions) -> Self {
        Self {
            connector,
            options,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached handle for `connection_string`, connecting and probing on a miss.
    ///
    /// The slot stays locked for the whole miss path, so concurrent callers never
    /// build duplicate handles. A failed attempt caches nothing and leaves any
    /// previously cached entry in place.
    pub async fn get_or_connect(&self, connection_string: &str) -> Result<C::Handle> {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if cached.key == connection_string {
                debug!(
                    "Reusing cached connection to {} (verified {:?} ago)",
                    redact(&cached.key),
                    cached.verified_at.elapsed()
                );
                return Ok(cached.handle.clone());
            }
        }

        self.connect_into(&mut slot, connection_string).await
    }

    /// Prove the cluster is reachable: a cached handle is probed again, a miss connects.
    ///
    /// Any failure drops the cached entry before the error is returned. The slot is
    /// held throughout, so a handle cached by another caller is never dropped here.
    pub async fn validate_connection(&self, connection_string: &str) -> Result<C::Handle> {
        let mut slot = self.slot.lock().await;

        let outcome = if let Some(cached) = slot.as_mut().filter(|c| c.key == connection_string) {
            match self.connector.ping(&cached.handle).await {
                Ok(()) => {
                    cached.verified_at = Instant::now();
                    Ok(cached.handle.clone())
                }
                Err(e) => Err(e),
            }
        } else {
            self.connect_into(&mut slot, connection_string).await
        };

        if let Err(e) = &outcome {
            if let Some(previous) = slot.take() {
                warn!("Validation failed ({}), dropping cached connection to {}", e, redact(&previous.key));
            }
        }
        outcome
    }

    /// Connect, probe and store the new handle in the locked `slot`
    async fn connect_into(
        &self,
        slot: &mut Option<CachedConnection<C::Handle>>,
        connection_string: &str,
    ) -> Result<C::Handle> {
        connection_string::validate(connection_string)?;
        let redacted = redact(connection_string);

        let handle = match self.connector.connect(connection_string, &self.options).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to create client for {}: {}", redacted, e);
                return Err(e);
            }
        };
        if let Err(e) = self.connector.ping(&handle).await {
            warn!("Liveness probe failed for {}: {}", redacted, e);
            return Err(e);
        }

        if let Some(previous) = slot.take() {
            info!("Replacing cached connection to {}", redact(&previous.key));
        }
        *slot = Some(CachedConnection {
            key: connection_string.to_string(),
            handle: handle.clone(),
            verified_at: Instant::now(),
        });
        info!(
            "Connected to {} with pool size {}",
            redacted, self.options.max_pool_size
        );
        Ok(handle)
    }

    /// Drop the cached entry regardless of its believed health
    pub async fn invalidate(&self) {
        if let Some(previous) = self.slot.lock().await.take() {
            info!("Connection cache cleared for {}", redact(&previous.key));
        }
    }

    /// Redacted connection string of the cached entry, if any
    pub async fn cached_key(&self) -> Option<String> {
        self.slot.lock().await.as_ref().map(|cached| redact(&cached.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncLensError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FlakyConnector {
        connects: AtomicUsize,
        pings: AtomicUsize,
        fail_ping: AtomicBool,
    }

    #[async_trait]
    impl Connector for Arc<FlakyConnector> {
        type Handle = Arc<usize>;

        async fn connect(&self, _: &str, _: &PoolOptions) -> Result<Self::Handle> {
            Ok(Arc::new(self.connects.fetch_add(1, Ordering::SeqCst)))
        }

        async fn ping(&self, _: &Self::Handle) -> Result<()> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            if self.fail_ping.load(Ordering::SeqCst) {
                Err(SyncLensError::ConnectFailed("ping timed out".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_failed_probe_is_not_cached() {
        let connector = Arc::new(FlakyConnector::default());
        connector.fail_ping.store(true, Ordering::SeqCst);
        let cache = ConnectionCache::new(connector.clone(), PoolOptions::default());

        assert!(matches!(
            cache.get_or_connect("mongodb://a").await,
            Err(SyncLensError::ConnectFailed(_))
        ));
        assert_eq!(cache.cached_key().await, None);

        connector.fail_ping.store(false, Ordering::SeqCst);
        cache.get_or_connect("mongodb://a").await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_string_never_reaches_connector() {
        let connector = Arc::new(FlakyConnector::default());
        let cache = ConnectionCache::new(connector.clone(), PoolOptions::default());
        assert!(matches!(
            cache.get_or_connect("localhost:27017").await,
            Err(SyncLensError::InvalidConnectionString(_))
        ));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validate_connection_invalidates_on_failure() {
        let connector = Arc::new(FlakyConnector::default());
        let cache = ConnectionCache::new(connector.clone(), PoolOptions::default());
        cache.validate_connection("mongodb://a").await.unwrap();
        assert_eq!(cache.cached_key().await.as_deref(), Some("mongodb://a"));

        // Cluster goes away after the handle was cached
        connector.fail_ping.store(true, Ordering::SeqCst);
        assert!(cache.validate_connection("mongodb://a").await.is_err());
        assert_eq!(cache.cached_key().await, None);
    }

    #[tokio::test]
    async fn test_validate_connection_probes_once_per_call() {
        let connector = Arc::new(FlakyConnector::default());
        let cache = ConnectionCache::new(connector.clone(), PoolOptions::default());

        // Miss: connect path already probed the fresh handle
        cache.validate_connection("mongodb://a").await.unwrap();
        assert_eq!(connector.pings.load(Ordering::SeqCst), 1);

        // Hit: the cached handle is probed again
        cache.validate_connection("mongodb://a").await.unwrap();
        assert_eq!(connector.pings.load(Ordering::SeqCst), 2);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validate_connection_failed_miss_clears_slot() {
        let connector = Arc::new(FlakyConnector::default());
        let cache = ConnectionCache::new(connector.clone(), PoolOptions::default());
        cache.get_or_connect("mongodb://a").await.unwrap();

        assert!(matches!(
            cache.validate_connection("mongodb://b:99999").await,
            Err(SyncLensError::InvalidConnectionString(_))
        ));
        assert_eq!(cache.cached_key().await, None);
    }
}
