//! Model-catalogue cache (spec §3 `ProviderDescriptor.model catalogue`,
//! §5 concurrency note).
//!
//! Write-through, 1-hour TTL, grounded on the `InMemoryCache`/`CachedResponse`
//! expiry idiom in `cache.rs`. Concurrent callers observing an expired entry
//! perform at most one upstream refresh: the refresh runs while holding the
//! per-provider lock, so every other caller simply waits for it and then
//! reads the now-fresh entry instead of issuing its own request.

use crate::error::ProviderError;
use crate::models::ModelInfo;
use crate::providers::ProviderClient;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct Entry {
    models: Arc<Vec<ModelInfo>>,
    fetched_at: Instant,
}

/// Per-provider lazy, TTL-cached model catalogue.
pub struct ModelCatalogue {
    client: Arc<dyn ProviderClient>,
    ttl: Duration,
    entry: Mutex<Option<Entry>>,
}

impl ModelCatalogue {
    pub fn new(client: Arc<dyn ProviderClient>) -> Self {
        Self {
            client,
            ttl: DEFAULT_TTL,
            entry: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn with_ttl(client: Arc<dyn ProviderClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// Returns the cached catalogue, refreshing it first if missing or
    /// stale. Held under the provider's lock for the duration of any
    /// refresh so at most one upstream call happens per expiry.
    pub async fn get(&self) -> Result<Arc<Vec<ModelInfo>>, ProviderError> {
        let mut guard = self.entry.lock().await;

        let needs_refresh = match &*guard {
            Some(entry) => entry.fetched_at.elapsed() >= self.ttl,
            None => true,
        };

        if needs_refresh {
            let models = self.client.list_models().await?;
            *guard = Some(Entry {
                models: Arc::new(models),
                fetched_at: Instant::now(),
            });
        }

        Ok(Arc::clone(&guard.as_ref().expect("just populated above").models))
    }

    /// Drops the cached entry so the next `get` always refreshes.
    pub async fn invalidate(&self) {
        *self.entry.lock().await = None;
    }
}
