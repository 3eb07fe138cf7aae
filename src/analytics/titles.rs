use crate::error::AppResult;
use crate::store::queries;
use deadpool_sqlite::Pool;
use moka::sync::Cache;
use std::collections::HashMap;
use std::time::Duration;

/// In-memory cache for content-id -> title lookups, so repeated journey
/// analyses do not re-read stable titles from the store.
pub struct TitleCache {
    inner: Cache<String, String>,
}

impl TitleCache {
    pub fn new() -> Self {
        Self {
            inner: Cache::builder()
                .time_to_live(Duration::from_secs(600))
                .max_capacity(4096)
                .build(),
        }
    }

    /// Resolve titles for a set of content ids: cached entries are served
    /// from memory, the rest go through one batched store lookup. Ids with
    /// no matching content are simply absent from the result.
    pub async fn resolve(
        &self,
        pool: &Pool,
        ids: Vec<String>,
    ) -> AppResult<HashMap<String, String>> {
        let mut resolved = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();

        for id in ids {
            match self.inner.get(&id) {
                Some(title) => {
                    resolved.insert(id, title);
                }
                None => missing.push(id),
            }
        }

        if !missing.is_empty() {
            let fetched = queries::content_titles(pool, &missing).await?;
            for (id, title) in fetched {
                self.inner.insert(id.clone(), title.clone());
                resolved.insert(id, title);
            }
        }

        Ok(resolved)
    }
}

impl Default for TitleCache {
    fn default() -> Self {
        Self::new()
    }
}
