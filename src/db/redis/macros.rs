/// Read-through caching for an async lookup returning `AppResult<T>`.
///
/// Returns the cached value for `$key` when present. Otherwise awaits
/// `$fetch`, queues the result on the background writer with `$ttl` seconds
/// to live and returns it. A failed cache read is logged and treated as a
/// miss so an unavailable Redis never hides the live source.
///
/// ```rust,ignore
/// cached!(
///     cache,
///     CacheKey::ReasonText(kind.to_string(), count),
///     600,
///     self.fetch_remote(kind, count)
/// )
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $fetch:expr) => {{
        let key = $key;
        let hit = match $cache.get_from_cache(&key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, fetching from source");
                None
            }
        };
        match hit {
            Some(hit) => {
                tracing::debug!(key = %key, "Cache hit");
                Ok(hit)
            }
            None => {
                let value = $fetch.await?;
                $cache.set_in_background(&key, &value, $ttl);
                Ok(value)
            }
        }
    }};
}
