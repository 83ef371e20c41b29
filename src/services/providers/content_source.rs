use crate::{
    error::AppResult,
    models::{Post, UserId},
    services::providers::{
        ActivityProvider, ContentServiceClient, InMemoryContent, PgContentStore,
    },
};

/// Content backend selected once at startup.
///
/// Callers only see [`ActivityProvider`]; which backend answers is decided by
/// configuration when the application state is built.
#[derive(Clone)]
pub enum ContentSource {
    Memory(InMemoryContent),
    Postgres(PgContentStore),
    Http(ContentServiceClient),
}

impl ContentSource {
    fn backend(&self) -> &dyn ActivityProvider {
        match self {
            ContentSource::Memory(inner) => inner,
            ContentSource::Postgres(inner) => inner,
            ContentSource::Http(inner) => inner,
        }
    }
}

#[async_trait::async_trait]
impl ActivityProvider for ContentSource {
    async fn count_recent_items(&self, user: UserId, since_days: u32) -> AppResult<u32> {
        self.backend().count_recent_items(user, since_days).await
    }

    async fn recent_posts(&self, user: UserId, limit: usize) -> AppResult<Vec<Post>> {
        self.backend().recent_posts(user, limit).await
    }

    fn name(&self) -> &'static str {
        self.backend().name()
    }
}
