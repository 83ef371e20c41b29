/// Collaborator abstractions consumed by the recommendation engine
///
/// The generator only ever sees these traits. Concrete backends (in-memory,
/// Postgres, remote content service) live in the submodules and are chosen
/// once at startup.
use crate::{
    error::AppResult,
    models::{Post, UserId, UserProfile},
};

pub mod content_http;
pub mod content_source;
pub mod memory;
pub mod postgres;

pub use content_http::ContentServiceClient;
pub use content_source::ContentSource;
pub use memory::{InMemoryContent, InMemoryProfiles, InMemorySocialGraph};
pub use postgres::{PgContentStore, PgProfileStore, PgSocialGraph};

/// Read access to the social graph
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SocialGraphProvider: Send + Sync {
    /// Users that `user` is directly connected to
    async fn connections(&self, user: UserId) -> AppResult<Vec<UserId>>;

    /// Connections `user` made within the last `since_days` days
    async fn recent_connections(&self, user: UserId, since_days: u32) -> AppResult<Vec<UserId>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Activity signal for candidate users
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ActivityProvider: Send + Sync {
    /// Number of items `user` published within the last `since_days` days
    async fn count_recent_items(&self, user: UserId, since_days: u32) -> AppResult<u32>;

    /// Most recent published posts, newest first
    async fn recent_posts(&self, user: UserId, limit: usize) -> AppResult<Vec<Post>>;

    fn name(&self) -> &'static str;
}

/// Batch lookup of display metadata for users
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ProfileProvider: Send + Sync {
    /// Returns profiles for the ids that exist; unknown ids are omitted
    async fn profiles(&self, users: &[UserId]) -> AppResult<Vec<UserProfile>>;

    fn name(&self) -> &'static str;
}
