/// In-memory collaborator backends
///
/// Used as the default wiring when no database is configured, and by the
/// integration tests. Data can be seeded from a JSON file at startup.
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{Post, UserId, UserProfile},
    services::providers::{ActivityProvider, ProfileProvider, SocialGraphProvider},
};

#[derive(Debug, Clone)]
struct Edge {
    target: UserId,
    created_at: DateTime<Utc>,
}

/// Directed follow graph held in memory
#[derive(Clone, Default)]
pub struct InMemorySocialGraph {
    edges: Arc<RwLock<HashMap<UserId, Vec<Edge>>>>,
}

impl InMemorySocialGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `follower` connected to `following` at `at`
    pub async fn connect(&self, follower: UserId, following: UserId, at: DateTime<Utc>) {
        let mut edges = self.edges.write().await;
        let out = edges.entry(follower).or_default();
        match out.iter_mut().find(|edge| edge.target == following) {
            Some(edge) => edge.created_at = at,
            None => out.push(Edge {
                target: following,
                created_at: at,
            }),
        }
    }

    pub async fn disconnect(&self, follower: UserId, following: UserId) {
        if let Some(out) = self.edges.write().await.get_mut(&follower) {
            out.retain(|edge| edge.target != following);
        }
    }
}

#[async_trait::async_trait]
impl SocialGraphProvider for InMemorySocialGraph {
    async fn connections(&self, user: UserId) -> AppResult<Vec<UserId>> {
        let edges = self.edges.read().await;
        Ok(edges
            .get(&user)
            .map(|out| out.iter().map(|edge| edge.target).collect())
            .unwrap_or_default())
    }

    async fn recent_connections(&self, user: UserId, since_days: u32) -> AppResult<Vec<UserId>> {
        let since = Utc::now() - Duration::days(i64::from(since_days));
        let edges = self.edges.read().await;
        Ok(edges
            .get(&user)
            .map(|out| {
                out.iter()
                    .filter(|edge| edge.created_at >= since)
                    .map(|edge| edge.target)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Published posts held in memory
#[derive(Clone, Default)]
pub struct InMemoryContent {
    posts: Arc<RwLock<HashMap<UserId, Vec<Post>>>>,
}

impl InMemoryContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, post: Post) {
        self.posts
            .write()
            .await
            .entry(post.author_id)
            .or_default()
            .push(post);
    }
}

#[async_trait::async_trait]
impl ActivityProvider for InMemoryContent {
    async fn count_recent_items(&self, user: UserId, since_days: u32) -> AppResult<u32> {
        let since = Utc::now() - Duration::days(i64::from(since_days));
        let posts = self.posts.read().await;
        let count = posts
            .get(&user)
            .map(|list| list.iter().filter(|post| post.created_at >= since).count())
            .unwrap_or(0);
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn recent_posts(&self, user: UserId, limit: usize) -> AppResult<Vec<Post>> {
        let posts = self.posts.read().await;
        let mut list = posts.get(&user).cloned().unwrap_or_default();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list.truncate(limit);
        Ok(list)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// User display metadata held in memory
#[derive(Clone, Default)]
pub struct InMemoryProfiles {
    profiles: Arc<RwLock<HashMap<UserId, UserProfile>>>,
}

impl InMemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, profile: UserProfile) {
        self.profiles.write().await.insert(profile.user_id, profile);
    }
}

#[async_trait::async_trait]
impl ProfileProvider for InMemoryProfiles {
    async fn profiles(&self, users: &[UserId]) -> AppResult<Vec<UserProfile>> {
        let profiles = self.profiles.read().await;
        Ok(users
            .iter()
            .filter_map(|id| profiles.get(id).cloned())
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// Seed Data
// ============================================================================

/// Snapshot used to populate the in-memory backends
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub follows: Vec<SeedFollow>,
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub profiles: Vec<UserProfile>,
}

#[derive(Debug, Deserialize)]
pub struct SeedFollow {
    pub follower_id: UserId,
    pub following_id: UserId,
    /// Defaults to the time the seed is applied
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Seed {
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Internal(format!("Failed to read seed file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| AppError::InvalidInput(format!("Malformed seed file: {}", e)))
    }

    pub async fn apply(
        self,
        graph: &InMemorySocialGraph,
        content: &InMemoryContent,
        profiles: &InMemoryProfiles,
    ) {
        let now = Utc::now();
        let (follows, posts, users) = (self.follows.len(), self.posts.len(), self.profiles.len());

        for follow in self.follows {
            graph
                .connect(
                    follow.follower_id,
                    follow.following_id,
                    follow.created_at.unwrap_or(now),
                )
                .await;
        }
        for post in self.posts {
            content.publish(post).await;
        }
        for profile in self.profiles {
            profiles.upsert(profile).await;
        }

        tracing::info!(follows, posts, profiles = users, "Applied in-memory seed");
    }
}
