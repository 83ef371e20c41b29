use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub mod collection;
pub mod reason;
pub mod recommendation;

pub use collection::RecommendationCollection;
pub use reason::{DescribedReason, ReasonKind, RecommendationReason};
pub use recommendation::{Recommendation, ScoringPolicy};

/// Identifier for a user. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct UserId(i64);

impl UserId {
    pub fn new(value: i64) -> AppResult<Self> {
        if value <= 0 {
            return Err(AppError::InvalidIdentifier(format!(
                "user id must be positive, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for UserId {
    type Error = AppError;

    fn try_from(value: i64) -> AppResult<Self> {
        Self::new(value)
    }
}

impl From<UserId> for i64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a post. Same positivity rule as [`UserId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct PostId(i64);

impl PostId {
    pub fn new(value: i64) -> AppResult<Self> {
        if value <= 0 {
            return Err(AppError::InvalidIdentifier(format!(
                "post id must be positive, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for PostId {
    type Error = AppError;

    fn try_from(value: i64) -> AppResult<Self> {
        Self::new(value)
    }
}

impl From<PostId> for i64 {
    fn from(id: PostId) -> Self {
        id.0
    }
}

impl Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity of a single recommendation, allocated at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecommendationId(Uuid);

impl RecommendationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a recommendation id from its string form
    pub fn parse(value: &str) -> AppResult<Self> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|e| AppError::InvalidIdentifier(format!("recommendation id: {}", e)))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecommendationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RecommendationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A published post, as reported by a content backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Display metadata for a user, resolved in batch after ranking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: UserId,
    pub username: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
}

// ============================================================================
// Response Types
// ============================================================================

/// Ranked recommendations returned to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub user_id: UserId,
    pub generated_at: DateTime<Utc>,
    pub recommendations: Vec<RecommendedUser>,
}

/// A single recommended user with display data attached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedUser {
    pub recommendation_id: RecommendationId,
    pub user_id: UserId,
    pub username: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub reason: String,
    pub score: u32,
    pub connected_via: Vec<UserId>,
    pub recent_posts: Vec<PostSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostSummary {
    pub post_id: PostId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Post> for PostSummary {
    fn from(post: Post) -> Self {
        Self {
            post_id: post.id,
            content: post.content,
            created_at: post.created_at,
        }
    }
}
