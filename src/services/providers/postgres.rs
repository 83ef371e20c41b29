/// Postgres-backed collaborators
///
/// Expects three tables:
/// - `follows(follower_id, following_id, status, created_at)`; only `active` rows count
/// - `posts(id, author_id, content, status, created_at)`; only `published` rows count
/// - `users(id, username, avatar, bio)`
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::{
    error::AppResult,
    models::{Post, PostId, UserId, UserProfile},
    services::providers::{ActivityProvider, ProfileProvider, SocialGraphProvider},
};

fn since(days: u32) -> DateTime<Utc> {
    Utc::now() - Duration::days(i64::from(days))
}

/// Converts raw ids from storage, dropping rows that violate the id invariant
fn to_user_ids(raw: Vec<i64>) -> Vec<UserId> {
    raw.into_iter()
        .filter_map(|id| match UserId::new(id) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(raw_id = id, error = %e, "Skipping invalid user id from database");
                None
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct PgSocialGraph {
    pool: PgPool,
}

impl PgSocialGraph {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SocialGraphProvider for PgSocialGraph {
    async fn connections(&self, user: UserId) -> AppResult<Vec<UserId>> {
        let rows: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT following_id
            FROM follows
            WHERE follower_id = $1 AND status = 'active'
            ORDER BY created_at
            "#,
        )
        .bind(user.value())
        .fetch_all(&self.pool)
        .await?;

        Ok(to_user_ids(rows))
    }

    async fn recent_connections(&self, user: UserId, since_days: u32) -> AppResult<Vec<UserId>> {
        let rows: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT following_id
            FROM follows
            WHERE follower_id = $1 AND status = 'active' AND created_at >= $2
            ORDER BY created_at
            "#,
        )
        .bind(user.value())
        .bind(since(since_days))
        .fetch_all(&self.pool)
        .await?;

        Ok(to_user_ids(rows))
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[derive(Clone)]
pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ActivityProvider for PgContentStore {
    async fn count_recent_items(&self, user: UserId, since_days: u32) -> AppResult<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM posts
            WHERE author_id = $1 AND created_at >= $2 AND status = 'published'
            "#,
        )
        .bind(user.value())
        .bind(since(since_days))
        .fetch_one(&self.pool)
        .await?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn recent_posts(&self, user: UserId, limit: usize) -> AppResult<Vec<Post>> {
        let rows: Vec<(i64, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, content, created_at
            FROM posts
            WHERE author_id = $1 AND status = 'published'
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user.value())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, content, created_at)| {
                PostId::new(id).ok().map(|id| Post {
                    id,
                    author_id: user,
                    content,
                    created_at,
                })
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProfileProvider for PgProfileStore {
    async fn profiles(&self, users: &[UserId]) -> AppResult<Vec<UserProfile>> {
        if users.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = users.iter().map(UserId::value).collect();
        let rows: Vec<(i64, String, Option<String>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT id, username, avatar, bio
            FROM users
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, username, avatar, bio)| {
                UserId::new(id).ok().map(|user_id| UserProfile {
                    user_id,
                    username,
                    avatar,
                    bio,
                })
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
