/// Remote content service client
///
/// Talks to the content service over HTTP instead of reading the posts table
/// directly. Endpoints:
/// 1. Count: `/api/v1/users/{id}/posts/count?since_days=N` → `{"count": N}`
/// 2. Posts: `/api/v1/users/{id}/posts?limit=N` → `{"posts": [...]}`
use chrono::{DateTime, Utc};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{Post, PostId, UserId},
    services::providers::ActivityProvider,
};

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u32,
}

#[derive(Debug, Deserialize)]
struct PostsResponse {
    #[serde(default)]
    posts: Vec<RemotePost>,
}

#[derive(Debug, Deserialize)]
struct RemotePost {
    post_id: i64,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ContentServiceClient {
    http_client: HttpClient,
    base_url: String,
}

impl ContentServiceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> AppResult<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::UpstreamFetch(format!("content service unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                url = %url,
                status = %status,
                body = %body,
                "Content service request failed"
            );
            return Err(AppError::UpstreamFetch(format!(
                "content service returned status {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::UpstreamFetch(format!("invalid content service response: {}", e)))
    }
}

fn into_posts(author: UserId, response: PostsResponse) -> Vec<Post> {
    response
        .posts
        .into_iter()
        .filter_map(|post| match PostId::new(post.post_id) {
            Ok(id) => Some(Post {
                id,
                author_id: author,
                content: post.content,
                created_at: post.created_at,
            }),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping remote post with invalid id");
                None
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl ActivityProvider for ContentServiceClient {
    async fn count_recent_items(&self, user: UserId, since_days: u32) -> AppResult<u32> {
        let path = format!("/api/v1/users/{}/posts/count", user);
        let response: CountResponse = self
            .get_json(&path, &[("since_days", since_days.to_string())])
            .await?;
        Ok(response.count)
    }

    async fn recent_posts(&self, user: UserId, limit: usize) -> AppResult<Vec<Post>> {
        let path = format!("/api/v1/users/{}/posts", user);
        let response: PostsResponse = self
            .get_json(&path, &[("limit", limit.to_string())])
            .await?;
        Ok(into_posts(user, response))
    }

    fn name(&self) -> &'static str {
        "content_service"
    }
}
