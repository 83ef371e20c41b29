/// Externally configured display text for recommendation reasons
///
/// Copy for reasons can be managed by a remote text service. The service is
/// optional: whenever it is absent, slow, failing or returns nothing, the
/// reason's built-in description is used instead.
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{DescribedReason, RecommendationReason},
};

const REASON_TEXT_CACHE_TTL: u64 = 600; // 10 minutes

/// Source of display text for a reason kind and evidence count
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ReasonTextSource: Send + Sync {
    async fn reason_text(&self, kind: &str, evidence_count: usize) -> AppResult<String>;
}

#[derive(Debug, Deserialize)]
struct ReasonTextEnvelope {
    code: i32,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<ReasonTextData>,
}

#[derive(Debug, Deserialize)]
struct ReasonTextData {
    #[serde(default)]
    text: String,
}

impl ReasonTextEnvelope {
    fn into_text(self) -> AppResult<String> {
        if self.code != 0 {
            return Err(AppError::UpstreamFetch(format!(
                "reason text service error: code={}, message={}",
                self.code, self.message
            )));
        }
        Ok(self.data.map(|data| data.text).unwrap_or_default())
    }
}

/// HTTP client for the reason text service, optionally cached in Redis
#[derive(Clone)]
pub struct ReasonTextClient {
    http_client: HttpClient,
    base_url: String,
    cache: Option<Cache>,
}

impl ReasonTextClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, cache: Option<Cache>) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache,
        })
    }

    async fn fetch_remote(&self, kind: &str, evidence_count: usize) -> AppResult<String> {
        let url = format!("{}/api/v1/recommendation/reason-text", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .query(&[("type", kind.to_string()), ("count", evidence_count.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::UpstreamFetch(format!(
                "reason text service returned status {}",
                status
            )));
        }

        let envelope: ReasonTextEnvelope = response.json().await?;
        let text = envelope.into_text()?;

        tracing::debug!(kind = %kind, count = evidence_count, "Fetched reason text");

        Ok(text)
    }
}

#[async_trait::async_trait]
impl ReasonTextSource for ReasonTextClient {
    async fn reason_text(&self, kind: &str, evidence_count: usize) -> AppResult<String> {
        match &self.cache {
            Some(cache) => cached!(
                cache,
                CacheKey::ReasonText(kind.to_string(), evidence_count),
                REASON_TEXT_CACHE_TTL,
                self.fetch_remote(kind, evidence_count)
            ),
            None => self.fetch_remote(kind, evidence_count).await,
        }
    }
}

/// Lookup key for reason text: wire kind and evidence count
type TextKey = (&'static str, usize);

fn text_key(reason: &RecommendationReason) -> TextKey {
    (reason.kind().text_source_key(), reason.evidence().len())
}

/// Renders reasons, consulting the optional text source first
#[derive(Clone)]
pub struct ReasonDescriber {
    source: Option<Arc<dyn ReasonTextSource>>,
    timeout: Duration,
}

impl Default for ReasonDescriber {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ReasonDescriber {
    pub fn new(source: Option<Arc<dyn ReasonTextSource>>) -> Self {
        Self {
            source,
            timeout: Duration::from_secs(2),
        }
    }

    /// Budget for a single text lookup before falling back to built-in text
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn describe<'a>(&self, reason: &'a RecommendationReason) -> DescribedReason<'a> {
        let mut described = self.describe_all([reason]).await;
        described
            .pop()
            .unwrap_or_else(|| DescribedReason::new(reason, None))
    }

    /// Describes every reason, in input order.
    ///
    /// Each distinct (kind, evidence count) pair is looked up once and all
    /// lookups run concurrently under the per-call timeout.
    pub async fn describe_all<'a>(
        &self,
        reasons: impl IntoIterator<Item = &'a RecommendationReason>,
    ) -> Vec<DescribedReason<'a>> {
        let reasons: Vec<&RecommendationReason> = reasons.into_iter().collect();
        let texts = match &self.source {
            Some(source) => self.resolve(source, &reasons).await,
            None => HashMap::new(),
        };

        reasons
            .into_iter()
            .map(|reason| DescribedReason::new(reason, texts.get(&text_key(reason)).cloned()))
            .collect()
    }

    async fn resolve(
        &self,
        source: &Arc<dyn ReasonTextSource>,
        reasons: &[&RecommendationReason],
    ) -> HashMap<TextKey, String> {
        let keys: HashSet<TextKey> = reasons.iter().map(|reason| text_key(reason)).collect();
        let mut texts = HashMap::with_capacity(keys.len());

        let mut join_set = JoinSet::new();
        for (kind, count) in keys {
            let source = Arc::clone(source);
            let per_call = self.timeout;
            join_set.spawn(async move {
                let result = tokio::time::timeout(per_call, source.reason_text(kind, count)).await;
                ((kind, count), result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((key, Ok(Ok(text)))) => {
                    texts.insert(key, text);
                }
                Ok(((kind, count), Ok(Err(e)))) => {
                    tracing::warn!(kind, count, error = %e, "Reason text lookup failed, using built-in text");
                }
                Ok(((kind, count), Err(_))) => {
                    tracing::warn!(kind, count, "Reason text lookup timed out, using built-in text");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Reason text task panicked");
                }
            }
        }

        texts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;
    use axum::extract::Query;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn reason() -> RecommendationReason {
        RecommendationReason::followed_by_connection(vec![
            UserId::new(2).unwrap(),
            UserId::new(3).unwrap(),
        ])
    }

    #[tokio::test]
    async fn test_describer_without_source_uses_builtin() {
        let describer = ReasonDescriber::default();
        let reason = reason();
        let described = describer.describe(&reason).await;
        assert_eq!(described.description(), "Followed by 2 people you follow");
    }

    #[tokio::test]
    async fn test_describer_uses_source_text() {
        let mut source = MockReasonTextSource::new();
        source
            .expect_reason_text()
            .withf(|kind, count| kind == "followed_by_following" && *count == 2)
            .returning(|_, _| Ok("2 of your friends follow them".to_string()));

        let describer = ReasonDescriber::new(Some(Arc::new(source)));
        let reason = reason();
        let described = describer.describe(&reason).await;
        assert_eq!(described.description(), "2 of your friends follow them");
    }

    #[tokio::test]
    async fn test_describer_falls_back_on_error() {
        let mut source = MockReasonTextSource::new();
        source
            .expect_reason_text()
            .returning(|_, _| Err(AppError::UpstreamFetch("down".to_string())));

        let describer = ReasonDescriber::new(Some(Arc::new(source)));
        let reason = reason();
        let described = describer.describe(&reason).await;
        assert!(!described.is_overridden());
        assert_eq!(described.description(), "Followed by 2 people you follow");
    }

    #[tokio::test]
    async fn test_describer_falls_back_on_empty_text() {
        let mut source = MockReasonTextSource::new();
        source
            .expect_reason_text()
            .returning(|_, _| Ok(String::new()));

        let describer = ReasonDescriber::new(Some(Arc::new(source)));
        let reason = reason();
        assert_eq!(
            describer.describe(&reason).await.description(),
            "Followed by 2 people you follow"
        );
    }

    fn evidence(ids: &[i64]) -> Vec<UserId> {
        ids.iter().map(|id| UserId::new(*id).unwrap()).collect()
    }

    /// Answers every lookup after `delay`, counting calls
    struct SlowSource {
        delay: Duration,
        calls: AtomicUsize,
    }

    impl SlowSource {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ReasonTextSource for SlowSource {
        async fn reason_text(&self, kind: &str, evidence_count: usize) -> AppResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(format!("{}:{}", kind, evidence_count))
        }
    }

    #[tokio::test]
    async fn test_describe_all_looks_up_each_key_once() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(10)));
        let shared: Arc<dyn ReasonTextSource> = source.clone();
        let describer = ReasonDescriber::new(Some(shared));

        let reasons = vec![
            RecommendationReason::followed_by_connection(evidence(&[2])),
            RecommendationReason::followed_by_connection(evidence(&[3])),
            RecommendationReason::followed_by_connection(evidence(&[2, 3])),
            RecommendationReason::followed_by_connection(evidence(&[4])),
            RecommendationReason::custom("editor_pick", evidence(&[5])),
        ];
        let described = describer.describe_all(&reasons).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        let texts: Vec<String> = described.iter().map(|d| d.description()).collect();
        assert_eq!(
            texts,
            vec![
                "followed_by_following:1",
                "followed_by_following:1",
                "followed_by_following:2",
                "followed_by_following:1",
                "default:1",
            ]
        );
    }

    #[tokio::test]
    async fn test_describe_all_runs_lookups_concurrently() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(300)));
        let shared: Arc<dyn ReasonTextSource> = source.clone();
        let describer = ReasonDescriber::new(Some(shared));

        let reasons: Vec<RecommendationReason> = (1..=4)
            .map(|n| RecommendationReason::followed_by_connection(evidence(&(1..=n).collect::<Vec<_>>())))
            .collect();

        let started = std::time::Instant::now();
        let described = describer.describe_all(&reasons).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
        assert!(described.iter().all(|d| d.is_overridden()));
        assert!(started.elapsed() < Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_describe_all_falls_back_after_timeout() {
        let source: Arc<dyn ReasonTextSource> =
            Arc::new(SlowSource::new(Duration::from_millis(500)));
        let describer =
            ReasonDescriber::new(Some(source)).with_timeout(Duration::from_millis(50));
        let reason = reason();

        let started = std::time::Instant::now();
        let described = describer.describe(&reason).await;

        assert!(!described.is_overridden());
        assert_eq!(described.description(), "Followed by 2 people you follow");
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    /// Local reason text service echoing `type:count`
    async fn serve_reason_text() -> String {
        async fn handler(
            Query(params): Query<HashMap<String, String>>,
        ) -> axum::Json<serde_json::Value> {
            let kind = params.get("type").cloned().unwrap_or_default();
            let count = params.get("count").cloned().unwrap_or_default();
            axum::Json(serde_json::json!({
                "code": 0,
                "message": "",
                "data": { "text": format!("{}:{}", kind, count) }
            }))
        }

        let app = axum::Router::new().route(
            "/api/v1/recommendation/reason-text",
            axum::routing::get(handler),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", address)
    }

    #[tokio::test]
    async fn test_client_sends_wire_kind() {
        let base_url = serve_reason_text().await;
        let client = ReasonTextClient::new(base_url, Duration::from_secs(2), None).unwrap();
        let describer = ReasonDescriber::new(Some(Arc::new(client)));

        let reason = reason();
        let described = describer.describe(&reason).await;
        assert_eq!(described.description(), "followed_by_following:2");
    }

    #[tokio::test]
    async fn test_client_reaches_service_when_cache_is_down() {
        let base_url = serve_reason_text().await;
        let redis = crate::db::create_redis_client("redis://127.0.0.1:1").unwrap();
        let (cache, _handle) = Cache::new(redis);
        let client = ReasonTextClient::new(base_url, Duration::from_secs(2), Some(cache)).unwrap();

        let text = client.reason_text("popular_in_network", 4).await.unwrap();
        assert_eq!(text, "popular_in_network:4");
    }

    #[test]
    fn test_envelope_success() {
        let json = r#"{"code": 0, "message": "", "data": {"text": "Friends follow them"}}"#;
        let envelope: ReasonTextEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.into_text().unwrap(), "Friends follow them");
    }

    #[test]
    fn test_envelope_error_code() {
        let json = r#"{"code": 1001, "message": "unknown type"}"#;
        let envelope: ReasonTextEnvelope = serde_json::from_str(json).unwrap();
        let err = envelope.into_text().unwrap_err();
        assert!(err.to_string().contains("code=1001"));
    }

    #[test]
    fn test_envelope_missing_data_is_empty_text() {
        let envelope: ReasonTextEnvelope = serde_json::from_str(r#"{"code": 0}"#).unwrap();
        assert_eq!(envelope.into_text().unwrap(), "");
    }
}
