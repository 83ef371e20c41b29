use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    models::{Recommendation, RecommendationCollection, RecommendationReason, ScoringPolicy, UserId},
    services::providers::{ActivityProvider, SocialGraphProvider},
};

/// Tuning knobs for a generation pass
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Maximum number of upstream calls in flight at once
    pub max_concurrency: usize,
    /// Budget for a single upstream call
    pub upstream_timeout: Duration,
    /// Budget for the whole pass when no explicit deadline is given
    pub deadline: Duration,
    /// Drop candidates the requester is already connected to
    pub exclude_existing_connections: bool,
    pub scoring: ScoringPolicy,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            upstream_timeout: Duration::from_secs(2),
            deadline: Duration::from_secs(5),
            exclude_existing_connections: false,
            scoring: ScoringPolicy::default(),
        }
    }
}

/// Outcome of one fanned-out upstream call
enum Fetch<T> {
    Done(T),
    Failed(String),
    TimedOut,
    DeadlineExceeded,
}

/// Builds second-degree recommendations from the social graph.
///
/// Walks two hops out from the requester: their connections, then the people
/// each connection recently connected with. Every candidate found that way is
/// justified by the set of connections that led to it and scored with its
/// recent activity.
pub struct RecommendationGenerator {
    social_graph: Arc<dyn SocialGraphProvider>,
    activity: Arc<dyn ActivityProvider>,
    options: GenerationOptions,
}

impl RecommendationGenerator {
    pub fn new(social_graph: Arc<dyn SocialGraphProvider>, activity: Arc<dyn ActivityProvider>) -> Self {
        Self {
            social_graph,
            activity,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Generates recommendations under the configured overall deadline
    pub async fn generate(
        &self,
        for_user: UserId,
        lookback_days: u32,
    ) -> AppResult<RecommendationCollection> {
        let deadline = Instant::now() + self.options.deadline;
        self.generate_with_deadline(for_user, lookback_days, deadline)
            .await
    }

    /// Generates recommendations, failing with `DeadlineExceeded` once
    /// `deadline` passes.
    ///
    /// Only a failed connection lookup for `for_user` or the deadline fail the
    /// pass. Everything downstream degrades per item.
    #[instrument(skip(self, deadline), fields(user_id = %for_user))]
    pub async fn generate_with_deadline(
        &self,
        for_user: UserId,
        lookback_days: u32,
        deadline: Instant,
    ) -> AppResult<RecommendationCollection> {
        let started = std::time::Instant::now();
        let mut collection = RecommendationCollection::new(for_user);

        let connections = self.direct_connections(for_user, deadline).await?;
        if connections.is_empty() {
            tracing::info!("User has no connections, nothing to recommend");
            return Ok(collection);
        }

        let evidence = self
            .collect_evidence(&connections, lookback_days, deadline)
            .await?;

        let existing: HashSet<UserId> = if self.options.exclude_existing_connections {
            connections.iter().copied().collect()
        } else {
            HashSet::new()
        };
        let evidence: Vec<(UserId, BTreeSet<UserId>)> = evidence
            .into_iter()
            .filter(|(candidate, _)| !existing.contains(candidate))
            .collect();

        let activity = self
            .activity_counts(for_user, &evidence, lookback_days, deadline)
            .await?;

        let now = Utc::now();
        for (candidate, via) in evidence {
            let count = activity.get(&candidate).copied().unwrap_or(0);
            let reason = RecommendationReason::followed_by_connection(via);

            let recommendation = match Recommendation::with_policy(
                candidate,
                reason,
                count,
                self.options.scoring,
                now,
            ) {
                Ok(recommendation) => recommendation,
                Err(e) => {
                    tracing::debug!(candidate = %candidate, error = %e, "Skipping candidate");
                    continue;
                }
            };

            if let Err(e) = collection.add(recommendation) {
                tracing::debug!(candidate = %candidate, error = %e, "Candidate rejected by collection");
            }
        }

        tracing::info!(
            connections = connections.len(),
            recommendations = collection.count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generated recommendations"
        );

        Ok(collection)
    }

    /// Hop 1. The pass cannot continue without it, so failures propagate.
    async fn direct_connections(&self, for_user: UserId, deadline: Instant) -> AppResult<Vec<UserId>> {
        let call_deadline = deadline.min(Instant::now() + self.options.upstream_timeout);

        match timeout_at(call_deadline, self.social_graph.connections(for_user)).await {
            Ok(Ok(connections)) => {
                // Repeated entries would only repeat hop-2 lookups
                let mut seen = HashSet::new();
                Ok(connections
                    .into_iter()
                    .filter(|user| seen.insert(*user))
                    .collect())
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Connection lookup failed");
                if matches!(e, AppError::UpstreamFetch(_) | AppError::DeadlineExceeded) {
                    Err(e)
                } else {
                    Err(AppError::UpstreamFetch(format!("connection lookup: {}", e)))
                }
            }
            Err(_) if Instant::now() >= deadline => Err(AppError::DeadlineExceeded),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.options.upstream_timeout.as_millis() as u64,
                    "Connection lookup timed out"
                );
                Err(AppError::UpstreamFetch(
                    "connection lookup timed out".to_string(),
                ))
            }
        }
    }

    /// Hop 2. Maps each candidate to the connections that led to it, in
    /// first-discovery order.
    async fn collect_evidence(
        &self,
        connections: &[UserId],
        lookback_days: u32,
        deadline: Instant,
    ) -> AppResult<Vec<(UserId, BTreeSet<UserId>)>> {
        let graph = Arc::clone(&self.social_graph);
        let recent = self
            .fan_out("recent_connections", connections, deadline, move |user| {
                let graph = Arc::clone(&graph);
                async move { graph.recent_connections(user, lookback_days).await }
            })
            .await?;

        let mut order: Vec<(UserId, BTreeSet<UserId>)> = Vec::new();
        let mut index: HashMap<UserId, usize> = HashMap::new();

        for (connection, found) in connections.iter().zip(recent) {
            let Some(found) = found else { continue };
            for candidate in found {
                let slot = *index.entry(candidate).or_insert_with(|| {
                    order.push((candidate, BTreeSet::new()));
                    order.len() - 1
                });
                order[slot].1.insert(*connection);
            }
        }

        Ok(order)
    }

    /// Recent activity per candidate; lookups that fail count as zero
    async fn activity_counts(
        &self,
        for_user: UserId,
        evidence: &[(UserId, BTreeSet<UserId>)],
        lookback_days: u32,
        deadline: Instant,
    ) -> AppResult<HashMap<UserId, u32>> {
        let candidates: Vec<UserId> = evidence
            .iter()
            .map(|(candidate, _)| *candidate)
            .filter(|candidate| *candidate != for_user)
            .collect();

        let activity = Arc::clone(&self.activity);
        let counts = self
            .fan_out("count_recent_items", &candidates, deadline, move |user| {
                let activity = Arc::clone(&activity);
                async move { activity.count_recent_items(user, lookback_days).await }
            })
            .await?;

        Ok(candidates
            .into_iter()
            .zip(counts)
            .map(|(candidate, count)| (candidate, count.unwrap_or(0)))
            .collect())
    }

    /// Runs `call` for every key with bounded concurrency.
    ///
    /// Returns one slot per key in input order; `None` marks a per-item
    /// failure or timeout. Fails as a whole only when the overall deadline
    /// passes, in which case all in-flight calls are aborted.
    async fn fan_out<T, F, Fut>(
        &self,
        stage: &'static str,
        keys: &[UserId],
        deadline: Instant,
        call: F,
    ) -> AppResult<Vec<Option<T>>>
    where
        T: Send + 'static,
        F: Fn(UserId) -> Fut,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let per_call = self.options.upstream_timeout;
        let mut join_set = JoinSet::new();

        for (slot, key) in keys.iter().copied().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let fut = call(key);

            join_set.spawn(async move {
                let outcome = match timeout_at(deadline, semaphore.acquire_owned()).await {
                    Err(_) => Fetch::DeadlineExceeded,
                    Ok(Err(e)) => Fetch::Failed(e.to_string()),
                    Ok(Ok(_permit)) => {
                        let call_deadline = deadline.min(Instant::now() + per_call);
                        match timeout_at(call_deadline, fut).await {
                            Ok(Ok(value)) => Fetch::Done(value),
                            Ok(Err(e)) => Fetch::Failed(e.to_string()),
                            Err(_) if Instant::now() >= deadline => Fetch::DeadlineExceeded,
                            Err(_) => Fetch::TimedOut,
                        }
                    }
                };
                (slot, key, outcome)
            });
        }

        let mut results: Vec<Option<T>> = keys.iter().map(|_| None).collect();
        let mut failures = 0usize;

        while let Some(joined) = join_set.join_next().await {
            let (slot, key, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    failures += 1;
                    tracing::error!(stage, error = %e, "Upstream task join error");
                    continue;
                }
            };

            match outcome {
                Fetch::Done(value) => results[slot] = Some(value),
                Fetch::Failed(error) => {
                    failures += 1;
                    tracing::warn!(stage, user_id = %key, error = %error, "Upstream lookup failed, skipping");
                }
                Fetch::TimedOut => {
                    failures += 1;
                    tracing::warn!(stage, user_id = %key, "Upstream lookup timed out, skipping");
                }
                Fetch::DeadlineExceeded => {
                    tracing::warn!(stage, "Generation deadline exceeded, discarding partial results");
                    join_set.abort_all();
                    return Err(AppError::DeadlineExceeded);
                }
            }
        }

        if failures > 0 {
            tracing::warn!(
                stage,
                success_count = keys.len() - failures,
                error_count = failures,
                "Partial upstream failure"
            );
        }

        Ok(results)
    }
}
