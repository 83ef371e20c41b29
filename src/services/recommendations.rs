use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    models::{
        PostSummary, Recommendation, RecommendationResponse, RecommendedUser, UserId, UserProfile,
    },
    services::{
        generator::RecommendationGenerator,
        providers::{ActivityProvider, ProfileProvider},
        reason_text::ReasonDescriber,
    },
};

/// Request-level settings for [`RecommendationService`]
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// How far back "recent" reaches for connections and activity
    pub lookback_days: u32,
    pub default_limit: usize,
    pub max_limit: usize,
    /// Candidates scoring below this are dropped before ranking
    pub min_score: u32,
    /// Recent posts attached per recommended user
    pub recent_posts_limit: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            default_limit: 10,
            max_limit: 50,
            min_score: 0,
            recent_posts_limit: 3,
        }
    }
}

/// Turns a generation pass into a response a client can render.
///
/// Ranking happens on the bare candidates. Display data (profiles, recent
/// posts, reason text) is only resolved for the users that make the cut.
pub struct RecommendationService {
    generator: RecommendationGenerator,
    activity: Arc<dyn ActivityProvider>,
    profiles: Arc<dyn ProfileProvider>,
    describer: ReasonDescriber,
    settings: ServiceSettings,
}

impl RecommendationService {
    pub fn new(
        generator: RecommendationGenerator,
        activity: Arc<dyn ActivityProvider>,
        profiles: Arc<dyn ProfileProvider>,
        describer: ReasonDescriber,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            generator,
            activity,
            profiles,
            describer,
            settings,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Resolves the requested page size; missing or zero means the default
    pub fn clamp_limit(&self, limit: Option<usize>) -> usize {
        match limit {
            None | Some(0) => self.settings.default_limit.min(self.settings.max_limit),
            Some(n) => n.min(self.settings.max_limit),
        }
    }

    #[instrument(skip(self))]
    pub async fn recommend(
        &self,
        user_id: i64,
        limit: Option<usize>,
    ) -> AppResult<RecommendationResponse> {
        let user = UserId::new(user_id)?;
        let limit = self.clamp_limit(limit);

        let mut collection = self
            .generator
            .generate(user, self.settings.lookback_days)
            .await?;
        collection.remove_expired(chrono::Utc::now());
        collection.filter_by_min_score(self.settings.min_score);

        let top = collection.top_n(limit);
        let mut response = RecommendationResponse {
            user_id: user,
            generated_at: collection.generated_at(),
            recommendations: Vec::with_capacity(top.len()),
        };
        if top.is_empty() {
            tracing::info!("No recommendations for user");
            return Ok(response);
        }

        let targets: Vec<UserId> = top.iter().map(Recommendation::target_user).collect();

        let mut profiles: HashMap<UserId, UserProfile> = self
            .profiles
            .profiles(&targets)
            .await
            .map_err(|e| as_upstream(self.profiles.name(), e))?
            .into_iter()
            .map(|profile| (profile.user_id, profile))
            .collect();

        let kept: Vec<(&Recommendation, UserProfile)> = top
            .iter()
            .filter_map(|recommendation| {
                let target = recommendation.target_user();
                let profile = profiles.remove(&target);
                if profile.is_none() {
                    tracing::debug!(target_user = %target, "No profile for candidate, skipping");
                }
                profile.map(|profile| (recommendation, profile))
            })
            .collect();
        let kept_targets: Vec<UserId> = kept.iter().map(|(rec, _)| rec.target_user()).collect();

        let (mut posts, described) = tokio::join!(
            self.recent_posts(&kept_targets),
            self.describer
                .describe_all(kept.iter().map(|(rec, _)| rec.reason())),
        );

        for ((recommendation, profile), described) in kept.into_iter().zip(described) {
            let target = recommendation.target_user();

            response.recommendations.push(RecommendedUser {
                recommendation_id: recommendation.id(),
                user_id: target,
                username: profile.username,
                avatar: profile.avatar,
                bio: profile.bio,
                reason: described.description(),
                score: recommendation.score(),
                connected_via: recommendation.reason().evidence().iter().copied().collect(),
                recent_posts: posts.remove(&target).unwrap_or_default(),
            });
        }

        tracing::info!(
            candidates = collection.count(),
            returned = response.recommendations.len(),
            limit,
            "Recommendations assembled"
        );

        Ok(response)
    }

    /// Fetches recent posts for every target concurrently; failures yield no posts
    async fn recent_posts(&self, targets: &[UserId]) -> HashMap<UserId, Vec<PostSummary>> {
        let per_call = self.generator.options().upstream_timeout;
        let limit = self.settings.recent_posts_limit;
        let mut posts = HashMap::with_capacity(targets.len());

        if limit == 0 {
            return posts;
        }

        let mut join_set = JoinSet::new();
        for &target in targets {
            let activity = Arc::clone(&self.activity);
            join_set.spawn(async move {
                let result =
                    tokio::time::timeout(per_call, activity.recent_posts(target, limit)).await;
                (target, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((target, Ok(Ok(found)))) => {
                    let summaries = found
                        .into_iter()
                        .take(limit)
                        .map(PostSummary::from)
                        .collect();
                    posts.insert(target, summaries);
                }
                Ok((target, Ok(Err(e)))) => {
                    tracing::warn!(target_user = %target, error = %e, "Recent posts lookup failed");
                }
                Ok((target, Err(_))) => {
                    tracing::warn!(target_user = %target, "Recent posts lookup timed out");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Recent posts task panicked");
                }
            }
        }

        posts
    }
}

fn as_upstream(source: &str, error: AppError) -> AppError {
    if matches!(
        error,
        AppError::UpstreamFetch(_) | AppError::DeadlineExceeded
    ) {
        error
    } else {
        AppError::UpstreamFetch(format!("{} profile lookup failed: {}", source, error))
    }
}
