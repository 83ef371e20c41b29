use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::{Recommendation, UserId};
use crate::error::{AppError, AppResult};

/// All recommendations produced for one requesting user in a single pass.
///
/// # Invariants
/// - No recommendation targets the owner.
/// - No two recommendations share a target user.
///
/// [`RecommendationCollection::add`] is the only way in, so every member has
/// passed both checks. Members keep their insertion order, which is the
/// tie-breaker for ranking.
#[derive(Debug, Clone)]
pub struct RecommendationCollection {
    owner: UserId,
    recommendations: Vec<Recommendation>,
    targets: HashSet<UserId>,
    generated_at: DateTime<Utc>,
}

impl RecommendationCollection {
    pub fn new(owner: UserId) -> Self {
        Self {
            owner,
            recommendations: Vec::new(),
            targets: HashSet::new(),
            generated_at: Utc::now(),
        }
    }

    pub fn add(&mut self, recommendation: Recommendation) -> AppResult<()> {
        let target = recommendation.target_user();

        if target == self.owner {
            return Err(AppError::SelfRecommendation);
        }
        if !self.targets.insert(target) {
            return Err(AppError::DuplicateRecommendation);
        }

        self.recommendations.push(recommendation);
        Ok(())
    }

    /// Highest-scoring recommendations first, equal scores in insertion order
    pub fn top_n(&self, n: usize) -> Vec<Recommendation> {
        let mut ranked = self.recommendations.clone();
        // sort_by is stable
        ranked.sort_by(|a, b| b.score().cmp(&a.score()));
        ranked.truncate(n);
        ranked
    }

    pub fn remove_expired(&mut self, now: DateTime<Utc>) {
        self.retain(|rec| !rec.is_expired(now));
    }

    pub fn filter_by_min_score(&mut self, min_score: u32) {
        self.retain(|rec| rec.score() >= min_score);
    }

    fn retain(&mut self, keep: impl Fn(&Recommendation) -> bool) {
        let before = self.recommendations.len();
        self.recommendations.retain(|rec| keep(rec));
        self.targets = self
            .recommendations
            .iter()
            .map(Recommendation::target_user)
            .collect();

        let removed = before - self.recommendations.len();
        if removed > 0 {
            tracing::debug!(owner = %self.owner, removed, "Dropped recommendations");
        }
    }

    pub fn get(&self, target: UserId) -> Option<&Recommendation> {
        self.recommendations
            .iter()
            .find(|rec| rec.target_user() == target)
    }

    pub fn count(&self) -> usize {
        self.recommendations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recommendations.is_empty()
    }

    pub fn all(&self) -> Vec<Recommendation> {
        self.recommendations.clone()
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }
}
