use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::{RecommendationId, RecommendationReason, UserId};
use crate::error::{AppError, AppResult};

/// Multipliers and lifetime used to score recommendations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringPolicy {
    /// Weight per supporting connection for `FollowedByConnection`
    pub connection_weight: u32,
    /// Flat weight for `PopularInNetwork`
    pub popular_weight: u32,
    /// Weight for any other reason kind
    pub fallback_weight: u32,
    /// Points per recent activity item
    pub activity_multiplier: u32,
    /// How long a recommendation stays valid after creation or refresh
    pub ttl: Duration,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            connection_weight: 10,
            popular_weight: 5,
            fallback_weight: 1,
            activity_multiplier: 2,
            ttl: Duration::days(7),
        }
    }
}

impl ScoringPolicy {
    pub fn score(&self, reason: &RecommendationReason, recent_activity_count: u32) -> u32 {
        reason
            .weight_with(self)
            .saturating_add(recent_activity_count.saturating_mul(self.activity_multiplier))
    }
}

/// A scored recommendation of one target user.
///
/// The score is always derived from the reason and activity count; the only
/// way to change it is [`Recommendation::update_activity`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    id: RecommendationId,
    target_user: UserId,
    reason: RecommendationReason,
    score: u32,
    recent_activity_count: u32,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    #[serde(skip)]
    policy: ScoringPolicy,
}

impl Recommendation {
    /// Creates a recommendation under the default scoring policy, stamped now
    pub fn new(
        target_user: UserId,
        reason: RecommendationReason,
        recent_activity_count: u32,
    ) -> AppResult<Self> {
        Self::with_policy(
            target_user,
            reason,
            recent_activity_count,
            ScoringPolicy::default(),
            Utc::now(),
        )
    }

    pub fn with_policy(
        target_user: UserId,
        reason: RecommendationReason,
        recent_activity_count: u32,
        policy: ScoringPolicy,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        if reason.evidence().is_empty() {
            return Err(AppError::NoJustification);
        }

        let score = policy.score(&reason, recent_activity_count);

        Ok(Self {
            id: RecommendationId::new(),
            target_user,
            reason,
            score,
            recent_activity_count,
            created_at: now,
            expires_at: now + policy.ttl,
            policy,
        })
    }

    pub fn id(&self) -> RecommendationId {
        self.id
    }

    pub fn target_user(&self) -> UserId {
        self.target_user
    }

    pub fn reason(&self) -> &RecommendationReason {
        &self.reason
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn recent_activity_count(&self) -> u32 {
        self.recent_activity_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Extends the lifetime when the same candidate is seen again
    pub fn refresh(&mut self, now: DateTime<Utc>) {
        self.expires_at = now + self.policy.ttl;
    }

    pub fn update_activity(&mut self, count: u32) {
        self.recent_activity_count = count;
        self.score = self.policy.score(&self.reason, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64) -> UserId {
        UserId::new(id).unwrap()
    }

    fn reason(ids: &[i64]) -> RecommendationReason {
        RecommendationReason::followed_by_connection(ids.iter().map(|id| user(*id)))
    }

    #[test]
    fn test_new_computes_score() {
        let rec = Recommendation::new(user(5), reason(&[2, 3]), 5).unwrap();
        assert_eq!(rec.score(), 30);
        assert_eq!(rec.recent_activity_count(), 5);
        assert_eq!(rec.target_user(), user(5));
    }

    #[test]
    fn test_new_without_evidence_fails() {
        let result = Recommendation::new(user(5), reason(&[]), 3);
        assert!(matches!(result, Err(AppError::NoJustification)));
    }

    #[test]
    fn test_popular_reason_without_evidence_is_still_unjustified() {
        let result = Recommendation::new(user(5), RecommendationReason::popular_in_network(vec![]), 0);
        assert!(matches!(result, Err(AppError::NoJustification)));
    }

    #[test]
    fn test_expiry_window() {
        let t0 = Utc::now();
        let rec = Recommendation::with_policy(user(5), reason(&[2]), 0, ScoringPolicy::default(), t0)
            .unwrap();

        assert_eq!(rec.expires_at(), t0 + Duration::days(7));
        assert!(!rec.is_expired(t0 + Duration::days(6)));
        assert!(!rec.is_expired(t0 + Duration::days(7)));
        assert!(rec.is_expired(t0 + Duration::days(7) + Duration::seconds(1)));
    }

    #[test]
    fn test_refresh_extends_expiry() {
        let t0 = Utc::now();
        let mut rec =
            Recommendation::with_policy(user(5), reason(&[2]), 0, ScoringPolicy::default(), t0)
                .unwrap();

        let later = t0 + Duration::days(6);
        rec.refresh(later);

        assert_eq!(rec.expires_at(), later + Duration::days(7));
        assert_eq!(rec.created_at(), t0);
        assert!(!rec.is_expired(t0 + Duration::days(10)));
    }

    #[test]
    fn test_update_activity_recomputes_score() {
        let mut rec = Recommendation::new(user(5), reason(&[2]), 0).unwrap();
        assert_eq!(rec.score(), 10);

        rec.update_activity(4);
        assert_eq!(rec.recent_activity_count(), 4);
        assert_eq!(rec.score(), 18);

        rec.update_activity(0);
        assert_eq!(rec.score(), 10);
    }

    #[test]
    fn test_custom_policy_applies_to_score_and_ttl() {
        let policy = ScoringPolicy {
            connection_weight: 1,
            activity_multiplier: 5,
            ttl: Duration::days(1),
            ..ScoringPolicy::default()
        };
        let t0 = Utc::now();
        let mut rec = Recommendation::with_policy(user(5), reason(&[2, 3]), 2, policy, t0).unwrap();
        assert_eq!(rec.score(), 12);
        assert!(rec.is_expired(t0 + Duration::days(2)));

        rec.update_activity(1);
        assert_eq!(rec.score(), 7);
    }

    #[test]
    fn test_each_recommendation_gets_fresh_id() {
        let a = Recommendation::new(user(5), reason(&[2]), 0).unwrap();
        let b = Recommendation::new(user(5), reason(&[2]), 0).unwrap();
        assert_ne!(a.id(), b.id());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: the score always equals weight plus twice the activity count.
            #[test]
            fn score_is_weight_plus_double_activity(
                evidence in prop::collection::btree_set(1i64..10_000, 1..20),
                activity in 0u32..100_000,
            ) {
                let reason = RecommendationReason::followed_by_connection(
                    evidence.iter().map(|id| UserId::new(*id).unwrap()),
                );
                let expected = reason.weight() + activity * 2;

                let first = Recommendation::new(UserId::new(1).unwrap(), reason.clone(), activity).unwrap();
                let second = Recommendation::new(UserId::new(1).unwrap(), reason, activity).unwrap();

                prop_assert_eq!(first.score(), expected);
                prop_assert_eq!(second.score(), expected);
            }
        }
    }
}
