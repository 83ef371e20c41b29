use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;

use super::{recommendation::ScoringPolicy, UserId};

/// Why a user was surfaced as a recommendation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    /// People the requester is connected to recently connected with this user
    FollowedByConnection,
    /// The user is popular among the requester's wider network
    PopularInNetwork,
    /// Extension point for reasons produced outside the graph traversal
    Custom(String),
}

impl ReasonKind {
    /// Stable key used when asking an external text source for display copy
    pub fn key(&self) -> &str {
        match self {
            ReasonKind::FollowedByConnection => "followed_by_connection",
            ReasonKind::PopularInNetwork => "popular_in_network",
            ReasonKind::Custom(tag) => tag,
        }
    }

    /// `type` value understood by the reason text service; custom kinds share `default`
    pub fn text_source_key(&self) -> &'static str {
        match self {
            ReasonKind::FollowedByConnection => "followed_by_following",
            ReasonKind::PopularInNetwork => "popular_in_network",
            ReasonKind::Custom(_) => "default",
        }
    }
}

impl Display for ReasonKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Immutable evidence behind a recommendation.
///
/// The evidence set holds the connections that led to the candidate. It may be
/// empty here; [`Recommendation`](super::Recommendation) refuses to be built
/// from a reason without evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationReason {
    kind: ReasonKind,
    evidence: BTreeSet<UserId>,
}

impl RecommendationReason {
    pub fn followed_by_connection(evidence: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            kind: ReasonKind::FollowedByConnection,
            evidence: evidence.into_iter().collect(),
        }
    }

    pub fn popular_in_network(evidence: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            kind: ReasonKind::PopularInNetwork,
            evidence: evidence.into_iter().collect(),
        }
    }

    pub fn custom(tag: impl Into<String>, evidence: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            kind: ReasonKind::Custom(tag.into()),
            evidence: evidence.into_iter().collect(),
        }
    }

    pub fn kind(&self) -> &ReasonKind {
        &self.kind
    }

    pub fn evidence(&self) -> &BTreeSet<UserId> {
        &self.evidence
    }

    /// Weight under the default scoring policy
    pub fn weight(&self) -> u32 {
        self.weight_with(&ScoringPolicy::default())
    }

    pub fn weight_with(&self, policy: &ScoringPolicy) -> u32 {
        match self.kind {
            ReasonKind::FollowedByConnection => {
                let count = u32::try_from(self.evidence.len()).unwrap_or(u32::MAX);
                count.saturating_mul(policy.connection_weight)
            }
            ReasonKind::PopularInNetwork => policy.popular_weight,
            ReasonKind::Custom(_) => policy.fallback_weight,
        }
    }

    /// Built-in display text. Never depends on anything outside the value.
    pub fn description(&self) -> String {
        match self.kind {
            ReasonKind::FollowedByConnection => match self.evidence.len() {
                1 => "Followed by 1 person you follow".to_string(),
                n => format!("Followed by {} people you follow", n),
            },
            ReasonKind::PopularInNetwork => "Popular in your network".to_string(),
            ReasonKind::Custom(_) => "Recommended for you".to_string(),
        }
    }
}

/// A reason paired with externally supplied display text.
///
/// Produced by the reason describer; falls back to the reason's own
/// description when no override text is present.
#[derive(Debug, Clone)]
pub struct DescribedReason<'a> {
    reason: &'a RecommendationReason,
    override_text: Option<String>,
}

impl<'a> DescribedReason<'a> {
    pub fn new(reason: &'a RecommendationReason, override_text: Option<String>) -> Self {
        let override_text = override_text.filter(|text| !text.trim().is_empty());
        Self {
            reason,
            override_text,
        }
    }

    pub fn reason(&self) -> &RecommendationReason {
        self.reason
    }

    pub fn is_overridden(&self) -> bool {
        self.override_text.is_some()
    }

    pub fn description(&self) -> String {
        match &self.override_text {
            Some(text) => text.clone(),
            None => self.reason.description(),
        }
    }
}
