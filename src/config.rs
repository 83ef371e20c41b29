use serde::Deserialize;
use std::time::Duration;

use crate::{
    models::ScoringPolicy,
    services::{GenerationOptions, ServiceSettings},
};

/// Upper bound for day-based windows; keeps timestamp arithmetic in range
const MAX_WINDOW_DAYS: i64 = 3650;

/// Where social graph reads go
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    #[default]
    Memory,
    Postgres,
}

/// Where post counts and recent posts come from
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentBackend {
    #[default]
    Memory,
    Postgres,
    Http,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// PostgreSQL connection URL, required by the postgres backends
    #[serde(default)]
    pub database_url: Option<String>,

    /// Redis connection URL; reason text lookups are cached when set
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default)]
    pub social_graph_backend: GraphBackend,

    #[serde(default)]
    pub content_backend: ContentBackend,

    /// Base URL of the content service, required by the http content backend
    #[serde(default)]
    pub content_service_url: Option<String>,

    /// Base URL of the reason text service
    #[serde(default)]
    pub reason_text_url: Option<String>,

    /// JSON snapshot loaded into the in-memory backends at startup
    #[serde(default)]
    pub seed_path: Option<String>,

    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    #[serde(default)]
    pub min_score: u32,

    #[serde(default = "default_recent_posts_limit")]
    pub recent_posts_limit: usize,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    #[serde(default = "default_generation_deadline_ms")]
    pub generation_deadline_ms: u64,

    #[serde(default = "default_connection_weight")]
    pub connection_weight: u32,

    #[serde(default = "default_popular_weight")]
    pub popular_weight: u32,

    #[serde(default = "default_fallback_weight")]
    pub fallback_weight: u32,

    #[serde(default = "default_activity_multiplier")]
    pub activity_multiplier: u32,

    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,

    #[serde(default)]
    pub exclude_existing_connections: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_lookback_days() -> u32 {
    7
}

fn default_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    50
}

fn default_recent_posts_limit() -> usize {
    3
}

fn default_max_concurrency() -> usize {
    8
}

fn default_upstream_timeout_ms() -> u64 {
    2000
}

fn default_generation_deadline_ms() -> u64 {
    5000
}

fn default_connection_weight() -> u32 {
    10
}

fn default_popular_weight() -> u32 {
    5
}

fn default_fallback_weight() -> u32 {
    1
}

fn default_activity_multiplier() -> u32 {
    2
}

fn default_ttl_days() -> i64 {
    7
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: None,
            redis_url: None,
            social_graph_backend: GraphBackend::default(),
            content_backend: ContentBackend::default(),
            content_service_url: None,
            reason_text_url: None,
            seed_path: None,
            lookback_days: default_lookback_days(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            min_score: 0,
            recent_posts_limit: default_recent_posts_limit(),
            max_concurrency: default_max_concurrency(),
            upstream_timeout_ms: default_upstream_timeout_ms(),
            generation_deadline_ms: default_generation_deadline_ms(),
            connection_weight: default_connection_weight(),
            popular_weight: default_popular_weight(),
            fallback_weight: default_fallback_weight(),
            activity_multiplier: default_activity_multiplier(),
            ttl_days: default_ttl_days(),
            exclude_existing_connections: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every selected backend has what it needs to start
    pub fn validate(&self) -> anyhow::Result<()> {
        let needs_database = self.social_graph_backend == GraphBackend::Postgres
            || self.content_backend == ContentBackend::Postgres;
        if needs_database && self.database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required by the postgres backends");
        }
        if self.content_backend == ContentBackend::Http && self.content_service_url.is_none() {
            anyhow::bail!("CONTENT_SERVICE_URL is required by the http content backend");
        }
        if self.max_limit == 0 {
            anyhow::bail!("MAX_LIMIT must be positive");
        }
        if self.max_concurrency == 0 {
            anyhow::bail!("MAX_CONCURRENCY must be positive");
        }
        if self.ttl_days <= 0 || self.ttl_days > MAX_WINDOW_DAYS {
            anyhow::bail!("TTL_DAYS must be between 1 and {}", MAX_WINDOW_DAYS);
        }
        if self.lookback_days > MAX_WINDOW_DAYS as u32 {
            anyhow::bail!("LOOKBACK_DAYS must be at most {}", MAX_WINDOW_DAYS);
        }
        Ok(())
    }

    pub fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            connection_weight: self.connection_weight,
            popular_weight: self.popular_weight,
            fallback_weight: self.fallback_weight,
            activity_multiplier: self.activity_multiplier,
            ttl: chrono::Duration::days(self.ttl_days),
        }
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            max_concurrency: self.max_concurrency,
            upstream_timeout: self.upstream_timeout(),
            deadline: Duration::from_millis(self.generation_deadline_ms),
            exclude_existing_connections: self.exclude_existing_connections,
            scoring: self.scoring_policy(),
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            lookback_days: self.lookback_days,
            default_limit: self.default_limit,
            max_limit: self.max_limit,
            min_score: self.min_score,
            recent_posts_limit: self.recent_posts_limit,
        }
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
