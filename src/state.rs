use std::path::Path;
use std::sync::Arc;

use crate::{
    config::{Config, ContentBackend, GraphBackend},
    db::{create_pool, create_redis_client, Cache, CacheWriterHandle},
    services::{
        providers::{
            memory::Seed, ActivityProvider, ContentServiceClient, ContentSource, InMemoryContent,
            InMemoryProfiles, InMemorySocialGraph, PgContentStore, PgProfileStore, PgSocialGraph,
            ProfileProvider, SocialGraphProvider,
        },
        ReasonDescriber, ReasonTextClient, ReasonTextSource, RecommendationGenerator,
        RecommendationService,
    },
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recommendations: Arc<RecommendationService>,
}

/// Everything the binary needs to serve and later shut down
pub struct Runtime {
    pub state: AppState,
    pub cache_handle: Option<CacheWriterHandle>,
}

impl AppState {
    pub fn new(recommendations: RecommendationService) -> Self {
        Self {
            recommendations: Arc::new(recommendations),
        }
    }

    /// Builds the state from already constructed collaborators
    pub fn from_parts(
        config: &Config,
        social_graph: Arc<dyn SocialGraphProvider>,
        activity: Arc<dyn ActivityProvider>,
        profiles: Arc<dyn ProfileProvider>,
        describer: ReasonDescriber,
    ) -> Self {
        let generator = RecommendationGenerator::new(social_graph, Arc::clone(&activity))
            .with_options(config.generation_options());

        Self::new(RecommendationService::new(
            generator,
            activity,
            profiles,
            describer,
            config.service_settings(),
        ))
    }

    /// Wires the backends selected in `config`
    pub async fn from_config(config: &Config) -> anyhow::Result<Runtime> {
        config.validate()?;

        let pool = match &config.database_url {
            Some(url)
                if config.social_graph_backend == GraphBackend::Postgres
                    || config.content_backend == ContentBackend::Postgres =>
            {
                tracing::info!("Connecting to PostgreSQL");
                Some(create_pool(url).await?)
            }
            _ => None,
        };

        let memory_graph = InMemorySocialGraph::new();
        let memory_content = InMemoryContent::new();
        let memory_profiles = InMemoryProfiles::new();
        if let Some(path) = &config.seed_path {
            Seed::from_file(Path::new(path))?
                .apply(&memory_graph, &memory_content, &memory_profiles)
                .await;
        }

        let (social_graph, profiles): (Arc<dyn SocialGraphProvider>, Arc<dyn ProfileProvider>) =
            match (config.social_graph_backend, &pool) {
                (GraphBackend::Postgres, Some(pool)) => (
                    Arc::new(PgSocialGraph::new(pool.clone())),
                    Arc::new(PgProfileStore::new(pool.clone())),
                ),
                (GraphBackend::Postgres, None) => {
                    anyhow::bail!("DATABASE_URL is required by the postgres social graph")
                }
                (GraphBackend::Memory, _) => {
                    (Arc::new(memory_graph), Arc::new(memory_profiles))
                }
            };

        let content = match (config.content_backend, &pool) {
            (ContentBackend::Memory, _) => ContentSource::Memory(memory_content),
            (ContentBackend::Postgres, Some(pool)) => {
                ContentSource::Postgres(PgContentStore::new(pool.clone()))
            }
            (ContentBackend::Postgres, None) => {
                anyhow::bail!("DATABASE_URL is required by the postgres content backend")
            }
            (ContentBackend::Http, _) => {
                let url = config.content_service_url.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("CONTENT_SERVICE_URL is required by the http content backend")
                })?;
                ContentSource::Http(ContentServiceClient::new(url, config.upstream_timeout())?)
            }
        };
        let activity: Arc<dyn ActivityProvider> = Arc::new(content);

        let (cache, cache_handle) = match &config.redis_url {
            Some(url) => {
                let (cache, handle) = Cache::new(create_redis_client(url)?);
                (Some(cache), Some(handle))
            }
            None => (None, None),
        };

        let describer = match &config.reason_text_url {
            Some(url) => {
                let client = ReasonTextClient::new(url.as_str(), config.upstream_timeout(), cache)?;
                let source: Arc<dyn ReasonTextSource> = Arc::new(client);
                ReasonDescriber::new(Some(source)).with_timeout(config.upstream_timeout())
            }
            None => ReasonDescriber::default(),
        };

        tracing::info!(
            social_graph = social_graph.name(),
            content = activity.name(),
            profiles = profiles.name(),
            reason_text = config.reason_text_url.is_some(),
            cache = cache_handle.is_some(),
            "Collaborators wired"
        );

        let state = Self::from_parts(config, social_graph, activity, profiles, describer);

        Ok(Runtime {
            state,
            cache_handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_defaults_to_memory() {
        let runtime = AppState::from_config(&Config::default()).await.unwrap();
        assert!(runtime.cache_handle.is_none());

        let response = runtime
            .state
            .recommendations
            .recommend(1, None)
            .await
            .unwrap();
        assert!(response.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_from_config_rejects_postgres_without_url() {
        let config = Config {
            social_graph_backend: GraphBackend::Postgres,
            ..Config::default()
        };
        assert!(AppState::from_config(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_from_config_rejects_out_of_range_ttl() {
        let config = Config {
            ttl_days: i64::MAX,
            ..Config::default()
        };
        assert!(AppState::from_config(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_from_config_builds_http_content_backend() {
        let config = Config {
            content_backend: ContentBackend::Http,
            content_service_url: Some("http://content.local".to_string()),
            ..Config::default()
        };
        assert!(AppState::from_config(&config).await.is_ok());
    }
}
