use std::sync::Arc;

use axum::{body::Body, http::Request, http::StatusCode};
use axum_test::TestServer;
use chrono::{Duration, Utc};
use serde_json::Value;
use tower::ServiceExt;

use circle_recs::{
    create_router,
    middleware::REQUEST_ID_HEADER,
    models::{Post, PostId, UserId, UserProfile},
    services::{
        providers::{InMemoryContent, InMemoryProfiles, InMemorySocialGraph},
        ReasonDescriber,
    },
    AppState, Config,
};

fn user(id: i64) -> UserId {
    UserId::new(id).unwrap()
}

/// 1 follows 2 and 3; 2 recently followed 5; 3 recently followed 5 and 7.
/// 5 has five recent posts, 7 none.
async fn seeded_state(config: &Config) -> AppState {
    let graph = InMemorySocialGraph::new();
    let content = InMemoryContent::new();
    let profiles = InMemoryProfiles::new();
    let now = Utc::now();

    graph.connect(user(1), user(2), now - Duration::days(30)).await;
    graph.connect(user(1), user(3), now - Duration::days(30)).await;
    graph.connect(user(2), user(5), now - Duration::days(1)).await;
    graph.connect(user(3), user(5), now - Duration::days(2)).await;
    graph.connect(user(3), user(7), now - Duration::days(3)).await;
    // Outside the lookback window
    graph.connect(user(2), user(8), now - Duration::days(40)).await;

    for i in 1..=5 {
        content
            .publish(Post {
                id: PostId::new(500 + i).unwrap(),
                author_id: user(5),
                content: format!("post {}", i),
                created_at: now - Duration::hours(i),
            })
            .await;
    }

    for id in [2, 3, 5, 7, 8] {
        profiles
            .upsert(UserProfile {
                user_id: user(id),
                username: format!("user{}", id),
                avatar: None,
                bio: None,
            })
            .await;
    }

    let content = Arc::new(content);
    AppState::from_parts(
        config,
        Arc::new(graph),
        content,
        Arc::new(profiles),
        ReasonDescriber::default(),
    )
}

async fn create_test_server() -> TestServer {
    let state = seeded_state(&Config::default()).await;
    TestServer::new(create_router(state)).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server().await;
    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_recommendations_two_hop() {
    let server = create_test_server().await;

    let response = server.get("/api/v1/users/1/recommendations").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["user_id"], 1);

    let recommendations = body["recommendations"].as_array().unwrap();
    assert_eq!(recommendations.len(), 2);

    let first = &recommendations[0];
    assert_eq!(first["user_id"], 5);
    assert_eq!(first["username"], "user5");
    assert_eq!(first["score"], 30);
    assert_eq!(first["reason"], "Followed by 2 people you follow");
    assert_eq!(first["connected_via"], serde_json::json!([2, 3]));
    assert_eq!(first["recent_posts"].as_array().unwrap().len(), 3);

    let second = &recommendations[1];
    assert_eq!(second["user_id"], 7);
    assert_eq!(second["score"], 10);
    assert_eq!(second["reason"], "Followed by 1 person you follow");
    assert!(second["recent_posts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_recommendations_limit() {
    let server = create_test_server().await;

    let response = server
        .get("/api/v1/users/1/recommendations")
        .add_query_param("limit", 1)
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let recommendations = body["recommendations"].as_array().unwrap();
    assert_eq!(recommendations.len(), 1);
    assert_eq!(recommendations[0]["user_id"], 5);
}

#[tokio::test]
async fn test_user_without_connections_gets_empty_list() {
    let server = create_test_server().await;

    let response = server.get("/api/v1/users/42/recommendations").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert!(body["recommendations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_user_id_is_bad_request() {
    let server = create_test_server().await;

    let response = server.get("/api/v1/users/0/recommendations").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_non_numeric_user_id_is_rejected() {
    let server = create_test_server().await;

    let response = server.get("/api/v1/users/abc/recommendations").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_min_score_from_config() {
    let config = Config {
        min_score: 20,
        ..Config::default()
    };
    let server = TestServer::new(create_router(seeded_state(&config).await)).unwrap();

    let body: Value = server.get("/api/v1/users/1/recommendations").await.json();
    let recommendations = body["recommendations"].as_array().unwrap();
    assert_eq!(recommendations.len(), 1);
    assert_eq!(recommendations[0]["user_id"], 5);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = create_router(seeded_state(&Config::default()).await);
    let request_id = "6f1c2d4e-8a3b-4c5d-9e0f-123456789abc";

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(REQUEST_ID_HEADER, request_id)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(REQUEST_ID_HEADER).unwrap(),
        request_id
    );
}

#[tokio::test]
async fn test_request_id_is_generated() {
    let server = create_test_server().await;

    let response = server.get("/health").await;
    let header = response.header(REQUEST_ID_HEADER);
    assert!(uuid::Uuid::parse_str(header.to_str().unwrap()).is_ok());
}
