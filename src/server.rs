use anyhow::Context;
use async_graphql::http::GraphiQLSource;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::schema::AnalyticsSchema;

pub const GRAPHQL_PATH: &str = "/graphql";

/// Credentials are allowed, so methods and headers are mirrored from the
/// preflight instead of using wildcards.
pub fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin {origin:?}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

pub fn build_router(schema: AnalyticsSchema, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(GRAPHQL_PATH, get(graphiql).post(graphql))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(schema)
}

pub async fn serve(config: &ServerConfig, schema: AnalyticsSchema) -> anyhow::Result<()> {
    let listen = config.listen_addr()?;
    let app = build_router(schema, cors_layer(&config.cors_origins)?);

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    tracing::info!(%listen, "bi-kpis listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    tracing::info!("bi-kpis stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint(GRAPHQL_PATH).finish())
}

async fn graphql(
    State(schema): State<AnalyticsSchema>,
    Json(request): Json<async_graphql::Request>,
) -> Json<async_graphql::Response> {
    Json(schema.execute(request).await)
}
