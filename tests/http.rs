use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use bi_kpis::config::DbConfig;
use bi_kpis::db::connect_pool;
use bi_kpis::schema::{build_schema, AnalyticsSchema};
use bi_kpis::server::{build_router, cors_layer};
use bi_kpis::service::QueryService;

const ALLOWED_ORIGIN: &str = "http://localhost:4200";

// Nothing listens on port 1, so every metric query fails to connect.
fn unreachable_schema() -> AnalyticsSchema {
    let config = DbConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        name: "historialclinico".to_string(),
        user: "postgres".to_string(),
        password: "s3cr3t-pw".to_string(),
        max_connections: 2,
        acquire_timeout_secs: 1,
    };
    build_schema(QueryService::new(connect_pool(&config)))
}

fn app() -> Router {
    let cors = cors_layer(&[ALLOWED_ORIGIN.to_string()]).unwrap();
    build_router(unreachable_schema(), cors)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn post_graphql(query: &str) -> Value {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/graphql")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "query": query }).to_string()))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn health_is_ok_without_database() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn failing_fields_report_generic_errors_independently() {
    let body = post_graphql(
        "{ citasPorEspecialidad { especialidad total } \
           kpiAsistencia { percent numerator denominator } }",
    )
    .await;

    let data = body["data"].as_object().expect("data object");
    assert_eq!(data.len(), 2);
    assert_eq!(data.get("citasPorEspecialidad"), Some(&Value::Null));
    assert_eq!(data.get("kpiAsistencia"), Some(&Value::Null));

    let errors = body["errors"].as_array().expect("errors array");
    assert_eq!(errors.len(), 2);

    let mut paths: Vec<String> = errors
        .iter()
        .map(|error| error["path"][0].as_str().unwrap().to_string())
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["citasPorEspecialidad", "kpiAsistencia"]);

    for error in errors {
        assert_eq!(error["message"], "analytics database unavailable");
        assert_eq!(error["extensions"]["code"], "SERVICE_UNAVAILABLE");
        let rendered = error.to_string();
        assert!(!rendered.contains("s3cr3t-pw"));
        assert!(!rendered.contains("127.0.0.1"));
        assert!(!rendered.contains("SELECT"));
    }
}

#[tokio::test]
async fn failing_field_keeps_resolved_siblings() {
    let body = post_graphql(
        r#"{ __typename citasSerie(granularidad: "bogus") { period }
             kpiCrecimientoCitas { growthPercent } }"#,
    )
    .await;

    let data = body["data"].as_object().expect("data object");
    assert_eq!(data.get("__typename"), Some(&json!("QueryRoot")));
    assert_eq!(data.get("citasSerie"), Some(&Value::Null));
    assert_eq!(data.get("kpiCrecimientoCitas"), Some(&Value::Null));
    assert_eq!(body["errors"].as_array().expect("errors array").len(), 2);
}

#[tokio::test]
async fn aliased_failure_reports_alias_path() {
    let body = post_graphql("{ porMes: citasPorMes { period } }").await;

    let data = body["data"].as_object().expect("data object");
    assert_eq!(data.get("porMes"), Some(&Value::Null));
    assert_eq!(body["errors"][0]["path"], json!(["porMes"]));
}

#[tokio::test]
async fn every_field_failing_still_returns_data_object() {
    let response = unreachable_schema()
        .execute(
            "{ citasPorEspecialidad { total } citasSerie { total } citasPorMes { total } \
               citasPorDia { total } kpiAsistencia { percent } heatmapHorarios { total } \
               kpiCrecimientoCitas { growthPercent } usuariosCrecimiento { total } \
               kpiOcupacionHorarios { percent } kpiTasaCancelacion { percent } }",
        )
        .await;
    assert_eq!(response.errors.len(), 10);

    let data = response.data.into_json().unwrap();
    let data = data.as_object().expect("data object");
    assert_eq!(data.len(), 10);
    assert!(data.values().all(Value::is_null));
}

#[tokio::test]
async fn schema_only_fields_resolve_without_database() {
    let body = post_graphql("{ __typename }").await;
    assert_eq!(body["data"]["__typename"], "QueryRoot");
    assert!(body.get("errors").is_none());
}

#[tokio::test]
async fn unknown_field_is_a_validation_error() {
    let body = post_graphql("{ citasPorAnio { period } }").await;
    let errors = body["errors"].as_array().expect("errors array");
    assert!(!errors.is_empty());
}

#[tokio::test]
async fn graphiql_is_served_on_get() {
    let response = app()
        .oneshot(Request::builder().uri("/graphql").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("/graphql"));
}

#[tokio::test]
async fn cors_allows_listed_origin_with_credentials() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/graphql")
        .header(header::ORIGIN, ALLOWED_ORIGIN)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], ALLOWED_ORIGIN);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST");
}

#[tokio::test]
async fn cors_ignores_unlisted_origin() {
    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "https://evil.example")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[test]
fn cors_rejects_malformed_origin() {
    assert!(cors_layer(&["http://bad\norigin".to_string()]).is_err());
}

#[tokio::test]
async fn schema_exposes_field_catalogue() {
    let sdl = unreachable_schema().sdl();
    for field in [
        "citasPorEspecialidad",
        "citasSerie",
        "citasPorMes",
        "citasPorDia",
        "kpiAsistencia",
        "heatmapHorarios",
        "kpiCrecimientoCitas",
        "usuariosCrecimiento",
        "kpiOcupacionHorarios",
        "kpiTasaCancelacion",
    ] {
        assert!(sdl.contains(field), "missing field {field}");
    }
    for type_name in [
        "BarEspecialidad",
        "SerieCitas",
        "HeatmapBin",
        "KpiCrecimiento",
        "KpiAsistencia",
        "KpiOcupacion",
        "KpiCancelacion",
    ] {
        assert!(sdl.contains(type_name), "missing type {type_name}");
    }
    assert!(sdl.contains("granularidad"));
    assert!(sdl.contains("currentMonth"));
    assert!(sdl.contains("growthPercent"));
}
