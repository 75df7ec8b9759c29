use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{
    modules,
    web::{ApiMessage, AppState},
};

pub fn build_router(state: AppState) -> Router {
    let config = state.config();
    let cors = cors_layer(&config.cors_allowed_origins);
    let body_limit = DefaultBodyLimit::max(config.max_upload_bytes);

    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .merge(modules::literature::router())
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(%origin, ?err, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn root() -> Json<ApiMessage> {
    Json(ApiMessage::new("Literature Review API is running"))
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
