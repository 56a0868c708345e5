//! HTTP application composition.
//!
//! [`build_app`] assembles the REST routes, the `/ws` event stream, the
//! OpenAPI document and the tower middleware into one [`Router`].

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::api::{self, ApiDoc};
use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Path of the generated OpenAPI document.
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// Builds the complete application router bound to `state`.
pub fn build_app(state: AppState) -> Router {
    let router = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url(OPENAPI_PATH, ApiDoc::openapi()),
    );

    #[cfg(not(feature = "swagger-ui"))]
    let router = router.route(
        OPENAPI_PATH,
        get(|| async { axum::Json(ApiDoc::openapi()) }),
    );

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
