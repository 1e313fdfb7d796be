pub mod admin;
pub mod docs;
pub mod tools;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{
    auth::{middleware::gate_middleware, oauth},
    models::AppState,
};

/// The full application: protocol endpoints, client administration, gated
/// tool dispatch and the OpenAPI UI.
pub fn router(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .route("/", get(admin::list_clients).post(admin::create_client))
        .route(
            "/:client_id",
            get(admin::get_client)
                .put(admin::update_client)
                .delete(admin::delete_client),
        );

    let tool_routes = Router::new()
        .route("/", get(tools::list_tools))
        .route("/:name", post(tools::execute_tool))
        .layer(middleware::from_fn_with_state(state.clone(), gate_middleware));

    Router::new()
        .nest("/oauth", oauth::router())
        .nest("/admin/clients", admin_routes)
        .nest("/api/tools", tool_routes)
        .merge(docs::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
