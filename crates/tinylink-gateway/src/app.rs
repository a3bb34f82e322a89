use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{public_identity, require_identity};
use crate::handlers::{
    delete_user_urls_handler, ping_handler, redirect_handler, shorten_batch_handler,
    shorten_json_handler, shorten_text_handler, stats_handler, user_urls_handler,
};
use crate::state::AppState;
use crate::subnet::trusted_subnet;

pub struct App {}

impl App {
    pub fn router(state: AppState) -> Router {
        let shorten = Router::new()
            .route("/", post(shorten_text_handler))
            .route("/api/shorten", post(shorten_json_handler))
            .route("/api/shorten/batch", post(shorten_batch_handler))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                public_identity,
            ));

        let user = Router::new()
            .route(
                "/api/user/urls",
                get(user_urls_handler).delete(delete_user_urls_handler),
            )
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_identity,
            ));

        let internal = Router::new()
            .route("/api/internal/stats", get(stats_handler))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                trusted_subnet,
            ));

        Router::new()
            .route("/ping", get(ping_handler))
            .route("/{id}", get(redirect_handler))
            .merge(shorten)
            .merge(user)
            .merge(internal)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(RequestDecompressionLayer::new())
                    .layer(CompressionLayer::new()),
            )
            .with_state(state)
    }
}
