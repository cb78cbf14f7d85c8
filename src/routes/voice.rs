use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::voice::voice_websocket;
use crate::state::AppState;

pub fn create_voice_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(voice_websocket))
        .layer(TraceLayer::new_for_http())
}
