use axum::{
    Router,
    routing::{delete, get},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Router の構築
///
/// enroll ルートの `{auth_id}` にはインターフェースID（totp 等）が入る。
/// 同じ位置のパラメータ名を揃える必要があるため名前を共有している。
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health_check))
        .route(
            "/api/users/{user_id}/authenticators/",
            get(handlers::list_authenticators),
        )
        .route(
            "/api/users/{user_id}/authenticators/{auth_id}/",
            get(handlers::get_authenticator)
                .put(handlers::regenerate_recovery_codes)
                .delete(handlers::delete_authenticator),
        )
        .route(
            "/api/users/{user_id}/authenticators/{auth_id}/enroll/",
            get(handlers::begin_enrollment).post(handlers::enroll),
        )
        .route(
            "/api/users/{user_id}/authenticators/{auth_id}/devices/{device_id}/",
            delete(handlers::delete_device),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
