use axum::{Router, routing::get};

use crate::access_log::access_log_middleware;
use crate::features::health::health_check;
use crate::features::image::create_image_router;
use crate::state::AppState;

/// 组装完整路由：`/health` + 图片通配路由 + 访问日志
pub fn build_app(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/health", get(health_check))
        .merge(create_image_router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            access_log_middleware,
        ))
        .with_state(state)
}
