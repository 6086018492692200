use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::features::image::handler::effective_uri;
use crate::state::AppState;

fn is_valid_request_id(v: &str) -> bool {
    !v.is_empty()
        && v.len() <= 128
        && v.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

fn resolve_request_id(req: &Request) -> String {
    if let Some(raw) = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        && is_valid_request_id(raw)
    {
        return raw.to_string();
    }
    format!("req_{}", Uuid::new_v4().simple())
}

/// 访问日志中间件：
/// - 透传或生成 `X-Request-Id` 并回写到响应头
/// - 记录方法、生效路径（覆盖头优先）、真实路径、状态码与耗时
pub async fn access_log_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let request_id = resolve_request_id(&req);

    let method = req.method().clone();
    let real_path = req.uri().path().to_string();
    let effective = effective_uri(req.headers(), &state.path_override_header, req.uri());

    let mut res = next.run(req).await;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %effective,
        real_path = %real_path,
        status = res.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        res.headers_mut().insert("x-request-id", value);
    }
    res
}
