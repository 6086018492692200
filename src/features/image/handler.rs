use std::collections::HashMap;
use std::time::Instant;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri, header},
    response::Response,
    routing::get,
};
use sha2::{Digest, Sha256};

use super::cache::store_with_flush_retry;
use super::options::resolve_options;
use super::types::{ImageFormat, ResolvedOptions};
use crate::error::AppError;
use crate::state::AppState;

/// 实际生效的请求 URI：覆盖头存在且可解析时优先于真实路径
pub fn effective_uri(headers: &HeaderMap, override_header: &HeaderName, uri: &Uri) -> Uri {
    let Some(raw) = headers
        .get(override_header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    else {
        return uri.clone();
    };
    match raw.parse::<Uri>() {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(
                "覆盖头 {} 的值无法解析为 URI（{}），使用真实路径: {:?}",
                override_header,
                e,
                raw
            );
            uri.clone()
        }
    }
}

/// 缓存键 SHA-256 的前 16 字节，带引号
pub fn etag_for(cache_key: &str) -> String {
    let digest = Sha256::digest(cache_key.as_bytes());
    format!("\"{}\"", hex::encode(&digest[..16]))
}

fn if_none_match_hits(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|tag| tag.trim() == etag || tag.trim() == "*"))
        .unwrap_or(false)
}

fn image_response(
    status: StatusCode,
    format: ImageFormat,
    etag: &str,
    max_age: u64,
    body: Bytes,
) -> Result<Response, AppError> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, HeaderValue::from_static(format.mime_type()))
        .header(header::CONTENT_LENGTH, body.len())
        .header(header::ETAG, etag)
        .header(header::CACHE_CONTROL, format!("public, max-age={max_age}"))
        .body(Body::from(body))
        .map_err(|e| AppError::Internal(format!("构建响应失败: {e}")))
}

/// 渲染并写入缓存；写缓存失败只记录日志
async fn render_and_store(state: &AppState, opts: ResolvedOptions) -> Result<Bytes, AppError> {
    let sem = state.render_semaphore.clone();
    let permits_avail = sem.available_permits();
    let t_wait = Instant::now();
    let _permit = sem
        .acquire_owned()
        .await
        .map_err(|e| AppError::Internal(format!("获取渲染信号量失败: {e}")))?;
    let wait_ms = t_wait.elapsed().as_millis() as u64;

    let t_render = Instant::now();
    let renderer = state.renderer.clone();
    let cache_key = opts.cache_key.clone();
    let selection_key = opts.selection_key;
    // 解码/栅格化/编码都是 CPU 密集或阻塞 IO，必须移出 tokio worker
    let rendered = tokio::task::spawn_blocking(move || renderer.render(&opts))
        .await
        .map_err(|e| AppError::Internal(format!("阻塞渲染任务执行失败: {e}")))??;
    tracing::info!(
        permits_avail,
        wait_ms,
        render_ms = t_render.elapsed().as_millis() as u64,
        bytes = rendered.len(),
        "Generated: {} key = {}",
        cache_key,
        selection_key
    );

    let bytes = Bytes::from(rendered.bytes);
    if let Err(e) = store_with_flush_retry(state.image_cache.as_ref(), cache_key, bytes.clone()).await
    {
        tracing::warn!(code = e.stable_code(), "重试后仍无法写入缓存: {}", e);
    }
    Ok(bytes)
}

/// `GET /{color?}/{width}x{height}.{ext}?text=&key=&palette=&from=`
pub async fn serve_image(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let uri = effective_uri(&headers, &state.path_override_header, &uri);
    let query = Query::<HashMap<String, String>>::try_from_uri(&uri)
        .map(|q| q.0)
        .unwrap_or_default();

    let opts = resolve_options(uri.path(), &query, &state.sources_root)?;
    let format = opts.format;
    let etag = etag_for(&opts.cache_key);

    // 304 只在拿到图片之后判定，渲染失败必须照常返回 404
    let bytes = match state.image_cache.get(&opts.cache_key).await {
        Some(hit) => {
            tracing::debug!("缓存命中: {}", opts.cache_key);
            hit
        }
        None => render_and_store(&state, opts).await?,
    };

    if if_none_match_hits(&headers, &etag) {
        return image_response(
            StatusCode::NOT_MODIFIED,
            format,
            &etag,
            state.cache_max_age_secs,
            Bytes::new(),
        )
        .map(|mut res| {
            res.headers_mut().remove(header::CONTENT_LENGTH);
            res
        });
    }

    image_response(StatusCode::OK, format, &etag, state.cache_max_age_secs, bytes)
}

pub fn create_image_router() -> Router<AppState> {
    Router::new()
        .route("/", get(serve_image))
        .route("/*path", get(serve_image))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_header_replaces_path_and_query() {
        let name = HeaderName::from_static("x-mockimageserver-path");
        let mut headers = HeaderMap::new();
        headers.insert(&name, HeaderValue::from_static("/00ff00/10x10.png?text=a"));
        let real: Uri = "/1x1.png".parse().unwrap();

        let uri = effective_uri(&headers, &name, &real);
        assert_eq!(uri.path(), "/00ff00/10x10.png");
        assert_eq!(uri.query(), Some("text=a"));

        assert_eq!(effective_uri(&HeaderMap::new(), &name, &real), real);
    }

    #[test]
    fn unparsable_override_keeps_real_path() {
        let name = HeaderName::from_static("x-mockimageserver-path");
        let mut headers = HeaderMap::new();
        headers.insert(&name, HeaderValue::from_static("/10x10.png?text=Hello World"));
        let real: Uri = "/1x1.png".parse().unwrap();
        assert_eq!(effective_uri(&headers, &name, &real), real);
    }

    #[test]
    fn etag_is_quoted_and_stable() {
        let a = etag_for("::::1:10x10.png");
        assert_eq!(a.len(), 34);
        assert!(a.starts_with('"') && a.ends_with('"'));
        assert_eq!(a, etag_for("::::1:10x10.png"));
        assert_ne!(a, etag_for("::::2:10x10.png"));
    }

    #[test]
    fn if_none_match_accepts_lists_and_wildcard() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"x\", \"y\""));
        assert!(if_none_match_hits(&headers, "\"y\""));
        assert!(!if_none_match_hits(&headers, "\"z\""));
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert!(if_none_match_hits(&headers, "\"z\""));
    }
}
