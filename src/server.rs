//! HTTP Front End
//!
//! Small hyper HTTP/1 server exposing a `TieredCache<serde_json::Value>`.
//!
//! | Route                                      | Result                       |
//! |--------------------------------------------|------------------------------|
//! | `GET /cache/{key}`                         | `{data, source, fresh}`/404  |
//! | `PUT /cache/{key}?ttl_ms=&priority=`       | 204                          |
//! | `DELETE /cache/{key}`, `DELETE /cache`     | 204                          |
//! | `GET /stats`, `GET /metrics`, `GET /healthz` | JSON, Prometheus text, `ok` |

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapters::{HttpOrigin, PrometheusExporter};
use crate::cache::{Priority, Resolved, SetOptions, TieredCache};
use crate::error::{Error, Result};

const CACHE_PREFIX: &str = "/cache/";

/// Largest request body accepted; larger bodies get 413
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Shared state behind every connection
pub struct AppState {
    pub cache: TieredCache<Value>,
    pub exporter: PrometheusExporter,
    /// Read-through origin; plain lookups when absent
    pub origin: Option<Arc<HttpOrigin>>,
}

// =============================================================================
// Routing
// =============================================================================

/// Dispatch one request
pub async fn route(
    state: &AppState,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/healthz") => text(StatusCode::OK, "ok"),
        (&Method::GET, "/stats") => {
            let stats = state.cache.stats().await;
            json_response(StatusCode::OK, &stats)
        }
        (&Method::GET, "/metrics") => metrics(state).await,
        (&Method::DELETE, "/cache") | (&Method::DELETE, "/cache/") => {
            state.cache.clear().await;
            empty(StatusCode::NO_CONTENT)
        }
        (_, p) if p.starts_with(CACHE_PREFIX) => {
            let key = match urlencoding::decode(&p[CACHE_PREFIX.len()..]) {
                Ok(key) => key.into_owned(),
                Err(_) => return text(StatusCode::BAD_REQUEST, "key is not valid UTF-8"),
            };
            match *method {
                Method::GET => get_key(state, &key).await,
                Method::PUT => put_key(state, key, query, body).await,
                Method::DELETE => {
                    state.cache.delete(&key).await;
                    empty(StatusCode::NO_CONTENT)
                }
                _ => text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
            }
        }
        _ => text(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn get_key(state: &AppState, key: &str) -> Response<Full<Bytes>> {
    let Some(origin) = &state.origin else {
        return match state.cache.get(key).await {
            Some(hit) => json_response(StatusCode::OK, &hit),
            None => text(StatusCode::NOT_FOUND, "not found"),
        };
    };

    match state.cache.get_or_fetch(key, origin.as_ref()).await {
        Ok(Resolved::Cached(hit)) | Ok(Resolved::Stale(hit)) => json_response(StatusCode::OK, &hit),
        Ok(Resolved::Fetched(data)) => json_response(
            StatusCode::OK,
            &json!({ "data": data, "source": "origin", "fresh": true }),
        ),
        Err(Error::OriginStatus { status: 404, .. }) => text(StatusCode::NOT_FOUND, "not found"),
        Err(e) => {
            warn!(key, error = %e, "Read-through fetch failed");
            text(StatusCode::BAD_GATEWAY, &e.to_string())
        }
    }
}

async fn put_key(
    state: &AppState,
    key: String,
    query: Option<&str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let options = match parse_set_options(query) {
        Ok(options) => options,
        Err(msg) => return text(StatusCode::BAD_REQUEST, &msg),
    };
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => return text(StatusCode::BAD_REQUEST, &format!("invalid JSON body: {}", e)),
    };

    state.cache.set_with(key, value, options).await;
    empty(StatusCode::NO_CONTENT)
}

async fn metrics(state: &AppState) -> Response<Full<Bytes>> {
    let stats = state.cache.stats().await;
    state.exporter.update(&stats);
    match state.exporter.render() {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static(state.exporter.content_type()),
            );
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            text(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
        }
    }
}

/// Parse `ttl_ms` and `priority` from a query string
fn parse_set_options(query: Option<&str>) -> std::result::Result<SetOptions, String> {
    let mut options = SetOptions::default();
    let Some(query) = query else {
        return Ok(options);
    };

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        match name {
            "ttl_ms" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|_| format!("invalid ttl_ms '{}'", value))?;
                if ms == 0 {
                    return Err("ttl_ms must be positive".to_string());
                }
                options.ttl = Some(Duration::from_millis(ms));
            }
            "priority" => {
                options.metadata.priority = value.parse::<Priority>()?;
            }
            other => return Err(format!("unknown parameter '{}'", other)),
        }
    }
    Ok(options)
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            text(StatusCode::INTERNAL_SERVER_ERROR, "serialization failed")
        }
    }
}

// =============================================================================
// Server Loop
// =============================================================================

async fn handle(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match read_body(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };

    let response = route(
        &state,
        &parts.method,
        parts.uri.path(),
        parts.uri.query(),
        body,
    )
    .await;
    debug!(
        method = %parts.method,
        path = parts.uri.path(),
        status = response.status().as_u16(),
        "Handled request"
    );
    Ok(response)
}

/// Buffer a request body of at most `limit` bytes
async fn read_body<B>(body: B, limit: usize) -> std::result::Result<Bytes, Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => {
            debug!(limit, "Rejected oversized request body");
            Err(text(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"))
        }
        Err(e) => {
            debug!(error = %e, "Failed to read request body");
            Err(text(StatusCode::BAD_REQUEST, "unreadable body"))
        }
    }
}

/// Accept connections until `shutdown` is cancelled
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("Cache server listening on {}", listener.local_addr()?);

    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Cache server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted
                .map_err(|e| Error::Internal(format!("Cache server accept error: {}", e)))?,
        };

        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(Arc::clone(&state), req));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Cache server connection error: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;

    fn state() -> AppState {
        AppState {
            cache: TieredCache::in_memory(CacheConfig::default()).unwrap(),
            exporter: PrometheusExporter::new("tiered_cache").unwrap(),
            origin: None,
        }
    }

    async fn body_json(response: Response<Full<Bytes>>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let state = state();
        let put = route(
            &state,
            &Method::PUT,
            "/cache/team%3A138",
            Some("ttl_ms=5000&priority=high"),
            Bytes::from_static(br#"{"wins":90}"#),
        )
        .await;
        assert_eq!(put.status(), StatusCode::NO_CONTENT);

        let get = route(&state, &Method::GET, "/cache/team%3A138", None, Bytes::new()).await;
        assert_eq!(get.status(), StatusCode::OK);
        let body = body_json(get).await;
        assert_eq!(body["data"]["wins"], 90);
        assert_eq!(body["source"], "L1");
        assert_eq!(body["fresh"], true);

        // High priority lands in L3 as well
        assert_eq!(state.cache.l3().unwrap().len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_key_is_404() {
        let state = state();
        let get = route(&state, &Method::GET, "/cache/nope", None, Bytes::new()).await;
        assert_eq!(get.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let state = state();
        let bad_json = route(&state, &Method::PUT, "/cache/k", None, Bytes::from_static(b"{")).await;
        assert_eq!(bad_json.status(), StatusCode::BAD_REQUEST);

        let bad_ttl = route(
            &state,
            &Method::PUT,
            "/cache/k",
            Some("ttl_ms=soon"),
            Bytes::from_static(b"1"),
        )
        .await;
        assert_eq!(bad_ttl.status(), StatusCode::BAD_REQUEST);

        let bad_priority = route(
            &state,
            &Method::PUT,
            "/cache/k",
            Some("priority=urgent"),
            Bytes::from_static(b"1"),
        )
        .await;
        assert_eq!(bad_priority.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let small = read_body(Full::new(Bytes::from_static(b"{\"a\":1}")), 64).await;
        assert_eq!(small.unwrap(), Bytes::from_static(b"{\"a\":1}"));

        let large = read_body(Full::new(Bytes::from(vec![b'x'; 65])), 64).await;
        assert_eq!(large.unwrap_err().status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let state = state();
        state.cache.set("a", json!(1)).await;
        state.cache.set("b", json!(2)).await;

        let delete = route(&state, &Method::DELETE, "/cache/a", None, Bytes::new()).await;
        assert_eq!(delete.status(), StatusCode::NO_CONTENT);
        assert!(state.cache.get("a").await.is_none());

        let clear = route(&state, &Method::DELETE, "/cache", None, Bytes::new()).await;
        assert_eq!(clear.status(), StatusCode::NO_CONTENT);
        assert!(state.cache.get("b").await.is_none());
    }

    #[tokio::test]
    async fn test_stats_metrics_and_health() {
        let state = state();
        state.cache.set("a", json!(1)).await;
        state.cache.get("a").await;

        let stats = body_json(route(&state, &Method::GET, "/stats", None, Bytes::new()).await).await;
        assert_eq!(stats["l1_hits"], 1);

        let metrics = route(&state, &Method::GET, "/metrics", None, Bytes::new()).await;
        assert_eq!(metrics.status(), StatusCode::OK);
        let text = metrics.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&text).contains("tiered_cache_hits_total{tier=\"L1\"} 1"));

        let health = route(&state, &Method::GET, "/healthz", None, Bytes::new()).await;
        assert_eq!(health.status(), StatusCode::OK);
    }
}
