use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{Query, State},
    http::{HeaderMap, Method, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tower::ServiceExt;

use giftzly_og::config::AppConfig;
use giftzly_og::features::preview::{DEFAULT_OWNER_NAME, DEFAULT_TITLE};
use giftzly_og::{AppState, build_router};

static TUFFY: &[u8] = include_bytes!("fixtures/Tuffy.ttf");
const MAX_IMAGE_BYTES: usize = 64 * 1024;

/// 模拟上游：元数据服务 + 封面/默认图 + 字体
#[derive(Default)]
struct Upstream {
    base: String,
    metadata_calls: AtomicUsize,
    font_calls: AtomicUsize,
    /// 前 N 次字体请求返回 500
    font_failures: AtomicUsize,
    auth_headers: Mutex<Vec<String>>,
    /// `(method, path)` 访问记录
    asset_hits: Mutex<Vec<(Method, String)>>,
}

impl Upstream {
    fn asset_hits(&self, method: Method, path: &str) -> usize {
        self.asset_hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, p)| *m == method && p == path)
            .count()
    }
}

fn tiny_png() -> Vec<u8> {
    let mut pixmap = tiny_skia::Pixmap::new(8, 8).unwrap();
    pixmap.fill(tiny_skia::Color::from_rgba8(20, 184, 166, 255));
    pixmap.encode_png().unwrap()
}

async fn public_list(
    State(up): State<Arc<Upstream>>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    up.metadata_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(v) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        up.auth_headers.lock().unwrap().push(v.to_string());
    }
    let token = q.get("token").cloned().unwrap_or_default();
    let body = match token.as_str() {
        "abc123" => serde_json::json!({
            "list": {
                "title": "Anniversaire de Léa",
                "owner_name": "Léa",
                "cover_url": format!("{}/cover.jpg", up.base),
            }
        }),
        "broken-cover" => serde_json::json!({
            "list": {
                "title": "Anniversaire de Léa",
                "owner_name": "Léa",
                "cover_url": format!("{}/missing.jpg", up.base),
            }
        }),
        "flaky-cover" => serde_json::json!({
            "list": { "title": "Noël", "cover_url": format!("{}/flaky.jpg", up.base) }
        }),
        "huge-cover" => serde_json::json!({
            "list": { "title": "Noël", "cover_url": format!("{}/huge.jpg", up.base) }
        }),
        "long-title" => serde_json::json!({
            "list": { "title": "x".repeat(200), "cover_url": format!("{}/cover.jpg", up.base) }
        }),
        "empty-list" => serde_json::json!({ "list": {} }),
        "no-list" => serde_json::json!({}),
        "bad-json" => return (StatusCode::OK, "<html>oops</html>").into_response(),
        _ => return (StatusCode::NOT_FOUND, "{\"error\":\"not found\"}").into_response(),
    };
    axum::Json(body).into_response()
}

async fn image_asset(State(up): State<Arc<Upstream>>, method: Method, req: Request<Body>) -> Response {
    let path = req.uri().path().to_string();
    up.asset_hits.lock().unwrap().push((method.clone(), path.clone()));
    match path.as_str() {
        "/missing.jpg" | "/gone.png" => StatusCode::NOT_FOUND.into_response(),
        // HEAD 正常，GET 失败
        "/flaky.jpg" if method == Method::GET => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "/huge.jpg" => ([(header::CONTENT_TYPE, "image/jpeg")], vec![0u8; MAX_IMAGE_BYTES * 2])
            .into_response(),
        _ => ([(header::CONTENT_TYPE, "image/png")], tiny_png()).into_response(),
    }
}

async fn font(State(up): State<Arc<Upstream>>) -> Response {
    up.font_calls.fetch_add(1, Ordering::SeqCst);
    let remaining = up.font_failures.load(Ordering::SeqCst);
    if remaining > 0 {
        up.font_failures.store(remaining - 1, Ordering::SeqCst);
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    ([(header::CONTENT_TYPE, "font/ttf")], TUFFY.to_vec()).into_response()
}

async fn spawn_upstream(font_failures: usize) -> Arc<Upstream> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let up = Arc::new(Upstream {
        base: format!("http://{addr}"),
        font_failures: AtomicUsize::new(font_failures),
        ..Upstream::default()
    });

    let app = Router::new()
        .route("/functions/v1/public-list", get(public_list))
        .route("/cover.jpg", get(image_asset))
        .route("/missing.jpg", get(image_asset))
        .route("/default.png", get(image_asset))
        .route("/gone.png", get(image_asset))
        .route("/flaky.jpg", get(image_asset))
        .route("/huge.jpg", get(image_asset))
        .route("/font.ttf", get(font))
        .with_state(up.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    up
}

fn config_for(up: &Upstream) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.metadata.base_url = up.base.clone();
    cfg.metadata.anon_key = "anon-test-key".to_string();
    cfg.font.url = format!("{}/font.ttf", up.base);
    cfg.font.family = "Tuffy".to_string();
    cfg.preview.default_cover_url = format!("{}/default.png", up.base);
    cfg.preview.max_image_bytes = MAX_IMAGE_BYTES;
    cfg.image.load_system_fonts = false;
    cfg.image.optimize_speed = true;
    cfg.image.max_parallel = 2;
    cfg
}

fn app_for(up: &Upstream) -> (Router, AppState) {
    let cfg = config_for(up);
    let state = AppState::new(reqwest::Client::new(), &cfg).expect("state");
    (build_router(state.clone(), &cfg), state)
}

async fn get_og(app: &Router, query: &str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/og-image{query}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("call app")
}

async fn body_text(resp: Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

async fn png_size(resp: Response) -> (u32, u32) {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let decoder = png::Decoder::new(std::io::Cursor::new(bytes.to_vec()));
    let reader = decoder.read_info().expect("valid png");
    (reader.info().width, reader.info().height)
}

#[tokio::test]
async fn missing_or_blank_token_is_400_without_outbound_calls() {
    let up = spawn_upstream(0).await;
    let (app, _) = app_for(&up);

    for query in ["", "?token=", "?token=%20%20"] {
        let resp = get_og(&app, query).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(resp).await, "Missing token");
    }
    assert_eq!(up.metadata_calls.load(Ordering::SeqCst), 0);
    assert_eq!(up.font_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_list_is_404_and_nothing_else_is_fetched() {
    let up = spawn_upstream(0).await;
    let (app, _) = app_for(&up);

    let resp = get_og(&app, "?token=does-not-exist").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(resp).await, "List not found");
    assert_eq!(up.font_calls.load(Ordering::SeqCst), 0);
    assert!(up.asset_hits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn metadata_request_carries_bearer_key() {
    let up = spawn_upstream(0).await;
    let (app, _) = app_for(&up);

    let resp = get_og(&app, "?token=abc123").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        up.auth_headers.lock().unwrap().as_slice(),
        ["Bearer anon-test-key".to_string()]
    );
}

#[tokio::test]
async fn happy_path_returns_cacheable_png_of_canvas_size() {
    let up = spawn_upstream(0).await;
    let (app, state) = app_for(&up);

    let resp = get_og(&app, "?token=abc123").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "public, max-age=3600");
    assert_eq!(png_size(resp).await, (1200, 630));

    // 封面经 HEAD 探测后被下载内嵌
    assert_eq!(up.asset_hits(Method::HEAD, "/cover.jpg"), 1);
    assert_eq!(up.asset_hits(Method::GET, "/cover.jpg"), 1);

    let (doc, _) = state.preview.build_document("abc123").await.expect("doc");
    assert_eq!(doc.texts(), vec!["Anniversaire de Léa", "Créée par Léa", "giftzly"]);
    assert_eq!(doc.image_sources(), vec![format!("{}/cover.jpg", up.base)]);
}

#[tokio::test]
async fn broken_cover_falls_back_to_default_asset() {
    let up = spawn_upstream(0).await;
    let (app, state) = app_for(&up);

    let resp = get_og(&app, "?token=broken-cover").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(png_size(resp).await, (1200, 630));

    assert_eq!(up.asset_hits(Method::HEAD, "/missing.jpg"), 1);
    assert_eq!(up.asset_hits(Method::GET, "/missing.jpg"), 0);
    assert_eq!(up.asset_hits(Method::GET, "/default.png"), 1);

    let (doc, _) = state.preview.build_document("broken-cover").await.expect("doc");
    assert_eq!(doc.image_sources(), vec![format!("{}/default.png", up.base)]);
}

#[tokio::test]
async fn cover_download_failure_after_probe_falls_back_to_default() {
    let up = spawn_upstream(0).await;
    let (app, _) = app_for(&up);

    let resp = get_og(&app, "?token=flaky-cover").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(png_size(resp).await, (1200, 630));

    assert_eq!(up.asset_hits(Method::HEAD, "/flaky.jpg"), 1);
    assert_eq!(up.asset_hits(Method::GET, "/flaky.jpg"), 1);
    assert_eq!(up.asset_hits(Method::GET, "/default.png"), 1);
}

#[tokio::test]
async fn oversized_cover_is_replaced_by_default() {
    let up = spawn_upstream(0).await;
    let (app, _) = app_for(&up);

    let resp = get_og(&app, "?token=huge-cover").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(png_size(resp).await, (1200, 630));
    assert_eq!(up.asset_hits(Method::GET, "/default.png"), 1);
}

#[tokio::test]
async fn unreachable_default_cover_still_renders_card() {
    let up = spawn_upstream(0).await;
    let mut cfg = config_for(&up);
    cfg.preview.default_cover_url = format!("{}/gone.png", up.base);
    let state = AppState::new(reqwest::Client::new(), &cfg).expect("state");
    let app = build_router(state, &cfg);

    for token in ["flaky-cover", "empty-list"] {
        let resp = get_og(&app, &format!("?token={token}")).await;
        assert_eq!(resp.status(), StatusCode::OK, "token={token}");
        assert_eq!(png_size(resp).await, (1200, 630));
    }
    assert_eq!(up.asset_hits(Method::GET, "/gone.png"), 2);
}

#[tokio::test]
async fn missing_fields_use_defaults() {
    let up = spawn_upstream(0).await;
    let (app, state) = app_for(&up);

    for token in ["empty-list", "no-list"] {
        let resp = get_og(&app, &format!("?token={token}")).await;
        assert_eq!(resp.status(), StatusCode::OK, "token={token}");

        let (doc, _) = state.preview.build_document(token).await.expect("doc");
        let caption = format!("Créée par {DEFAULT_OWNER_NAME}");
        assert_eq!(doc.texts()[..2], [DEFAULT_TITLE, caption.as_str()]);
        assert_eq!(doc.image_sources(), vec![format!("{}/default.png", up.base)]);
    }
    // 默认图不做探测
    assert_eq!(up.asset_hits(Method::HEAD, "/default.png"), 0);
}

#[tokio::test]
async fn unparsable_metadata_is_500() {
    let up = spawn_upstream(0).await;
    let (app, _) = app_for(&up);

    let resp = get_og(&app, "?token=bad-json").await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert!(body_text(resp).await.starts_with("Invalid JSON"));
}

#[tokio::test]
async fn long_title_still_renders_exact_canvas() {
    let up = spawn_upstream(0).await;
    let (app, _) = app_for(&up);

    let resp = get_og(&app, "?token=long-title").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(png_size(resp).await, (1200, 630));
}

#[tokio::test]
async fn font_is_fetched_once_across_requests() {
    let up = spawn_upstream(0).await;
    let (app, state) = app_for(&up);

    for _ in 0..3 {
        let resp = get_og(&app, "?token=abc123").await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    assert_eq!(up.font_calls.load(Ordering::SeqCst), 1);
    assert!(state.preview.font_loader().is_cached());
}

#[tokio::test]
async fn concurrent_first_requests_share_one_font_fetch() {
    let up = spawn_upstream(0).await;
    let (app, _) = app_for(&up);

    let (a, b, c) = tokio::join!(
        get_og(&app, "?token=abc123"),
        get_og(&app, "?token=abc123"),
        get_og(&app, "?token=broken-cover"),
    );
    for resp in [a, b, c] {
        assert_eq!(resp.status(), StatusCode::OK);
    }
    assert_eq!(up.font_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_font_fetch_is_retried_on_next_request() {
    let up = spawn_upstream(1).await;
    let (app, _) = app_for(&up);

    let resp = get_og(&app, "?token=abc123").await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(resp).await.starts_with("Font error"));

    let resp = get_og(&app, "?token=abc123").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(up.font_calls.load(Ordering::SeqCst), 2);
}
