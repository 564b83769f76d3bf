//! mpdashserver extension mounting the MPD dashboard
//!
//! Adds the HTML pages, the JSON API and the static files to a [`Server`], all of
//! them under the configured prefix (`host.path_prefix`).
//!
//! # Registered routes
//!
//! - `GET {prefix}`: 301 to `{prefix}/`
//! - `GET {prefix}/`: 302 to `{prefix}/queue/`
//! - `GET|POST {prefix}/api/{action}`: JSON API, described at `/api-docs/mpdash.json`
//!   and browsable at `/swagger-ui/mpdash`
//! - `GET {prefix}/assets/{file}`: embedded files, `{prefix}/favicon.ico` redirects there
//! - anything else: pages resolved by the route table

use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{OriginalUri, Path, RawQuery, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use mpdashconfig::get_config;
use mpdashserver::Server;
use rust_embed::RustEmbed;
use serde_json::{Value, json};
use tracing::{debug, info};
use url::form_urlencoded;
use utoipa::OpenApi;

use crate::api::{self, Action, ApiError, ApiReply, ApiResult, ErrorResponse};
use crate::openapi::{ActionRequest, ApiDoc};
use crate::queue::QueueEngine;
use crate::render::Chrome;
use crate::resolver::{RouteOutcome, RouteTable, RouteTableError};
use crate::session::DaemonSession;
use crate::views::{Resolution, ViewContext, render_view};

/// Stylesheet and icon of the dashboard
#[derive(RustEmbed, Clone)]
#[folder = "assets/"]
pub struct DashboardAssets;

/// State shared by the dashboard handlers
#[derive(Clone)]
pub struct DashboardState {
    pub ctx: ViewContext,
    pub engine: QueueEngine,
    pub routes: Arc<RouteTable>,
}

impl DashboardState {
    pub fn new(
        session: Arc<dyn DaemonSession>,
        prefix: impl Into<String>,
        files_url: Option<String>,
    ) -> Result<Self, RouteTableError> {
        Ok(Self {
            engine: QueueEngine::new(session.clone()),
            ctx: ViewContext {
                session,
                prefix: prefix.into(),
                files_url,
            },
            routes: Arc::new(RouteTable::standard()?),
        })
    }

    /// State built from the global configuration
    pub fn from_config(session: Arc<dyn DaemonSession>) -> Result<Self, RouteTableError> {
        let config = get_config();
        Self::new(session, config.get_path_prefix(), config.get_files_url())
    }

    pub fn prefix(&self) -> &str {
        &self.ctx.prefix
    }

    fn session(&self) -> &dyn DaemonSession {
        self.ctx.session.as_ref()
    }
}

/// Extends mpdashserver with the MPD dashboard
///
/// `mpdashserver` stays a generic HTTP server; this crate brings its own routes
/// without the server knowing about them.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use mpdashcontrol::{DashboardExt, MpdSession};
/// use mpdashserver::Server;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let mut server = Server::new_configured();
///     server.init_dashboard(Arc::new(MpdSession::from_config())).await?;
///     server.start().await?;
///     server.wait().await;
///     Ok(())
/// }
/// ```
pub trait DashboardExt {
    /// Registers the dashboard with the configured prefix and files URL
    async fn init_dashboard(
        &mut self,
        session: Arc<dyn DaemonSession>,
    ) -> Result<Arc<DashboardState>>;

    /// Registers the dashboard with an already built state
    async fn init_dashboard_with_state(
        &mut self,
        state: DashboardState,
    ) -> Result<Arc<DashboardState>>;
}

impl DashboardExt for Server {
    async fn init_dashboard(
        &mut self,
        session: Arc<dyn DaemonSession>,
    ) -> Result<Arc<DashboardState>> {
        let state = DashboardState::from_config(session)?;
        self.init_dashboard_with_state(state).await
    }

    async fn init_dashboard_with_state(
        &mut self,
        state: DashboardState,
    ) -> Result<Arc<DashboardState>> {
        let prefix = state.prefix().to_string();
        self.add_assets::<DashboardAssets>(&format!("{}/assets", prefix))
            .await;
        self.add_redirect(
            &format!("{}/favicon.ico", prefix),
            &format!("{}/assets/favicon.svg", prefix),
        )
        .await;

        let mut openapi = ApiDoc::openapi();
        if !prefix.is_empty() {
            openapi.servers = Some(vec![utoipa::openapi::server::Server::new(prefix.as_str())]);
        }
        self.add_openapi(api_router(state.clone()), openapi, "mpdash")
            .await;

        self.add_router("/", dashboard_router(state.clone())).await;
        info!(
            "Dashboard mounted at {}/ ({} routes)",
            prefix,
            state.routes.routes().len()
        );
        Ok(Arc::new(state))
    }
}

/// Router of the JSON API, full paths (prefix included)
pub fn api_router(state: DashboardState) -> Router {
    let prefix = state.prefix().to_string();
    Router::new()
        .route(&format!("{}/api/{{action}}", prefix), get(api_get).post(api_post))
        .with_state(state)
}

/// Router of the dashboard pages, full paths (prefix included)
pub fn dashboard_router(state: DashboardState) -> Router {
    let prefix = state.prefix().to_string();
    let mut router = Router::new();

    let home = format!("{}/queue/", prefix);
    router = router.route(
        &format!("{}/", prefix),
        get(move || {
            let home = home.clone();
            async move { redirect(StatusCode::FOUND, &home) }
        }),
    );
    if !prefix.is_empty() {
        let slash = format!("{}/", prefix);
        router = router.route(
            &prefix,
            get(move || {
                let slash = slash.clone();
                async move { redirect(StatusCode::MOVED_PERMANENTLY, &slash) }
            }),
        );
    }

    router.fallback(dashboard).with_state(state)
}

fn redirect(status: StatusCode, location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (status, [(header::LOCATION, value)]).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn parse_query(raw: Option<&str>) -> Vec<(String, String)> {
    form_urlencoded::parse(raw.unwrap_or_default().as_bytes())
        .into_owned()
        .collect()
}

/// Read endpoint of the JSON API
#[utoipa::path(
    get,
    path = "/api/{action}",
    params(
        ("action" = String, Path, description = "Endpoint name: status, queue, albums, art..."),
    ),
    responses(
        (status = 200, description = "Endpoint result as JSON, raw image bytes for `art`"),
        (status = 204, description = "`art` on a file without an embedded picture"),
        (status = 400, description = "Invalid parameter", body = ErrorResponse),
        (status = 404, description = "Unknown endpoint", body = ErrorResponse),
        (status = 503, description = "MPD daemon unreachable", body = ErrorResponse)
    ),
    tag = "mpd"
)]
async fn api_get(
    State(state): State<DashboardState>,
    Path(endpoint): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let pairs = parse_query(query.as_deref());
    let response = match api::get_endpoint(state.session(), &endpoint, &pairs).await {
        Ok(ApiReply::Json(value)) => Json(value).into_response(),
        Ok(ApiReply::Image { mime, data }) => {
            ([(header::CONTENT_TYPE, mime)], data).into_response()
        }
        Ok(ApiReply::NoContent) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    };
    no_store(response)
}

async fn run_action(
    state: &DashboardState,
    action: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> ApiResult<Value> {
    let action: Action = action.parse()?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let body = api::parse_body(content_type, body)?;
    api::post_action(state.session(), &state.engine, action, &body).await
}

/// Action of the JSON API
#[utoipa::path(
    post,
    path = "/api/{action}",
    params(
        ("action" = String, Path, description = "Action name: play, pause, insert, volume..."),
    ),
    request_body(content = ActionRequest, description = "Action parameters", content_type = "application/json"),
    responses(
        (status = 200, description = "Action result, e.g. `{\"inserted\": 2}`"),
        (status = 400, description = "Missing or invalid parameter", body = ErrorResponse),
        (status = 404, description = "Unknown action", body = ErrorResponse),
        (status = 503, description = "MPD daemon unreachable", body = ErrorResponse)
    ),
    tag = "mpd"
)]
async fn api_post(
    State(state): State<DashboardState>,
    Path(action): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let response = match run_action(&state, &action, &headers, &body).await {
        Ok(value) => Json(value).into_response(),
        Err(e) => e.into_response(),
    };
    no_store(response)
}

fn wants_json(headers: &HeaderMap, query: &[(String, String)]) -> bool {
    query.iter().any(|(k, v)| k == "format" && v == "json")
        || headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("application/json"))
}

async fn dashboard(
    State(state): State<DashboardState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    let full_path = uri.path();
    let query = parse_query(uri.query());
    let json = wants_json(&headers, &query);
    let prefix = state.prefix();

    let path = if prefix.is_empty() {
        Some(full_path)
    } else {
        full_path
            .strip_prefix(prefix)
            .filter(|rest| rest.starts_with('/'))
    };

    let resolution = match path.map(|p| state.routes.resolve(prefix, p, uri.query())) {
        Some(RouteOutcome::Matched(route)) => render_view(&state.ctx, &route, &query).await,
        Some(RouteOutcome::Redirect(location)) => Ok(Resolution::Redirect(location)),
        Some(RouteOutcome::NotFound) | None => Ok(Resolution::NotFound),
    };

    let response = match resolution {
        Ok(Resolution::Redirect(location)) => {
            debug!("Redirecting {} to {}", full_path, location);
            redirect(StatusCode::MOVED_PERMANENTLY, &location)
        }

        Ok(Resolution::NotFound) => {
            if json {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": format!("Unrecognised request: {}", full_path) })),
                )
                    .into_response()
            } else {
                let chrome = Chrome {
                    prefix,
                    state: state.session().status().await.ok().map(|s| s.state),
                };
                (StatusCode::NOT_FOUND, Html(chrome.not_found(full_path))).into_response()
            }
        }

        Ok(Resolution::Page(page)) => {
            let refresh = page.refresh;
            let mut response = if json {
                Json(page).into_response()
            } else {
                let chrome = Chrome {
                    prefix,
                    state: state.session().status().await.ok().map(|s| s.state),
                };
                Html(chrome.page(&page)).into_response()
            };
            if let Some(seconds) = refresh {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("refresh"), HeaderValue::from(seconds));
            }
            response
        }

        Err(e) => {
            let error = ApiError::from(e);
            if json {
                error.into_response()
            } else {
                let status = error.status();
                let chrome = Chrome {
                    prefix,
                    state: None,
                };
                (status, Html(chrome.message("Error", &error.to_string()))).into_response()
            }
        }
    };

    no_store(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlayState;
    use crate::testing::MemoryDaemon;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(state: DashboardState) -> Router {
        api_router(state.clone()).merge(dashboard_router(state))
    }

    fn setup() -> (Arc<MemoryDaemon>, Router) {
        let daemon = Arc::new(MemoryDaemon::with_library());
        let state = DashboardState::new(daemon.clone(), "/mpd", None).unwrap();
        (daemon, app(state))
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_then_remove_around_current() {
        let (daemon, app) = setup();
        daemon.set_queue(&["q0", "q1", "q2"]);
        daemon.set_current(Some(1), PlayState::Play);

        let response = app
            .clone()
            .oneshot(post("/mpd/api/insert", json!({"file": "X.mp3"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"inserted": 1}));
        assert_eq!(daemon.queue_files(), vec!["q0", "q1", "X.mp3", "q2"]);

        let response = app
            .oneshot(post("/mpd/api/remove", json!({"ids": [102]})))
            .await
            .unwrap();
        assert_eq!(body_json(response).await, json!({"removed": 1}));
        assert_eq!(daemon.queue_ids(), vec![100, 101, 103]);
    }

    #[tokio::test]
    async fn test_collection_redirects_to_slash() {
        let (daemon, app) = setup();
        let response = app.oneshot(get("/mpd/albums/Foo")).await.unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()["location"], "/mpd/albums/Foo/");
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tracks_by_album_redirect_keeps_query() {
        let (_, app) = setup();
        let response = app
            .oneshot(get("/mpd/tracks/album/Foo/?format=json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()["location"], "/mpd/albums/Foo/?format=json");
    }

    #[tokio::test]
    async fn test_album_page_html_and_json() {
        let (_, app) = setup();
        let response = app.clone().oneshot(get("/mpd/albums/Foo/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["cache-control"], "no-store");
        let html = body_text(response).await;
        assert!(html.contains("First"));
        assert!(html.find("First") < html.find("Second"));

        let response = app
            .oneshot(get("/mpd/albums/Foo/?format=json"))
            .await
            .unwrap();
        let page = body_json(response).await;
        assert_eq!(page["title"], "Foo");
        assert_eq!(page["body"]["kind"], "tracks");
    }

    #[tokio::test]
    async fn test_unknown_page_is_404_with_chrome() {
        let (_, app) = setup();
        let response = app.oneshot(get("/mpd/nowhere/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let html = body_text(response).await;
        assert!(html.contains("Unrecognised request: /mpd/nowhere/"));
        assert!(html.contains("/mpd/api/pause"));
    }

    #[tokio::test]
    async fn test_prefix_root_redirects() {
        let (_, app) = setup();
        let response = app.clone().oneshot(get("/mpd")).await.unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()["location"], "/mpd/");

        let response = app.oneshot(get("/mpd/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()["location"], "/mpd/queue/");
    }

    #[tokio::test]
    async fn test_status_page_sets_refresh_while_playing() {
        let (daemon, app) = setup();
        daemon.set_queue(&["foo/a/1.flac"]);
        daemon.set_current(Some(0), PlayState::Play);
        let response = app.oneshot(get("/mpd/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("refresh"));
    }

    #[tokio::test]
    async fn test_daemon_unavailable() {
        let (daemon, app) = setup();
        daemon.set_unavailable(true);

        let response = app.clone().oneshot(get("/mpd/api/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_json(response).await["error"].is_string());

        let response = app.oneshot(get("/mpd/queue/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_form_post_and_bad_requests() {
        let (daemon, app) = setup();
        daemon.set_queue(&["a", "b"]);

        let request = Request::builder()
            .method("POST")
            .uri("/mpd/api/play")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("data=%7B%22id%22%3A1%7D"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(daemon.status().await.unwrap().song, Some(1));

        let response = app
            .clone()
            .oneshot(post("/mpd/api/play", json!({"id": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post("/mpd/api/fly", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_art_endpoint() {
        let (daemon, app) = setup();
        daemon.add_picture("foo/a/1.flac", "image/png", b"\x89PNG");

        let response = app
            .clone()
            .oneshot(get("/mpd/api/art?file=foo%2Fa%2F1.flac"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/png");

        let response = app.oneshot(get("/mpd/api/art?file=none")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_server_extension_serves_assets() {
        let daemon = Arc::new(MemoryDaemon::new());
        let mut server = Server::new("Test", "127.0.0.1", 0);
        let state = DashboardState::new(daemon, "/mpd", None).unwrap();
        server.init_dashboard_with_state(state).await.unwrap();

        let app = server.router().await;
        let response = app.clone().oneshot(get("/mpd/assets/style.css")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/css"));

        let response = app.clone().oneshot(get("/mpd/favicon.ico")).await.unwrap();
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(response.headers()["location"], "/mpd/assets/favicon.svg");

        let response = app.clone().oneshot(get("/mpd/assets/favicon.svg")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/svg+xml");

        let response = app.oneshot(get("/mpd/assets/missing.css")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_extension_documents_api() {
        let daemon = Arc::new(MemoryDaemon::new());
        let mut server = Server::new("Test", "127.0.0.1", 0);
        let state = DashboardState::new(daemon, "/mpd", None).unwrap();
        server.init_dashboard_with_state(state).await.unwrap();

        let app = server.router().await;
        let response = app.clone().oneshot(get("/api-docs/mpdash.json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let doc = body_json(response).await;
        assert_eq!(doc["servers"][0]["url"], "/mpd");
        assert!(doc["paths"]["/api/{action}"].is_object());

        // the documented routes are the live ones
        let response = app.oneshot(get("/mpd/api/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_root_mount() {
        let daemon = Arc::new(MemoryDaemon::with_library());
        let app = app(DashboardState::new(daemon, "", None).unwrap());

        let response = app.clone().oneshot(get("/")).await.unwrap();
        assert_eq!(response.headers()["location"], "/queue/");

        let response = app.oneshot(get("/albums/Foo")).await.unwrap();
        assert_eq!(response.headers()["location"], "/albums/Foo/");
    }
}
