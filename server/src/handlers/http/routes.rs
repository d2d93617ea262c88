use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use hyper::Method;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceBuilder, ServiceExt, service_fn};
use tracing::{debug, error};

use crate::auth::permissions::{USER_EDIT, USER_VIEW};
use crate::auth::{AuthContext, Gate};
use crate::errors::ErrorCode;
use crate::handlers::http::{auth, health};
use crate::tower_middle::{ApiThrottleLayer, AuthLayer, GateLayer, LoginThrottleLayer};
use crate::{ApiRequest, ApiResponse, AppState};

/// A fully layered, shareable route endpoint.
pub type RouteService = BoxCloneSyncService<ApiRequest, ApiResponse, Infallible>;

// ---------------------------------------------------------------------------
// RouteKind
// ---------------------------------------------------------------------------
//
// Three security tiers:
//
//   Open          : no auth. Handler receives (req, state).
//                   Use for: /health, /api/auth/login.
//
//   Authenticated : token + session ledger lookup. Handler receives
//                   (req, state, identity).
//
//   Gated         : API throttle, then Authenticated, then a permission or
//                   role predicate.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteKind {
    Open,
    Authenticated,
    Gated(Gate),
}

struct Route {
    method: Method,
    path: String,
    kind: RouteKind,
    service: RouteService,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub struct Router {
    state: AppState,
    routes: Vec<Route>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes_count", &self.routes.len())
            .finish()
    }
}

impl Router {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            routes: Vec::new(),
        }
    }

    // ── Open (no auth) ────────────────────────────────────────────────────────

    pub fn get<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        let service = open_service(&self.state, handler);
        self.push(Method::GET, path, RouteKind::Open, service)
    }

    pub fn post<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        let service = open_service(&self.state, handler);
        self.push(Method::POST, path, RouteKind::Open, service)
    }

    // ── Authenticated ─────────────────────────────────────────────────────────

    pub fn get_auth<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest, AppState, AuthContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        let service = self.authenticated(identity_service(&self.state, handler));
        self.push(Method::GET, path, RouteKind::Authenticated, service)
    }

    pub fn post_auth<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest, AppState, AuthContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        let service = self.authenticated(identity_service(&self.state, handler));
        self.push(Method::POST, path, RouteKind::Authenticated, service)
    }

    // ── Gated (API throttle → auth → predicate) ──────────────────────────────

    pub fn get_gated<F, Fut>(self, path: &str, gate: Gate, handler: F) -> Self
    where
        F: Fn(ApiRequest, AppState, AuthContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        let service = self.gated(gate.clone(), identity_service(&self.state, handler));
        self.push(Method::GET, path, RouteKind::Gated(gate), service)
    }

    pub fn post_gated<F, Fut>(self, path: &str, gate: Gate, handler: F) -> Self
    where
        F: Fn(ApiRequest, AppState, AuthContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        let service = self.gated(gate.clone(), identity_service(&self.state, handler));
        self.push(Method::POST, path, RouteKind::Gated(gate), service)
    }

    // ── Groups ────────────────────────────────────────────────────────────────

    /// Wrap every route registered so far under `prefix` in `layer`. The
    /// group layer runs before the route's own layers.
    pub fn layer_group<L>(mut self, prefix: &str, layer: L) -> Self
    where
        L: Layer<RouteService>,
        L::Service: Service<ApiRequest, Response = ApiResponse, Error = Infallible>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<ApiRequest>>::Future: Send + 'static,
    {
        for route in self.routes.iter_mut().filter(|r| r.path.starts_with(prefix)) {
            let inner = route.service.clone();
            route.service = BoxCloneSyncService::new(layer.layer(inner));
        }
        self
    }

    fn push(mut self, method: Method, path: &str, kind: RouteKind, service: RouteService) -> Self {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            kind,
            service,
        });
        self
    }

    fn authenticated(&self, inner: RouteService) -> RouteService {
        BoxCloneSyncService::new(
            ServiceBuilder::new()
                .layer(AuthLayer::new(
                    self.state.authenticator(),
                    self.state.catalog.clone(),
                ))
                .service(inner),
        )
    }

    fn gated(&self, gate: Gate, inner: RouteService) -> RouteService {
        let catalog = self.state.catalog.clone();
        BoxCloneSyncService::new(
            ServiceBuilder::new()
                .layer(ApiThrottleLayer::new(
                    self.state.api_throttle.clone(),
                    catalog.clone(),
                ))
                .layer(AuthLayer::new(self.state.authenticator(), catalog.clone()))
                .layer(GateLayer::new(gate, catalog))
                .service(inner),
        )
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    pub async fn route(&self, req: ApiRequest) -> ApiResponse {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let matched = self
            .routes
            .iter()
            .find(|r| r.method == method && Self::path_matches(&r.path, &path));

        let Some(route) = matched else {
            debug!("No route for {} {}", method, path);
            return self.state.catalog.render(&ErrorCode::NotFound.into());
        };

        match route.service.clone().oneshot(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }

    pub fn route_kind(&self, method: &Method, path: &str) -> Option<&RouteKind> {
        self.routes
            .iter()
            .find(|r| r.method == *method && Self::path_matches(&r.path, path))
            .map(|r| &r.kind)
    }

    // ── Path matching ─────────────────────────────────────────────────────────

    pub fn path_matches(route_path: &str, request_path: &str) -> bool {
        // Strip query string from incoming request path before comparing.
        let clean = request_path.split('?').next().unwrap_or(request_path);

        if route_path == clean {
            return true;
        }

        // Segment-by-segment matching for `:param` wildcards.
        let route_segs: Vec<&str> = route_path.split('/').collect();
        let path_segs: Vec<&str> = clean.split('/').collect();

        if route_segs.len() != path_segs.len() {
            return false;
        }

        route_segs
            .iter()
            .zip(path_segs.iter())
            .all(|(r, p)| r.starts_with(':') || r == p)
    }
}

// ---------------------------------------------------------------------------
// Handler adapters
// ---------------------------------------------------------------------------

fn open_service<F, Fut>(state: &AppState, handler: F) -> RouteService
where
    F: Fn(ApiRequest, AppState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
{
    let state = state.clone();
    let handler = Arc::new(handler);

    BoxCloneSyncService::new(service_fn(move |req: ApiRequest| {
        let handler = handler.clone();
        let state = state.clone();
        async move {
            let result = (*handler)(req, state.clone()).await;
            Ok::<_, Infallible>(finish(result, &state))
        }
    }))
}

/// The identity is left in the extensions by [`AuthLayer`].
fn identity_service<F, Fut>(state: &AppState, handler: F) -> RouteService
where
    F: Fn(ApiRequest, AppState, AuthContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
{
    let state = state.clone();
    let handler = Arc::new(handler);

    BoxCloneSyncService::new(service_fn(move |mut req: ApiRequest| {
        let handler = handler.clone();
        let state = state.clone();
        async move {
            let response = match req.extensions_mut().remove::<AuthContext>() {
                Some(identity) => finish((*handler)(req, state.clone(), identity).await, &state),
                None => state.catalog.render(&ErrorCode::Unauthorized.into()),
            };
            Ok::<_, Infallible>(response)
        }
    }))
}

/// An error escaping a handler never reaches the client verbatim.
fn finish(result: Result<ApiResponse>, state: &AppState) -> ApiResponse {
    result.unwrap_or_else(|e| {
        error!("Handler failed: {:#}", e);
        state.catalog.render(&ErrorCode::InternalError.into())
    })
}

// ---------------------------------------------------------------------------
// Route table
// ---------------------------------------------------------------------------
//
//   GET  /health                      Open
//   POST /api/auth/login              Open
//   POST /api/auth/verify             Authenticated
//   POST /api/auth/logout             Authenticated
//   GET  /api/auth/sessions           Gated(user.view)
//   POST /api/auth/sessions/revoke    Gated(user.edit)
//
// Everything under /api/auth sits behind the login throttle.

pub fn build_api_router(state: &AppState) -> Router {
    let login_throttle =
        LoginThrottleLayer::new(state.login_throttle.clone(), state.catalog.clone());

    Router::new(state.clone())
        .get("/health", health::handle_health)
        .post("/api/auth/login", auth::handle_login)
        .post_auth("/api/auth/verify", auth::handle_verify)
        .post_auth("/api/auth/logout", auth::handle_logout)
        .get_gated(
            "/api/auth/sessions",
            Gate::Permission(USER_VIEW),
            auth::handle_list_sessions,
        )
        .post_gated(
            "/api/auth/sessions/revoke",
            Gate::Permission(USER_EDIT),
            auth::handle_revoke_session,
        )
        .layer_group("/api/auth/", login_throttle)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use http_body_util::{BodyExt, Empty};
    use hyper::{Request, StatusCode};

    use crate::test_support::test_state;

    fn request(method: Method, path: &str) -> ApiRequest {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Empty::<Bytes>::new().map_err(|e| match e {}).boxed())
            .unwrap()
    }

    #[test]
    fn exact_path_matches() {
        assert!(Router::path_matches("/api/auth/login", "/api/auth/login"));
    }

    #[test]
    fn different_paths_do_not_match() {
        assert!(!Router::path_matches("/api/auth/login", "/api/auth/logout"));
    }

    #[test]
    fn trailing_slash_does_not_match_without_slash() {
        assert!(!Router::path_matches("/api/auth/sessions", "/api/auth/sessions/"));
    }

    #[test]
    fn wildcard_segment_matches() {
        assert!(Router::path_matches("/api/users/:id", "/api/users/42"));
        assert!(!Router::path_matches("/api/users/:id", "/api/users/42/roles"));
    }

    #[test]
    fn query_string_stripped_before_match() {
        assert!(Router::path_matches("/api/auth/sessions", "/api/auth/sessions?limit=5"));
    }

    #[tokio::test]
    async fn route_table_tiers() {
        let state = test_state().await;
        let router = build_api_router(&state);

        assert_eq!(
            router.route_kind(&Method::POST, "/api/auth/login"),
            Some(&RouteKind::Open)
        );
        assert_eq!(
            router.route_kind(&Method::POST, "/api/auth/logout"),
            Some(&RouteKind::Authenticated)
        );
        assert_eq!(
            router.route_kind(&Method::GET, "/api/auth/sessions"),
            Some(&RouteKind::Gated(Gate::Permission(USER_VIEW)))
        );
        assert_eq!(
            router.route_kind(&Method::POST, "/api/auth/sessions/revoke"),
            Some(&RouteKind::Gated(Gate::Permission(USER_EDIT)))
        );
        assert_eq!(router.route_kind(&Method::GET, "/api/auth/login"), None);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let router = build_api_router(&test_state().await);
        let response = router.route(request(Method::GET, "/nope")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn handler_error_becomes_internal_error() {
        let state = test_state().await;
        let router = Router::new(state).get("/boom", |_req, _state| async move {
            Err::<ApiResponse, _>(anyhow::anyhow!("disk on fire"))
        });

        let response = router.route(request(Method::GET, "/boom")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("INTERNAL_ERROR"));
        assert!(!text.contains("disk on fire"));
    }

    #[tokio::test]
    async fn authenticated_route_without_token_is_401() {
        let router = build_api_router(&test_state().await);
        let response = router.route(request(Method::POST, "/api/auth/verify")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
