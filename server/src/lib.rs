//! Control-panel backend: signed session tokens, an exclusive-session ledger,
//! permission gates and per-address throttling, served over hyper + tower.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::header::{self, HeaderValue};
use hyper::{Request, Response};
use tower::util::BoxCloneSyncService;
use tower::{ServiceBuilder, service_fn};
use tower_http::set_header::SetResponseHeaderLayer;

use panel_shared::types::server_config::AppConfig;

pub mod auth;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod security;
pub mod tower_middle;

use crate::auth::{Authenticator, CookieService, TokenService};
use crate::database::{CredentialGateway, SessionStore};
use crate::errors::ErrorCatalog;
use crate::handlers::http::routes::build_api_router;
use crate::security::{ApiThrottle, LoginThrottle};
use crate::tower_middle::TimeoutLayer;

pub type ResponseBody = BoxBody<Bytes, Infallible>;
pub type ApiResponse = Response<ResponseBody>;
pub type RequestBody = BoxBody<Bytes, hyper::Error>;
pub type ApiRequest = Request<RequestBody>;

/// The complete HTTP application: router plus the outer layers.
pub type AppService = BoxCloneSyncService<ApiRequest, ApiResponse, Infallible>;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; frame-ancestors 'none'";

/// Everything a handler or layer may need, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub catalog: Arc<ErrorCatalog>,
    pub tokens: Arc<TokenService>,
    pub cookies: Arc<CookieService>,
    pub sessions: Arc<dyn SessionStore>,
    pub credentials: Arc<dyn CredentialGateway>,
    pub login_throttle: LoginThrottle,
    pub api_throttle: ApiThrottle,
}

impl AppState {
    /// `config` must already be validated; the signing secret is required.
    pub fn new(
        config: AppConfig,
        catalog: ErrorCatalog,
        sessions: Arc<dyn SessionStore>,
        credentials: Arc<dyn CredentialGateway>,
    ) -> Result<Self> {
        let secret = config
            .jwt
            .secret
            .as_deref()
            .context("jwt secret is not configured")?;

        let tokens = TokenService::new(secret, &config.jwt.issuer, config.jwt.ttl());
        let cookies = CookieService::new(&config.cookie, tokens.ttl());

        let auth_limits = &config.rate_limit.auth;
        let api_limits = &config.rate_limit.api;

        Ok(Self {
            login_throttle: LoginThrottle::new(
                auth_limits.max_attempts,
                auth_limits.block_duration(),
            ),
            api_throttle: ApiThrottle::new(api_limits.limit, api_limits.window()),
            tokens: Arc::new(tokens),
            cookies: Arc::new(cookies),
            catalog: Arc::new(catalog),
            config: Arc::new(config),
            sessions,
            credentials,
        })
    }

    pub fn authenticator(&self) -> Authenticator {
        Authenticator::new(
            self.tokens.clone(),
            self.cookies.clone(),
            self.sessions.clone(),
        )
    }
}

/// Router wrapped in the request timeout and the security response headers.
pub fn build_service(state: AppState) -> AppService {
    let router = Arc::new(build_api_router(&state));

    let app = service_fn(move |req: ApiRequest| {
        let router = router.clone();
        async move { Ok::<_, Infallible>(router.route(req).await) }
    });

    BoxCloneSyncService::new(
        ServiceBuilder::new()
            .layer(SetResponseHeaderLayer::overriding(
                header::CONTENT_SECURITY_POLICY,
                HeaderValue::from_static(CONTENT_SECURITY_POLICY),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_FRAME_OPTIONS,
                HeaderValue::from_static("DENY"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_XSS_PROTECTION,
                HeaderValue::from_static("1; mode=block"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::REFERRER_POLICY,
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            ))
            .layer(TimeoutLayer::new(
                state.config.server.request_timeout(),
                state.catalog.clone(),
            ))
            .service(app),
    )
}
